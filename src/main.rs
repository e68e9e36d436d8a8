extern crate clap;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::debug;
use speed_meter::config::{
    DEFAULT_JITTER_THRESHOLD, DEFAULT_SPEED_CEILING_MBPS, DEFAULT_STABLE_STREAK,
    DEFAULT_WINDOW_SIZE,
};
use speed_meter::errors::{exit_codes, format_error_for_display};
use speed_meter::measurements::{format_speed, from_mbps, to_mbps};
use speed_meter::retry::{retry_async, RetryConfig};
use speed_meter::{
    ErrorKind, Measurement, MeasurementKind, ProgressCallback, ProgressEvent,
    SamplingConfig, SpeedTest, SpeedTestConfig, SpeedTestError,
    SpeedTestResults,
};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(
    author,
    version = env!("SPEEDMETER_VERSION"),
    about,
    long_about = None
)]
struct Cli {
    /// Endpoint serving bytes for the download test
    #[arg(long, value_name = "URL")]
    download_url: String,

    /// Endpoint accepting a POST body for the upload test
    #[arg(long, value_name = "URL")]
    upload_url: String,

    /// Endpoint answering small requests for the ping test
    #[arg(long, value_name = "URL")]
    ping_url: String,

    /// Upper bound on each test, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    max_duration: u64,

    /// Size of the upload payload, in MiB
    #[arg(long, value_name = "MIB", default_value_t = 64)]
    max_upload_mib: u64,

    /// Samples represented by the running average
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    window: u32,

    /// Relative change between averages still counted as stable
    #[arg(long, default_value_t = DEFAULT_JITTER_THRESHOLD)]
    jitter: f64,

    /// Consecutive stable comparisons needed to stop a test early
    #[arg(long, default_value_t = DEFAULT_STABLE_STREAK)]
    streak: u32,

    /// Ceiling for a single speed sample, in Mbit/s
    #[arg(
        long,
        value_name = "MBPS",
        default_value_t = DEFAULT_SPEED_CEILING_MBPS
    )]
    speed_ceiling: f64,

    /// Retries for a test that fails on the network
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    skip_ping: bool,

    #[arg(long)]
    skip_download: bool,

    #[arg(long)]
    skip_upload: bool,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    let code = match run(&cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(error) => {
            eprintln!("{}", format_error_for_display(&error).red());
            error.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<(), SpeedTestError> {
    let config = build_config(cli)?;
    debug!("Using {:?}", config);

    let mut speed_test = SpeedTest::http(config)?;
    if !cli.json && std::io::stderr().is_terminal() {
        speed_test = speed_test.with_progress(Arc::new(LiveLine));
    }

    let retry = RetryConfig::with_retries(cli.retries);
    let human = !cli.json;

    let ping = if cli.skip_ping {
        None
    } else {
        let ping =
            retry_async(&retry, "ping test", || speed_test.ping()).await?;
        if human {
            print_measurement("Latency:", &ping);
        }
        Some(ping)
    };

    let download = if cli.skip_download {
        None
    } else {
        let download =
            retry_async(&retry, "download test", || speed_test.download())
                .await?;
        if human {
            print_measurement("Download speed:", &download);
        }
        Some(download)
    };

    let upload = if cli.skip_upload {
        None
    } else {
        let upload =
            retry_async(&retry, "upload test", || speed_test.upload()).await?;
        if human {
            print_measurement("Upload speed:", &upload);
        }
        Some(upload)
    };

    if cli.json {
        let results = SpeedTestResults::new(
            ping.as_ref(),
            download.as_ref(),
            upload.as_ref(),
        );
        let json = results.to_json().map_err(|e| {
            SpeedTestError::new(ErrorKind::Unknown, "failed to encode results")
                .with_source(e)
        })?;
        println!("{}", json);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<SpeedTestConfig, SpeedTestError> {
    let sampling = SamplingConfig::new(cli.window, cli.jitter, cli.streak);

    Ok(SpeedTestConfig::from_urls(
        &cli.download_url,
        &cli.upload_url,
        &cli.ping_url,
    )?
    .with_max_test_duration(Duration::from_secs(cli.max_duration))
    .with_max_upload_size_bytes(cli.max_upload_mib.saturating_mul(MIB))
    .with_speed_ceiling_bps(from_mbps(cli.speed_ceiling))
    .with_sampling(sampling))
}

fn print_measurement(label: &str, measurement: &Measurement) {
    println!(
        "{} {} {}",
        label.bold().white(),
        measurement.display_value().bright_cyan(),
        format!(
            "({}, {} samples)",
            measurement.stop_reason.description(),
            measurement.samples
        )
        .dimmed()
    );
}

/// Rewrites a single stderr line with the running estimate.
struct LiveLine;

impl ProgressCallback for LiveLine {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Sample { kind, estimate, samples, .. } => {
                eprint!(
                    "\r{} {} ({} samples)    ",
                    format!("Measuring {}:", kind).dimmed(),
                    live_value(kind, estimate),
                    samples
                );
            }
            ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. } => {
                eprint!("\r{}\r", " ".repeat(60));
            }
            ProgressEvent::Started { .. } => {}
        }
    }
}

fn live_value(kind: MeasurementKind, estimate: f64) -> String {
    if kind.is_throughput() {
        format_speed(to_mbps(estimate))
    } else {
        format!("{:.2} ms", estimate)
    }
}
