//! Configuration for speed measurements.
//!
//! There is no configuration file: callers build a [`SpeedTestConfig`] in
//! code (the CLI maps its flags onto one) and validate it before use.

use crate::errors::SpeedTestError;
use crate::measurements::{from_mbps, BITS_PER_MEGABIT};
use std::time::Duration;
use url::Url;

/// Default window of the running average, in samples.
pub const DEFAULT_WINDOW_SIZE: u32 = 5;

/// Default relative change between consecutive averages still counted as
/// stable.
pub const DEFAULT_JITTER_THRESHOLD: f64 = 0.05;

/// Default number of consecutive stable comparisons before stopping.
pub const DEFAULT_STABLE_STREAK: u32 = 5;

/// Default upload payload size (64 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// Default bound on a single test's duration.
pub const DEFAULT_MAX_TEST_DURATION: Duration = Duration::from_secs(10);

/// Default ceiling for an instantaneous speed sample, in Mbit/s.
pub const DEFAULT_SPEED_CEILING_MBPS: f64 = 1000.0;

/// Tuning knobs for the sample collector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    /// Number of most-recent samples the running average represents.
    pub window_size: u32,
    /// Maximum relative change between consecutive averages that still
    /// counts as stable. Must be in `(0, 1)`.
    pub jitter_threshold: f64,
    /// Consecutive stable comparisons required before stopping.
    pub stable_streak_required: u32,
}

impl SamplingConfig {
    pub const fn new(
        window_size: u32,
        jitter_threshold: f64,
        stable_streak_required: u32,
    ) -> Self {
        Self { window_size, jitter_threshold, stable_streak_required }
    }

    pub fn validate(&self) -> Result<(), SpeedTestError> {
        if self.window_size == 0 {
            return Err(SpeedTestError::config(
                "window size must be at least 1",
            ));
        }

        if !(self.jitter_threshold > 0.0 && self.jitter_threshold < 1.0) {
            return Err(SpeedTestError::config(format!(
                "jitter threshold must be between 0 and 1 (exclusive), got {}",
                self.jitter_threshold
            )));
        }

        if self.stable_streak_required == 0 {
            return Err(SpeedTestError::config(
                "stable streak must be at least 1",
            ));
        }

        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW_SIZE,
            DEFAULT_JITTER_THRESHOLD,
            DEFAULT_STABLE_STREAK,
        )
    }
}

/// Endpoints and limits for a set of measurements.
#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    /// Endpoint serving bytes for the download test.
    pub download_url: Url,
    /// Endpoint accepting a POST body for the upload test.
    pub upload_url: Url,
    /// Endpoint answering small requests for the ping test.
    pub ping_url: Url,
    /// Size of the generated upload payload.
    /// Default: 64 MiB
    pub max_upload_size_bytes: u64,
    /// Upper bound on a single test's duration. Reaching it is not an error.
    /// Default: 10s
    pub max_test_duration: Duration,
    /// Value substituted for an instantaneous speed sample that is infinite,
    /// NaN, or measured over a zero time delta, in bits per second.
    /// Default: 1000 Mbit/s
    pub speed_ceiling_bps: f64,
    /// Collector tuning, shared by all three tests.
    pub sampling: SamplingConfig,
}

impl SpeedTestConfig {
    /// Build a configuration for the given endpoints with default limits.
    pub fn new(download_url: Url, upload_url: Url, ping_url: Url) -> Self {
        Self {
            download_url,
            upload_url,
            ping_url,
            max_upload_size_bytes: DEFAULT_MAX_UPLOAD_SIZE_BYTES,
            max_test_duration: DEFAULT_MAX_TEST_DURATION,
            speed_ceiling_bps: from_mbps(DEFAULT_SPEED_CEILING_MBPS),
            sampling: SamplingConfig::default(),
        }
    }

    /// Parse the three endpoints and build a configuration from them.
    pub fn from_urls(
        download_url: &str,
        upload_url: &str,
        ping_url: &str,
    ) -> Result<Self, SpeedTestError> {
        Ok(Self::new(
            parse_url("download", download_url)?,
            parse_url("upload", upload_url)?,
            parse_url("ping", ping_url)?,
        ))
    }

    pub fn with_max_upload_size_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_size_bytes = bytes;
        self
    }

    pub fn with_max_test_duration(mut self, duration: Duration) -> Self {
        self.max_test_duration = duration;
        self
    }

    pub fn with_speed_ceiling_bps(mut self, bps: f64) -> Self {
        self.speed_ceiling_bps = bps;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Check every limit, returning the first violation as a
    /// configuration error.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        self.sampling.validate()?;

        if self.max_test_duration.is_zero() {
            return Err(SpeedTestError::config(
                "maximum test duration must be greater than zero",
            ));
        }

        if self.max_upload_size_bytes == 0 {
            return Err(SpeedTestError::config(
                "upload size must be greater than zero",
            ));
        }

        if usize::try_from(self.max_upload_size_bytes).is_err() {
            return Err(SpeedTestError::config(format!(
                "upload size of {} bytes does not fit in memory",
                self.max_upload_size_bytes
            )));
        }

        if !self.speed_ceiling_bps.is_finite() || self.speed_ceiling_bps <= 0.0
        {
            return Err(SpeedTestError::config(format!(
                "speed ceiling must be a positive number, got {} Mbit/s",
                self.speed_ceiling_bps / BITS_PER_MEGABIT
            )));
        }

        Ok(())
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, SpeedTestError> {
    let url = Url::parse(value).map_err(|e| {
        SpeedTestError::config(format!("invalid {} URL '{}'", name, value))
            .with_source(e)
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SpeedTestError::config(format!(
            "{} URL must use http or https, got '{}'",
            name, scheme
        ))),
    }
}
