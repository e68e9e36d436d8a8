//! Result data structures for measurement output.
//!
//! Every session resolves to a [`Measurement`]; the CLI gathers them into a
//! [`SpeedTestResults`] for display or JSON output.

use crate::measurements::{format_speed, to_mbps};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// The three kinds of measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Download,
    Upload,
    Ping,
}

impl MeasurementKind {
    /// Unit of the estimate this kind of session produces.
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementKind::Download | MeasurementKind::Upload => "bit/s",
            MeasurementKind::Ping => "ms",
        }
    }

    pub fn is_throughput(&self) -> bool {
        !matches!(self, MeasurementKind::Ping)
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MeasurementKind::Download => "download",
            MeasurementKind::Upload => "upload",
            MeasurementKind::Ping => "ping",
        })
    }
}

/// Why a successful session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The running average converged.
    Stable,
    /// The transfer finished before the average converged.
    Completed,
    /// The duration bound was reached.
    TimedOut,
}

impl StopReason {
    pub fn description(&self) -> &'static str {
        match self {
            StopReason::Stable => "stable",
            StopReason::Completed => "transfer complete",
            StopReason::TimedOut => "time limit reached",
        }
    }
}

/// Outcome of one successful measurement session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    /// Bits per second for throughput, milliseconds for ping.
    pub estimate: f64,
    pub unit: &'static str,
    /// Samples fed to the collector.
    pub samples: u64,
    pub stop_reason: StopReason,
    /// Time from the first connection/progress signal to the end.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl Measurement {
    pub fn new(
        kind: MeasurementKind,
        estimate: f64,
        samples: u64,
        stop_reason: StopReason,
        elapsed: Duration,
    ) -> Self {
        Self {
            kind,
            estimate,
            unit: kind.unit(),
            samples,
            stop_reason,
            elapsed,
        }
    }

    /// The estimate in Mbit/s, for throughput measurements.
    pub fn mbps(&self) -> Option<f64> {
        self.kind.is_throughput().then(|| to_mbps(self.estimate))
    }

    /// Human readable estimate, e.g. "94.2 Mbit/s" or "12.31 ms".
    pub fn display_value(&self) -> String {
        match self.mbps() {
            Some(mbps) => format_speed(mbps),
            None => format!("{:.2} ms", self.estimate),
        }
    }
}

fn serialize_millis<S>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Measurement output for one throughput direction.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputResults {
    pub speed_bps: f64,
    pub speed_mbps: f64,
    pub samples: u64,
    pub stop_reason: StopReason,
    pub elapsed_ms: f64,
}

impl ThroughputResults {
    pub fn from_measurement(measurement: &Measurement) -> Self {
        Self {
            speed_bps: measurement.estimate,
            speed_mbps: to_mbps(measurement.estimate),
            samples: measurement.samples,
            stop_reason: measurement.stop_reason,
            elapsed_ms: measurement.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Ping measurement output.
#[derive(Debug, Clone, Serialize)]
pub struct PingResults {
    pub latency_ms: f64,
    pub samples: u64,
    pub stop_reason: StopReason,
    pub elapsed_ms: f64,
}

impl PingResults {
    pub fn from_measurement(measurement: &Measurement) -> Self {
        Self {
            latency_ms: measurement.estimate,
            samples: measurement.samples,
            stop_reason: measurement.stop_reason,
            elapsed_ms: measurement.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Everything one CLI run measured. Skipped tests are omitted from JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestResults {
    /// Timestamp when the run completed
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<ThroughputResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<ThroughputResults>,
}

impl SpeedTestResults {
    pub fn new(
        ping: Option<&Measurement>,
        download: Option<&Measurement>,
        upload: Option<&Measurement>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            ping: ping.map(PingResults::from_measurement),
            download: download.map(ThroughputResults::from_measurement),
            upload: upload.map(ThroughputResults::from_measurement),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
