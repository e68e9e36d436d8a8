//! Units and the per-session delta tracker that turns cumulative byte counts
//! into instantaneous speeds.

use tokio::time::Instant;

/// Bits in one (binary) megabit; 131072 bytes/s is exactly 1.0 Mbit/s.
pub const BITS_PER_MEGABIT: f64 = 1_048_576.0;

/// Convert a byte count to bits.
pub fn bits_of(bytes: u64) -> f64 {
    bytes as f64 * 8.0
}

/// Convert bits per second to Mbit/s.
pub fn to_mbps(bits_per_sec: f64) -> f64 {
    bits_per_sec / BITS_PER_MEGABIT
}

/// Convert Mbit/s to bits per second.
pub fn from_mbps(mbps: f64) -> f64 {
    mbps * BITS_PER_MEGABIT
}

/// One progress notification: cumulative bytes transferred at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub loaded: u64,
    pub at: Instant,
}

impl ProgressSample {
    pub fn new(loaded: u64, at: Instant) -> Self {
        Self { loaded, at }
    }
}

/// Last observed progress point of a throughput session.
///
/// Empty until the first progress sample arrives; the first sample only
/// seeds the record since there is no delta to measure yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeltaTracker {
    last: Option<(Instant, f64)>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `sample` into the record, returning the updated record and the
    /// instantaneous rate in bits per second.
    ///
    /// A zero time delta or a non-finite rate yields `ceiling_bps` instead.
    pub fn track(
        self,
        sample: ProgressSample,
        ceiling_bps: f64,
    ) -> (DeltaTracker, Option<f64>) {
        let bits = bits_of(sample.loaded);
        let next = DeltaTracker { last: Some((sample.at, bits)) };

        let Some((last_at, last_bits)) = self.last else {
            return (next, None);
        };

        let delta_bits = bits - last_bits;
        let delta_secs =
            sample.at.saturating_duration_since(last_at).as_secs_f64();
        let rate = delta_bits / delta_secs;

        if delta_secs == 0.0 || !rate.is_finite() {
            return (next, Some(ceiling_bps));
        }

        (next, Some(rate))
    }

    /// Whether a progress sample has been recorded yet.
    pub fn is_seeded(&self) -> bool {
        self.last.is_some()
    }
}

/// Format a speed for display (e.g. "125.5 Mbit/s" or "1.2 Gbit/s").
pub fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbit/s", mbps / 1000.0)
    } else if mbps >= 100.0 {
        format!("{:.0} Mbit/s", mbps)
    } else if mbps >= 10.0 {
        format!("{:.1} Mbit/s", mbps)
    } else {
        format!("{:.2} Mbit/s", mbps)
    }
}
