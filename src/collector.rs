//! Running-average sample collector with early-stop detection.
//!
//! The collector approximates a moving average over the last
//! `window_size` samples without keeping them around: every new sample is
//! blended into the running average with weight `1 / (min(n, window) + 1)`.
//! Once consecutive averages stay within `jitter_threshold` of each other
//! for `stable_streak_required` comparisons in a row, the collector tells its
//! caller that further samples are unlikely to change the estimate.

use crate::config::SamplingConfig;

/// Bounded-window running average plus a stability streak counter.
#[derive(Debug, Clone)]
pub struct SampleCollector {
    window_size: u32,
    jitter_threshold: f64,
    stable_streak_required: u32,
    sample_count: u64,
    current_average: f64,
    previous_average: f64,
    stable_streak: u32,
}

impl SampleCollector {
    /// Create an empty collector with the given tuning.
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            window_size: config.window_size,
            jitter_threshold: config.jitter_threshold,
            stable_streak_required: config.stable_streak_required,
            sample_count: 0,
            current_average: 0.0,
            previous_average: 0.0,
            stable_streak: 0,
        }
    }

    /// Ingest one sample.
    ///
    /// Returns `true` once the running average has been stable for the
    /// required number of consecutive comparisons. The first comparison is
    /// skipped while the previous average is still zero, so a single sample
    /// can never stop collection.
    pub fn collect(&mut self, value: f64) -> bool {
        self.previous_average = self.current_average;

        let window = self.sample_count.min(self.window_size as u64) as f64;
        self.current_average =
            (self.current_average * window + value) / (window + 1.0);
        self.sample_count += 1;

        if self.previous_average > 0.0
            && self.current_average
                < self.previous_average * (1.0 + self.jitter_threshold)
            && self.current_average
                > self.previous_average * (1.0 - self.jitter_threshold)
        {
            self.stable_streak += 1;
        } else {
            self.stable_streak = 0;
        }

        self.can_stop()
    }

    /// Whether enough consecutive stable comparisons have been observed.
    pub fn can_stop(&self) -> bool {
        self.stable_streak >= self.stable_streak_required
    }

    /// The current running average.
    pub fn estimate(&self) -> f64 {
        self.current_average
    }

    /// The running average before the most recent sample.
    pub fn previous_estimate(&self) -> f64 {
        self.previous_average
    }

    /// Total samples ingested so far.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Consecutive stable comparisons so far.
    pub fn stable_streak(&self) -> u32 {
        self.stable_streak
    }
}

impl Default for SampleCollector {
    fn default() -> Self {
        Self::new(&SamplingConfig::default())
    }
}
