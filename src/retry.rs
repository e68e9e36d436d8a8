//! Retry logic with exponential backoff for whole measurements.
//!
//! Sessions never retry a failed request themselves. A caller that wants
//! to ride out transient network failures wraps the measurement in
//! [`retry_async`]; only transport failures are retried, anything else
//! (bad configuration, payload generation) fails on the first attempt.

use crate::errors::SpeedTestError;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default base delay for exponential backoff (in milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Maximum delay cap for exponential backoff (in milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        Self { max_retries, base_delay_ms, max_delay_ms }
    }

    /// Default delays with `max_retries` attempts after the first.
    pub fn with_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    /// Delay before retry number `attempt + 1`:
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
        let capped_delay_ms = delay_ms.min(self.max_delay_ms);
        Duration::from_millis(capped_delay_ms)
    }
}

/// Run `f` until it succeeds, fails with a non-transport error, or the
/// retries run out. The last error is returned unchanged.
///
/// # Example
/// ```no_run
/// use speed_meter::retry::{retry_async, RetryConfig};
/// use speed_meter::SpeedTest;
///
/// async fn example(speed_test: &SpeedTest) {
///     let config = RetryConfig::with_retries(2);
///     let result = retry_async(&config, "download test", || {
///         speed_test.measure_download_speed()
///     })
///     .await;
/// }
/// ```
pub async fn retry_async<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, SpeedTestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SpeedTestError>>,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            debug!(
                "{}: Retry attempt {}/{} after {:?} delay",
                operation_name, attempt, config.max_retries, delay
            );
            sleep(delay).await;
        }

        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}",
                        operation_name,
                        attempt + 1
                    );
                }
                return Ok(result);
            }
            Err(e) if !e.is_transport() => return Err(e),
            Err(e) => {
                attempt += 1;

                if attempt < total_attempts {
                    warn!(
                        "{}: Attempt {} failed: {}",
                        operation_name, attempt, e.message
                    );
                } else {
                    if total_attempts > 1 {
                        warn!(
                            "{}: All {} attempts failed. Last error: {}",
                            operation_name, total_attempts, e.message
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
