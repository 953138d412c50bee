//! Retry with exponential backoff.
//!
//! The policy only decides *when* to try again. Whether an error is worth
//! retrying is the caller's call, passed in as a predicate to
//! [`RetryPolicy::execute_if`]. Only idempotent reads go through here.

use std::future::Future;
use std::time::Duration;

/// Backoff timing shared by all retried operations of one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-indexed):
    /// `min(base * 2^(attempt-1), max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Try `op` up to `max_attempts` times, retrying every error.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, max_attempts: u32, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_if(label, max_attempts, |_| true, op).await
    }

    /// Try `op` up to `max_attempts` times, retrying only errors accepted by `should_retry`.
    ///
    /// `max_attempts` of zero behaves as one.
    ///
    /// # Errors
    ///
    /// Returns an ineligible error immediately, or the last error once
    /// attempts are exhausted.
    pub async fn execute_if<T, E, P, F, Fut>(
        &self,
        label: &str,
        max_attempts: u32,
        should_retry: P,
        mut op: F,
    ) -> Result<T, E>
    where
        P: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation = label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !should_retry(&error) {
                        tracing::debug!(operation = label, attempt, error = %error, "Error not retryable");
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        tracing::warn!(
                            operation = label,
                            attempts = attempt,
                            error = %error,
                            "Giving up after retries"
                        );
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
