//! Retry with exponential backoff for transient remote failures
//!
//! Only errors classified as retryable (network, timeout, 5xx) are retried.
//! Everything else fails on the first attempt. With the defaults a record
//! gets 5 attempts separated by 1s, 2s, 4s and 8s.
//!
//! Dropping the returned future cancels the sequence between attempts; the
//! caller's record keeps whatever status it had.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound for a single delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based), clamped to
    /// `max_delay_ms`. A factor that overflows or is not a number clamps too.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        let mut delay = Duration::from_millis(self.base_delay_ms).min(cap);
        for _ in 0..retry {
            let grown = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
                .map_or(cap, |grown| grown.min(cap));
            if grown == delay {
                break;
            }
            delay = grown;
        }
        delay
    }

    /// Every delay the policy may sleep, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.delay_for(retry)).collect()
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!(operation = label, attempts = retry + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    tracing::warn!(
                        operation = label,
                        attempt = retry,
                        max_attempts = self.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            operation = label,
                            attempts = retry + 1,
                            error = %err,
                            "Retries exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
