//! Retry with capped exponential backoff
//!
//! One policy is shared by enumeration requests and data fetches. Only
//! transient failures (429, 5xx, timeouts, connection errors) are retried;
//! anything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::limits;
use crate::errors::{FetchError, FetchResult};

/// Backoff parameters for transient fetch failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: limits::MAX_RETRIES,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(limits::MAX_BACKOFF_MS),
            jitter_factor: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base and maximum delays
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter fraction
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as u64;
        let shift = retry.saturating_sub(1).min(32);
        let exponential = base_millis.saturating_mul(1u64 << shift);
        let capped = exponential.min(self.max_delay.as_millis() as u64);

        // Symmetric jitter to spread concurrent retries
        let jitter_range = (capped as f64 * self.jitter_factor) as u64;
        let jittered = if jitter_range > 0 {
            (capped + fastrand::u64(0..=jitter_range * 2)).saturating_sub(jitter_range)
        } else {
            capped
        };
        Duration::from_millis(jittered)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", what, retries);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        what,
                        retries,
                        self.max_retries + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() && self.max_retries > 0 => {
                    return Err(FetchError::MaxRetriesExceeded {
                        max_retries: self.max_retries,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
