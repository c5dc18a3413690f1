//! Retry auth calls the service rejected for rate limiting.
//!
//! Only rate-limit rejections are retried, a fixed number of times, with an
//! exponentially growing delay. Everything else is returned as-is on the
//! first failure.

use backoff::{backoff::Backoff, future::retry_notify};
use std::{future::Future, time::Duration};
use tracing::warn;

use crate::error::{Error, Result};

/// How rate-limited calls are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// How many times a call is retried after the first attempt.
    pub retries: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Each following wait is this many times longer than the previous one.
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 2,
        }
    }
}

/// A backoff that hands out `retries` delays and then gives up.
#[derive(Debug, Clone)]
struct RateLimitBackoff {
    config: RetryConfig,
    remaining: u32,
    delay: Duration,
}

impl RateLimitBackoff {
    fn new(config: RetryConfig) -> Self {
        Self {
            config,
            remaining: config.retries,
            delay: config.initial_delay,
        }
    }
}

impl Backoff for RateLimitBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.delay;
        self.delay = self.delay.saturating_mul(self.config.backoff_factor);
        Some(delay)
    }

    fn reset(&mut self) {
        self.remaining = self.config.retries;
        self.delay = self.config.initial_delay;
    }
}

/// Runs `operation`, retrying it while it fails with a rate-limit error and
/// the budget in `config` lasts. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_notify(
        RateLimitBackoff::new(config),
        || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_rate_limited() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: Error, delay: Duration| {
            warn!(error = %e, delay_ms = delay.as_millis() as u64, "rate limited, retrying");
        },
    )
    .await
}
