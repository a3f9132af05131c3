//! Retry logic with exponential backoff for transient failures
//!
//! Transient failures (network errors, 5xx responses, 429 throttling) are
//! retried with an exponential backoff curve. Everything else fails on the
//! first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed
pub trait RetryableError {
    /// Whether the operation that produced this error should be retried
    fn is_retryable(&self) -> bool;

    /// Short human readable reason, used in log lines
    fn retry_reason(&self) -> &str;
}

/// Retry policy for requests
///
/// The total number of attempts is `max_retries + 1`. The first retry waits
/// `initial_delay`, each following retry doubles the wait, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Randomize each delay to spread out retries from concurrent workers
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the upper bound for a single delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter so delays follow the exact curve
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Total attempts a request may make under this policy
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The delays slept between attempts, in order
    pub fn delays(&self) -> Vec<Duration> {
        // Base 2 with factor 1 yields 2^(n+1) ms, half of it is the multiplier
        ExponentialBackoff::from_millis(2)
            .take(self.max_retries as usize)
            .map(|step| {
                let multiplier = u32::try_from(step.as_millis() / 2).unwrap_or(u32::MAX);
                self.initial_delay
                    .saturating_mul(multiplier)
                    .min(self.max_delay)
            })
            .map(|delay| if self.use_jitter { jitter(delay) } else { delay })
            .collect()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget in `config` is spent.
pub async fn with_retry<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + Display,
{
    let condition = |err: &E| {
        if err.is_retryable() {
            warn!(
                operation = operation_name,
                reason = err.retry_reason(),
                error = %err,
                "Transient failure, retrying"
            );
            true
        } else {
            debug!(
                operation = operation_name,
                reason = err.retry_reason(),
                "Non-retryable failure"
            );
            false
        }
    };

    RetryIf::start(config.delays(), operation, condition).await
}
