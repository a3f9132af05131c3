//! Rate limiting for NCBI E-utilities compliance
//!
//! NCBI E-utilities rate limits:
//! - 3 requests per second without API key
//! - 10 requests per second with API key
//! - Violations can result in IP blocking
//!
//! The limit is process-wide on the NCBI side, so a single [`RateLimiter`]
//! is meant to be cloned into every pool and worker that talks to the service.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{EutilsError, Result};

/// Slot-reserving rate limiter
///
/// Every caller of [`acquire`](RateLimiter::acquire) reserves the next free
/// dispatch slot while holding the lock, then sleeps until that slot. Two
/// reserved slots are always at least `1 / rate` seconds apart, however many
/// workers share the limiter.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    schedule: Arc<Mutex<Schedule>>,
    rate: f64,
    interval: Duration,
}

#[derive(Debug)]
struct Schedule {
    /// Earliest instant the next dispatch may happen
    next_slot: Option<Instant>,
    /// Number of slots handed out so far
    granted: u64,
}

impl RateLimiter {
    /// Minimum accepted rate, so the interval stays finite
    const MIN_RATE: f64 = 0.001;

    /// Create a new rate limiter with the specified rate
    ///
    /// # Arguments
    ///
    /// * `rate` - Maximum requests per second (e.g., 3.0 for NCBI without API key)
    ///
    /// # Example
    ///
    /// ```
    /// use eutils_client::RateLimiter;
    ///
    /// // NCBI rate limit without API key
    /// let limiter = RateLimiter::new(3.0);
    /// assert_eq!(limiter.rate(), 3.0);
    ///
    /// // NCBI rate limit with API key
    /// let limiter_with_key = RateLimiter::new(10.0);
    /// assert_eq!(limiter_with_key.min_interval().as_millis(), 100);
    /// ```
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_finite() {
            rate.max(Self::MIN_RATE)
        } else {
            Self::MIN_RATE
        };
        Self {
            schedule: Arc::new(Mutex::new(Schedule {
                next_slot: None,
                granted: 0,
            })),
            rate,
            interval: Duration::from_secs_f64(1.0 / rate),
        }
    }

    /// Create rate limiter for NCBI API without API key (3 requests/second)
    pub fn ncbi_default() -> Self {
        Self::new(3.0)
    }

    /// Create rate limiter for NCBI API with API key (10 requests/second)
    pub fn ncbi_with_key() -> Self {
        Self::new(10.0)
    }

    /// Wait until it is safe to dispatch one request
    ///
    /// # Example
    ///
    /// ```no_run
    /// use eutils_client::RateLimiter;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let limiter = RateLimiter::ncbi_default();
    ///
    ///     for i in 0..5 {
    ///         limiter.acquire().await?;
    ///         println!("Making API call {}", i + 1);
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<()> {
        let slot = self.reserve();
        if slot > Instant::now() {
            debug!(
                wait_ms = slot.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Waiting for rate limit slot"
            );
            sleep_until(slot).await;
        }
        Ok(())
    }

    /// Like [`acquire`](RateLimiter::acquire), but gives up with
    /// [`EutilsError::Cancelled`] as soon as `cancel` fires.
    ///
    /// A slot reserved before cancellation stays consumed.
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(EutilsError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EutilsError::Cancelled),
            acquired = self.acquire() => acquired,
        }
    }

    /// Check if a dispatch could happen right now without waiting.
    /// Does not reserve a slot.
    pub fn check_available(&self) -> bool {
        let schedule = self.lock();
        schedule
            .next_slot
            .is_none_or(|next| next <= Instant::now())
    }

    /// Configured rate in requests per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Minimum spacing between two dispatches
    pub fn min_interval(&self) -> Duration {
        self.interval
    }

    /// Number of slots granted since creation (for testing and monitoring)
    pub fn granted(&self) -> u64 {
        self.lock().granted
    }

    /// Reserve the next dispatch slot. Check and update happen under one lock.
    fn reserve(&self) -> Instant {
        let mut schedule = self.lock();
        let now = Instant::now();
        let slot = match schedule.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        schedule.next_slot = Some(slot + self.interval);
        schedule.granted += 1;
        slot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::ncbi_default()
    }
}
