//! Sliding-window request rate limiting
//!
//! Admits at most `max_requests` operations in any trailing `window`. All workers share
//! one [`RateLimiter`]; the lock only covers eviction and the admission check and is never
//! held across a sleep.
//!
//! This is advisory limiting. The remote service can still answer with a 429, which the
//! retry policy handles separately.

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared sliding-window rate limiter (cheap to clone)
#[derive(Clone)]
pub struct RateLimiter {
    /// Timestamps of the most recent admissions, oldest first
    admitted: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window`
    ///
    /// # Examples
    ///
    /// ```
    /// use reel_dl::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let limiter = RateLimiter::new(2, Duration::from_secs(60));
    /// assert!(limiter.admit());
    /// assert!(limiter.admit());
    /// assert!(!limiter.admit());
    /// # }
    /// ```
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            admitted: Arc::new(Mutex::new(VecDeque::with_capacity(max_requests))),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Create a limiter from configuration
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The guarded data is a plain deque; a panic elsewhere cannot leave it inconsistent.
        self.admitted.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_expired(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit one request now
    ///
    /// Returns `true` and records the admission if fewer than `max_requests`
    /// admissions fall inside the trailing window.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);

        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until the next admission would succeed (zero if it would succeed now)
    pub fn delay_until_admit(&self) -> Duration {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);

        if admitted.len() < self.max_requests {
            return Duration::ZERO;
        }

        admitted
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Number of admissions currently inside the window
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);
        admitted.len()
    }

    /// Sleep until admitted
    ///
    /// Another worker may take the freed slot between waking and re-checking; in that
    /// case this simply waits again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires while waiting.
    pub async fn wait_for_admission(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled("stopped while waiting for rate limit".into()));
            }
            if self.admit() {
                return Ok(());
            }

            // Floor the wait so we never spin on a zero delay after losing a race
            let delay = self.delay_until_admit().max(Duration::from_millis(10));
            tracing::debug!(delay_ms = delay.as_millis() as u64, "rate limit reached, waiting");

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled("stopped while waiting for rate limit".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sixth_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));

        for i in 0..5 {
            assert!(limiter.admit(), "admission {} should succeed", i + 1);
        }
        assert!(!limiter.admit(), "sixth admission must be rejected");

        let delay = limiter.delay_until_admit();
        assert!(delay > Duration::ZERO, "delay should be positive");
        assert!(delay <= Duration::from_secs(60), "delay bounded by window");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.admit());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.admit());
        assert!(!limiter.admit());

        // Oldest admission leaves the window 10s after it was recorded
        assert_eq!(limiter.delay_until_admit(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.delay_until_admit(), Duration::ZERO);
        assert!(limiter.admit());
        assert_eq!(limiter.in_window(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_zero_when_admissible() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert_eq!(limiter.delay_until_admit(), Duration::ZERO);
        limiter.admit();
        assert_eq!(limiter.delay_until_admit(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_admission_sleeps_until_slot_frees() {
        let limiter = RateLimiter::new(1, Duration::from_secs(30));
        let cancel = CancellationToken::new();
        assert!(limiter.admit());

        let start = Instant::now();
        limiter.wait_for_admission(&cancel).await.unwrap();
        let waited = start.elapsed();

        assert!(waited >= Duration::from_secs(30), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(31), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_admission_honours_cancellation() {
        let limiter = RateLimiter::new(1, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        assert!(limiter.admit());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = limiter.wait_for_admission(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_exceed_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait_for_admission(&cancel).await.unwrap();
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        // Any three consecutive admissions must span at least one window
        for w in times.windows(3) {
            assert!(w[2].duration_since(w[0]) >= Duration::from_secs(5));
        }
    }
}
