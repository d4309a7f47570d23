//! Retry logic with exponential backoff
//!
//! Every failure is classified into one of three classes:
//! - [`RetryClass::Transient`] (timeouts, refused connections) backs off exponentially
//! - [`RetryClass::RateLimited`] (remote 429) waits a fixed cooldown
//! - [`RetryClass::Permanent`] fails immediately
//!
//! Both retryable classes count against the same attempt ceiling.
//!
//! # Example
//!
//! ```no_run
//! use reel_dl::retry::{IsRetryable, RetryClass, download_with_retry};
//! use reel_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn retry_class(&self) -> RetryClass {
//!         match self {
//!             MyError::Transient => RetryClass::Transient,
//!             MyError::Permanent => RetryClass::Permanent,
//!         }
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! download_with_retry(&config, &cancel, |_, _, _| {}, |_attempt| async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a failure should be handled by the retry loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Network hiccup: retry with exponential backoff
    Transient,
    /// Remote throttling: retry after a fixed cooldown
    RateLimited,
    /// Do not retry
    Permanent,
}

/// Trait for errors that can be classified for retry
pub trait IsRetryable {
    /// Classify this error
    fn retry_class(&self) -> RetryClass;

    /// Returns true if the operation should be retried
    fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Permanent
    }
}

/// Markers a metadata client may put in its error text when throttled
const RATE_LIMIT_MARKERS: &[&str] = &["429", "too many requests", "rate limit", "please wait"];

/// Markers of transient connection trouble in free-form client errors
const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection refused",
    "connection reset",
    "connection closed",
];

impl IsRetryable for Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            Error::RateLimited(_) => RetryClass::RateLimited,
            Error::HttpStatus { status: 429, .. } => RetryClass::RateLimited,
            Error::Timeout(_) => RetryClass::Transient,
            Error::Network(e) => {
                if e.status().is_some_and(|s| s.as_u16() == 429) {
                    RetryClass::RateLimited
                } else if e.is_timeout() || e.is_connect() {
                    RetryClass::Transient
                } else {
                    RetryClass::Permanent
                }
            }
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted => RetryClass::Transient,
                _ => RetryClass::Permanent,
            },
            // Third-party clients only give us text to go on
            Error::Client(msg) => {
                let lower = msg.to_lowercase();
                if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
                    RetryClass::RateLimited
                } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
                    RetryClass::Transient
                } else {
                    RetryClass::Permanent
                }
            }
            _ => RetryClass::Permanent,
        }
    }
}

/// Delay before the attempt after `attempt` (1-based) failed with `class`
///
/// Transient failures wait `initial_delay × multiplier^(attempt-1)` capped at `max_delay`;
/// rate-limited failures wait `rate_limit_cooldown`.
pub fn retry_delay(config: &RetryConfig, class: RetryClass, attempt: u32) -> Duration {
    match class {
        RetryClass::RateLimited => config.rate_limit_cooldown,
        RetryClass::Transient => {
            let exponent = attempt.saturating_sub(1) as i32;
            let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
            let delay = Duration::from_secs_f64(secs.min(config.max_delay.as_secs_f64()));
            if config.jitter {
                add_jitter(delay)
            } else {
                delay
            }
        }
        RetryClass::Permanent => Duration::ZERO,
    }
}

/// Execute an async operation with the retry policy
///
/// `operation` receives the 1-based attempt number. `on_retry` is called with the failed
/// attempt, the wait before the next one and the error, before sleeping.
///
/// Returns the successful result, or the last error once the error is permanent, the
/// attempt ceiling is reached, or `cancel` fires during a backoff wait.
pub async fn download_with_retry<F, Fut, T, E, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, Duration, &E),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        let class = error.retry_class();
        if class == RetryClass::Permanent {
            tracing::error!(error = %error, "Operation failed with non-retryable error");
            return Err(error);
        }
        if attempt >= max_attempts {
            tracing::error!(
                error = %error,
                attempts = attempt,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(error);
        }

        let delay = retry_delay(config, class, attempt);
        tracing::warn!(
            error = %error,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            rate_limited = class == RetryClass::RateLimited,
            "Operation failed, retrying"
        );
        on_retry(attempt, delay, &error);

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(attempt, "Retry wait interrupted by stop request");
                return Err(error);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
