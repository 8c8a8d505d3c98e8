//! Retry with exponential backoff for source network calls.
//!
//! One [`RetryPolicy`] is shared by every source adapter. Only errors that
//! report themselves as transient (timeouts, connection failures, 5xx, 429)
//! are retried; anything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can tell the retry loop whether another attempt may help.
pub trait Retryable {
    /// Whether a later attempt could plausibly succeed.
    fn is_transient(&self) -> bool;

    /// Server-requested delay before the next attempt (e.g. `Retry-After`).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Attempt budget and backoff schedule.
///
/// The wait after the n-th failed attempt is
/// `clamp(multiplier * 2^(n-1), min_backoff, max_backoff)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// The last error of a call that did not succeed within the attempt budget.
#[derive(Debug, Clone)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts > 1 {
            write!(f, "{} (after {} attempts)", self.error, self.attempts)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Exhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the `failed_attempt`-th (1-based) failure.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        let raw = self
            .multiplier
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_backoff);
        raw.max(self.min_backoff).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_transient() || attempt >= max_attempts {
                        return Err(Exhausted {
                            attempts: attempt,
                            error,
                        });
                    }
                    let mut wait = self.backoff(attempt);
                    if let Some(requested) = error.retry_after() {
                        wait = wait.max(requested.min(self.max_backoff));
                    }
                    tracing::debug!(
                        source = label,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        error = %error,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
