//! Bounded retry with exponential backoff.
//!
//! Capability providers make one attempt per call and classify the failure
//! as [`ServiceError::Transient`] or [`ServiceError::Permanent`]. This
//! module owns the loop: transient errors are retried after
//! `base * 2^(attempt-1)` (capped at `max_delay`), permanent errors and
//! exhaustion end it.

use std::future::Future;
use std::time::Duration;

use filing_rag_core::ServiceError;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Policy from config values, where `max_retries` counts retries after
    /// the first attempt.
    pub fn from_millis(max_retries: u32, base_ms: u64, max_ms: u64) -> Self {
        Self::new(
            max_retries.saturating_add(1),
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
        )
    }

    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based: the wait after the
    /// first failure is `delay_for_attempt(1)`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        backoff.min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    pub attempts: u32,
    pub last: ServiceError,
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.last.is_transient() {
            write!(
                f,
                "gave up after {} attempts: {}",
                self.attempts,
                self.last.message()
            )
        } else {
            write!(f, "{}", self.last.message())
        }
    }
}

impl std::error::Error for RetryError {}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    op = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = err.message(),
                    "transient failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(last) => {
                return Err(RetryError {
                    attempts: attempt,
                    last,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::new(6, Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<u64> = (1..=5).map(|a| p.delay_for_attempt(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_from_millis_counts_first_attempt() {
        let p = RetryPolicy::from_millis(3, 10, 100);
        assert_eq!(p.max_attempts, 4);
        assert_eq!(RetryPolicy::from_millis(0, 10, 100).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = with_retry(&RetryPolicy::immediate(3), "t", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::Transient("429".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), _> = with_retry(&RetryPolicy::immediate(4), "t", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Transient("503".into()))
        })
        .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("gave up after 4 attempts"));
    }

    #[tokio::test]
    async fn test_permanent_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), _> = with_retry(&RetryPolicy::immediate(5), "t", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Permanent("401 unauthorized".into()))
        })
        .await;
        assert_eq!(out.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
