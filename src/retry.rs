// src/retry.rs

//! Linear-backoff retry wrapper.
//!
//! The policy only retries errors that classify themselves as transient via
//! [`Transient`]. Before attempt `n` (n >= 2) it sleeps `base_delay * (n - 1)`.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classification hook for errors that may succeed on a second try.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why [`RetryPolicy::execute`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with a non-transient error; it was not retried.
    Permanent(E),
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before the given 1-based attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.saturating_sub(1)
    }

    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    enum FakeError {
        Timeout,
        NotFound,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Timeout)
        }
    }

    #[test]
    fn delay_is_linear_in_attempt_number() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let c = calls.clone();
        let result = policy
            .execute(|| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FakeError::Timeout)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s before attempt 2, 2s before attempt 3.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::NotFound) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Permanent(FakeError::NotFound))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempt_count_and_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Timeout) }
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, FakeError::Timeout));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
