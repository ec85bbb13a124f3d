//! Bounded retries with backoff.
//!
//! A [`RetryPolicy`] re-runs a failed call up to its attempt bound before the
//! failure is surfaced as terminal. Retries never apply to requests that were
//! suppressed by an open circuit breaker (suppression happens before the
//! retry loop and consumes no attempts), and a retried call stays inside the
//! same logical in-flight attempt for deduplication purposes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::FetchError;

/// Computes the delay before a given retry. The argument is the attempt
/// number that just failed, starting at 1.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Delay strategy between attempts.
#[derive(Clone)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped, with up to 50% random jitter shaved
    /// off to keep concurrent clients from retrying in lockstep.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound for any single delay.
        cap: Duration,
        /// Whether to randomize the delay.
        jitter: bool,
    },
    /// A caller-supplied delay function.
    Custom(BackoffFn),
}

impl Backoff {
    /// The delay to sleep after `attempt` failed.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, cap, jitter } => {
                let exp = attempt.saturating_sub(1).min(16);
                let delay = base.saturating_mul(1_u32 << exp).min(*cap);
                if *jitter {
                    delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
                } else {
                    delay
                }
            }
            Self::Custom(f) => f(attempt),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Exponential { base, cap, jitter } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("cap", cap)
                .field("jitter", jitter)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Bounded re-attempt policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` means no retries.
    pub attempts: u32,
    /// Delay strategy between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given bound and backoff.
    #[must_use]
    pub const fn new(attempts: u32, backoff: Backoff) -> Self {
        Self { attempts, backoff }
    }

    /// A single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or the bound is hit.
    ///
    /// `op` receives the attempt number starting at 1. Errors that cannot
    /// change on retry (aborts, most client errors) short-circuit.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts || !err.is_retryable() => return Err(err),
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    debug!(%err, attempt, ?delay, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(fail_first: u32) -> (Arc<AtomicU32>, impl FnMut(u32) -> futures::future::BoxFuture<'static, Result<u32, FetchError>>) {
        use futures::FutureExt;

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = move |attempt: u32| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < fail_first {
                    Err(FetchError::Transport(TransportError::Timeout))
                } else {
                    Ok(attempt)
                }
            }
            .boxed()
        };
        (calls, op)
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let (calls, op) = flaky(0);
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));

        let result = policy.run(op).await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (calls, op) = flaky(2);
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));

        let result = policy.run(op).await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bound_is_respected() {
        let (calls, op) = flaky(10);
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));

        let result = policy.run(op).await;
        assert_eq!(
            result,
            Err(FetchError::Transport(TransportError::Timeout))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_short_circuit() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(1)));

        let result: Result<(), _> = policy
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FetchError::Status {
                        status: http::StatusCode::NOT_FOUND,
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "404 is not retried");
    }

    #[tokio::test]
    async fn test_none_policy_is_single_attempt() {
        let (calls, op) = flaky(10);
        let result = RetryPolicy::none().run(op).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff_growth() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(10), Duration::from_secs(5), "capped");
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_custom_backoff() {
        let backoff = Backoff::Custom(Arc::new(|attempt| Duration::from_millis(u64::from(attempt) * 7)));
        assert_eq!(backoff.delay(3), Duration::from_millis(21));
    }
}
