//! Resilient invocation of external services.
//!
//! Every call to a detection or transcription service goes through a
//! [`ResilientInvoker`], which enforces two policies:
//!
//! - **Bounded concurrency**: a semaphore caps in-flight calls to one
//!   service, independent of how wide the caller's worker pool is. The bound
//!   is distinct per service because rate limits differ per provider.
//! - **Retry with backoff**: errors classified as retryable (rate limiting,
//!   server errors, timeouts, connection failures) are retried with
//!   exponential backoff plus jitter, up to a fixed budget. Fatal errors
//!   (other client errors, malformed requests or responses) surface
//!   immediately. An exhausted budget surfaces the last error as a permanent
//!   per-unit failure; the stage records it and continues.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

/// Classification of a service error, driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retrying may succeed.
    Retryable,
    /// Permanent; retrying cannot succeed.
    Fatal,
}

/// Errors returned by external detection and transcription services.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// The provider rejected the call for exceeding its rate limit.
    #[error("rate limited")]
    RateLimited,

    /// The provider returned a server-side error status.
    #[error("server error: status {status}")]
    Server {
        /// The HTTP status code.
        status: u16,
    },

    /// The call did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The provider could not be reached.
    #[error("connection failed: {message}")]
    Connect {
        /// Description of the connection failure.
        message: String,
    },

    /// The provider rejected the request as malformed or unauthorized.
    #[error("client error: status {status}")]
    Client {
        /// The HTTP status code.
        status: u16,
    },

    /// The response could not be parsed into the expected shape.
    #[error("malformed response: {message}")]
    Malformed {
        /// Description of the parse failure.
        message: String,
    },
}

impl ServiceError {
    /// Classifies this error as retryable or fatal.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::RateLimited
            | ServiceError::Server { .. }
            | ServiceError::Timeout
            | ServiceError::Connect { .. } => ErrorClass::Retryable,
            ServiceError::Client { .. } | ServiceError::Malformed { .. } => ErrorClass::Fatal,
        }
    }

    /// True when a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Maps an HTTP status code to the corresponding error.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ServiceError::RateLimited,
            500..=599 => ServiceError::Server { status },
            _ => ServiceError::Client { status },
        }
    }
}

/// Retry behavior of a [`ResilientInvoker`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay for exponential backoff.
    pub base: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Computes the backoff delay before retry number `attempt` (0-based):
    /// `min(base * 2^attempt + jitter, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
            Duration::from_millis(jitter_ms)
        };
        (exp + jitter).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retries: 5,
            max_jitter: Duration::from_secs(1),
        }
    }
}

/// Wraps external service calls with bounded concurrency and retry.
///
/// One invoker is created per service; cloning shares the concurrency bound.
#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    limit: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl ResilientInvoker {
    /// Creates an invoker allowing `max_concurrency` in-flight calls.
    pub fn new(max_concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(max_concurrency.max(1))),
            policy,
        }
    }

    /// Invokes `op`, holding a concurrency permit for the duration of every
    /// attempt, retrying retryable failures with exponential backoff.
    ///
    /// `op` is called once per attempt and must be safe to re-invoke.
    pub async fn invoke<T, F, Fut>(&self, op: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let _permit = self
            .limit
            .acquire()
            .await
            .map_err(|_| ServiceError::Connect {
                message: "concurrency limiter closed".to_string(),
            })?;

        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying service call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_jitter_policy(base_ms: u64, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(60),
            max_retries,
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn classification_splits_retryable_and_fatal() {
        assert!(ServiceError::RateLimited.is_retryable());
        assert!(ServiceError::Server { status: 503 }.is_retryable());
        assert!(ServiceError::Timeout.is_retryable());
        assert!(!ServiceError::Client { status: 400 }.is_retryable());
        assert!(
            !ServiceError::Malformed {
                message: "bad json".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ServiceError::from_status(429),
            ServiceError::RateLimited
        ));
        assert!(matches!(
            ServiceError::from_status(502),
            ServiceError::Server { status: 502 }
        ));
        assert!(matches!(
            ServiceError::from_status(404),
            ServiceError::Client { status: 404 }
        ));
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            base: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_retries: 5,
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_retryable_failures() {
        let invoker = ResilientInvoker::new(1, no_jitter_policy(100, 5));
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let result = invoker
            .invoke(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ServiceError::Server { status: 500 })
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Exactly two backoff sleeps: 100 ms + 200 ms.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_raises_immediately() {
        let invoker = ResilientInvoker::new(1, no_jitter_policy(100, 5));
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = invoker
            .invoke(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Client { status: 400 })
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Client { status: 400 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_error() {
        let invoker = ResilientInvoker::new(1, no_jitter_policy(10, 2));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = invoker
            .invoke(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Timeout)
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Timeout)));
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let invoker = ResilientInvoker::new(2, no_jitter_policy(10, 0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let invoker = invoker.clone();
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    invoker
                        .invoke(|| {
                            let in_flight = Arc::clone(&in_flight);
                            let peak = Arc::clone(&peak);
                            async move {
                                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, ServiceError>(())
                            }
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
