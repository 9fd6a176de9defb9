//! Retry/timeout executor for tunneled calls
//!
//! Every attempt races the operation against a deadline. A deadline hit fails
//! the whole call at once and is never retried. Operation errors are
//! classified by a predicate: non-retryable errors propagate immediately,
//! retryable ones are retried after an exponentially growing delay until the
//! attempt budget runs out.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::RetryPolicy;

/// Outcome of a retried call
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: Error + 'static,
{
    /// An attempt outlived the per-attempt deadline
    #[error("Operation timed out after {after:?} on attempt {attempt}")]
    Timeout { after: Duration, attempt: u32 },

    /// Every attempt failed with a retryable error
    #[error("Operation failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The operation failed with an error the predicate refused to retry
    #[error(transparent)]
    Aborted(E),
}

/// A successful value together with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Exponential backoff without jitter
///
/// Delays are deterministic so that retry timing is reproducible.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from a retry policy
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.initial_delay, policy.max_delay, policy.backoff_multiplier)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            current: initial,
            max,
            multiplier,
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = std::cmp::min(self.current, self.max);
        // The product may exceed what a Duration can hold
        let scaled = self.current.as_secs_f64() * self.multiplier.max(1.0);
        self.current = Duration::try_from_secs_f64(scaled).map_or(self.max, |next| next.min(self.max));
        delay
    }
}

/// Runs operations under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `op` with the default retry predicate ([`is_retryable`])
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.execute(op, |e: &E| is_retryable(e))
            .await
            .map(|attempted| attempted.value)
    }

    /// Run `op`, asking `should_retry` whether each failure may be retried
    pub async fn run_with<T, E, F, Fut, P>(&self, op: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
        P: Fn(&E) -> bool,
    {
        self.execute(op, should_retry)
            .await
            .map(|attempted| attempted.value)
    }

    /// Run `op` and report how many attempts the success took
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = ExponentialBackoff::from_policy(&self.policy);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(self.policy.timeout, op()).await {
                Err(_) => {
                    tracing::warn!(
                        "Attempt {}/{} timed out after {:?}; not retrying",
                        attempt,
                        max_attempts,
                        self.policy.timeout
                    );
                    return Err(RetryError::Timeout {
                        after: self.policy.timeout,
                        attempt,
                    });
                }
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        tracing::info!("Operation succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Ok(Err(error)) => error,
            };

            if !should_retry(&error) {
                tracing::debug!("Attempt {} failed with non-retryable error: {}", attempt, error);
                return Err(RetryError::Aborted(error));
            }

            if attempt >= max_attempts {
                tracing::warn!("Giving up after {} attempts: {}", attempt, error);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

const RETRYABLE_KINDS: &[std::io::ErrorKind] = &[
    std::io::ErrorKind::ConnectionRefused,
    std::io::ErrorKind::ConnectionReset,
    std::io::ErrorKind::ConnectionAborted,
    std::io::ErrorKind::NotConnected,
    std::io::ErrorKind::BrokenPipe,
    std::io::ErrorKind::TimedOut,
];

const RETRYABLE_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "connection lost",
    "broken pipe",
    "econnrefused",
    "econnreset",
    "etimedout",
    "enotfound",
    "eai_again",
    "could not resolve hostname",
    "temporary failure in name resolution",
];

const CLIENT_ERROR_MARKERS: &[&str] = &[
    "http 400",
    "http 401",
    "http 403",
    "bad request",
    "unauthorized",
    "forbidden",
    "permission denied",
];

/// Default retry predicate
///
/// Walks the error and its sources. Client-class failures (bad request,
/// unauthorized, forbidden) are never retried; recognised network failures
/// are.
pub fn is_retryable(err: &(dyn Error + 'static)) -> bool {
    let mut retryable = false;
    let mut current: Option<&(dyn Error + 'static)> = Some(err);

    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if CLIENT_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
            return false;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if RETRYABLE_KINDS.contains(&io.kind()) {
                retryable = true;
            }
        }
        if RETRYABLE_MARKERS.iter().any(|m| message.contains(m)) {
            retryable = true;
        }
        current = e.source();
    }

    retryable
}
