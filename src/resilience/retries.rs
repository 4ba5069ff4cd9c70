//! Retry decisions and the loop that applies them.
//!
//! # Responsibilities
//! - Define the `BackoffDelayer` and `Retryer` plug points
//! - Provide the standard retryer (default classification + pluggable backoff)
//! - Layer extra "retry this error" predicates over any retryer
//! - Drive an async operation through a retryer, with an optional deadline
//!
//! # Data Flow
//! ```text
//! operation fails with err
//!     → retryer.is_error_retryable(err)     (predicate first, then wrapped)
//!     → attempts left? retryer.retry_delay(attempt, err)
//!     → sleep, attempt again
//! ```

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::observability::metrics;
use crate::resilience::errors::{self, BoxError};

/// Computes how long to wait before retry number `attempt` (0-based).
pub trait BackoffDelayer: Send + Sync {
    fn backoff_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError>;
}

/// Decides whether and when a failed call is attempted again.
pub trait Retryer: Send + Sync {
    /// Whether `err` may be retried. `None` (no error) is never retryable.
    fn is_error_retryable(&self, err: Option<&(dyn StdError + 'static)>) -> bool;

    /// Total attempts allowed, including the first.
    fn max_attempts(&self) -> u32;

    /// Delay before retry number `attempt` (0-based).
    fn retry_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError>;
}

impl<R: Retryer + ?Sized> Retryer for Arc<R> {
    fn is_error_retryable(&self, err: Option<&(dyn StdError + 'static)>) -> bool {
        (**self).is_error_retryable(err)
    }

    fn max_attempts(&self) -> u32 {
        (**self).max_attempts()
    }

    fn retry_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError> {
        (**self).retry_delay(attempt, err)
    }
}

/// Default retryer: throttling and transient errors are retryable, delays
/// come from the configured backoff.
#[derive(Clone)]
pub struct StandardRetryer {
    max_attempts: u32,
    backoff: Arc<dyn BackoffDelayer>,
}

impl std::fmt::Debug for StandardRetryer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardRetryer")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl StandardRetryer {
    pub fn new(max_attempts: u32, backoff: impl BackoffDelayer + 'static) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }
}

impl Retryer for StandardRetryer {
    fn is_error_retryable(&self, err: Option<&(dyn StdError + 'static)>) -> bool {
        err.is_some_and(errors::is_retryable_error)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn retry_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError> {
        self.backoff.backoff_delay(attempt, err)
    }
}

/// Wraps a retryer so that errors matching `predicate` are always retryable.
///
/// Errors the predicate rejects, and the absence of an error, fall through to
/// the wrapped retryer. Attempts and delays are the wrapped retryer's.
#[derive(Debug, Clone)]
pub struct WithErrorPredicate<R, P> {
    inner: R,
    predicate: P,
}

impl<R, P> WithErrorPredicate<R, P> {
    pub fn new(inner: R, predicate: P) -> Self {
        Self { inner, predicate }
    }
}

impl<R, P> Retryer for WithErrorPredicate<R, P>
where
    R: Retryer,
    P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn is_error_retryable(&self, err: Option<&(dyn StdError + 'static)>) -> bool {
        if err.is_some_and(|e| (self.predicate)(e)) {
            return true;
        }
        self.inner.is_error_retryable(err)
    }

    fn max_attempts(&self) -> u32 {
        self.inner.max_attempts()
    }

    fn retry_delay(
        &self,
        attempt: u32,
        err: Option<&(dyn StdError + 'static)>,
    ) -> Result<Duration, BoxError> {
        self.inner.retry_delay(attempt, err)
    }
}

/// Layer `predicate` over `retryer`.
pub fn add_with_error_predicate<R, P>(retryer: R, predicate: P) -> WithErrorPredicate<R, P>
where
    R: Retryer,
    P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    WithErrorPredicate::new(retryer, predicate)
}

/// Failure of a deadline-bounded retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed and was not, or could no longer be, retried.
    #[error(transparent)]
    Operation(E),

    /// The overall deadline passed before the operation succeeded.
    #[error("operation did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl<E> RetryError<E> {
    /// The operation's own error, if that is what ended the loop.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::DeadlineExceeded(_) => None,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts. The last error is returned unchanged.
pub async fn retry<R, F, Fut, T, E>(retryer: &R, operation: &str, mut op: F) -> Result<T, E>
where
    R: Retryer + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    let max_attempts = retryer.max_attempts().max(1);
    let mut attempt = 0u32;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryer.is_error_retryable(Some(&err)) {
            tracing::debug!(operation, attempt, error = %err, "Error is not retryable");
            return Err(err);
        }

        if attempt + 1 >= max_attempts {
            tracing::warn!(operation, attempts = attempt + 1, error = %err, "Retries exhausted");
            metrics::record_retry_exhausted(operation);
            return Err(err);
        }

        let delay = match retryer.retry_delay(attempt, Some(&err)) {
            Ok(delay) => delay,
            Err(delay_err) => {
                tracing::warn!(operation, error = %delay_err, "Failed to compute retry delay");
                return Err(err);
            }
        };

        tracing::debug!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after error"
        );
        metrics::record_retry_attempt(operation);

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Like [`retry`], but gives up once `deadline` has elapsed in total.
pub async fn retry_with_deadline<R, F, Fut, T, E>(
    retryer: &R,
    operation: &str,
    deadline: Duration,
    op: F,
) -> Result<T, RetryError<E>>
where
    R: Retryer + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    match tokio::time::timeout(deadline, retry(retryer, operation, op)).await {
        Ok(result) => result.map_err(RetryError::Operation),
        Err(_) => {
            tracing::warn!(operation, deadline_ms = deadline.as_millis() as u64, "Retry deadline exceeded");
            Err(RetryError::DeadlineExceeded(deadline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::errors::ApiError;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Plain(&'static str);

    impl fmt::Display for Plain {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Plain {}

    /// Fixed delay so the tests don't sleep for long.
    struct FixedDelay(Duration);

    impl BackoffDelayer for FixedDelay {
        fn backoff_delay(
            &self,
            _attempt: u32,
            _err: Option<&(dyn StdError + 'static)>,
        ) -> Result<Duration, BoxError> {
            Ok(self.0)
        }
    }

    fn standard(max_attempts: u32) -> StandardRetryer {
        StandardRetryer::new(max_attempts, FixedDelay(Duration::from_millis(1)))
    }

    #[test]
    fn test_predicate_takes_precedence() {
        let retryer = add_with_error_predicate(standard(3), |err: &(dyn StdError + 'static)| {
            err.to_string().contains("testing")
        });

        assert!(retryer.is_error_retryable(Some(&Plain("this is testing"))));
        assert!(!retryer.is_error_retryable(Some(&Plain("this is not retryable"))));
        assert!(!retryer.is_error_retryable(None));
    }

    #[test]
    fn test_predicate_falls_back_to_wrapped_decision() {
        let retryer = add_with_error_predicate(standard(3), |_: &(dyn StdError + 'static)| false);
        let throttled = ApiError::new("ThrottlingException", "Rate exceeded");
        assert!(retryer.is_error_retryable(Some(&throttled)));
    }

    #[test]
    fn test_decorator_delegates_attempts_and_delay() {
        let retryer = add_with_error_predicate(standard(7), |_: &(dyn StdError + 'static)| true);
        assert_eq!(retryer.max_attempts(), 7);
        assert_eq!(
            retryer.retry_delay(3, None).unwrap(),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_decorators_stack() {
        let once = add_with_error_predicate(standard(3), |e: &(dyn StdError + 'static)| {
            e.to_string() == "first"
        });
        let twice = add_with_error_predicate(once, |e: &(dyn StdError + 'static)| {
            e.to_string() == "second"
        });
        assert!(twice.is_error_retryable(Some(&Plain("first"))));
        assert!(twice.is_error_retryable(Some(&Plain("second"))));
        assert!(!twice.is_error_retryable(Some(&Plain("third"))));
    }

    #[test]
    fn test_standard_retryer_minimum_one_attempt() {
        assert_eq!(standard(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<&str, ApiError> = retry(&standard(5), "Describe", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::new("RequestLimitExceeded", "slow down"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), ApiError> = retry(&standard(5), "Create", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::new("ValidationException", "bad input"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code, "ValidationException");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_at_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), ApiError> = retry(&standard(4), "Create", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::new("Throttling", "Rate exceeded"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_with_deadline_expires() {
        let slow = StandardRetryer::new(100, FixedDelay(Duration::from_millis(50)));
        let result: Result<(), RetryError<ApiError>> =
            retry_with_deadline(&slow, "Wait", Duration::from_millis(120), || async {
                Err(ApiError::new("RequestTimeout", "timeout"))
            })
            .await;

        match result {
            Err(RetryError::DeadlineExceeded(d)) => assert_eq!(d, Duration::from_millis(120)),
            other => panic!("expected deadline error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_with_deadline_passes_through_error() {
        let result: Result<(), RetryError<ApiError>> =
            retry_with_deadline(&standard(3), "Get", Duration::from_secs(5), || async {
                Err(ApiError::new("AccessDenied", "no"))
            })
            .await;

        let err = result.unwrap_err().into_operation_error().unwrap();
        assert_eq!(err.code, "AccessDenied");
    }
}
