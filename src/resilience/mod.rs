//! Resilience subsystem.
//!
//! # Responsibilities
//! - Compute retry delays (`backoff.rs`, v1-SDK-compatible jitter)
//! - Classify service errors as throttling or transient (`errors.rs`)
//! - Compose retry decisions from a standard retryer plus error predicates
//!   (`retries.rs`, `predicates.rs`)
//! - Drive an async operation through a retryer (`retries::retry`)
//!
//! # Data Flow
//! ```text
//! Service call fails:
//!     → Retryer::is_error_retryable (predicates first, then the standard rules)
//!     → Retryer::retry_delay → JitterBackoff (throttle floor, 2^n growth, cap)
//!     → tokio sleep, then the next attempt until max_attempts
//! ```

pub mod backoff;
pub mod errors;
pub mod predicates;
pub mod retries;

pub use backoff::{JitterBackoff, SharedRand, ThrottleClassifier};
pub use errors::{ApiError, BoxError};
pub use retries::{
    add_with_error_predicate, retry, retry_with_deadline, BackoffDelayer, RetryError, Retryer,
    StandardRetryer, WithErrorPredicate,
};
