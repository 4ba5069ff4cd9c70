//! Service error shape and retry classification.
//!
//! # Responsibilities
//! - Define `ApiError`, the error a service call surfaces
//! - Classify errors as throttling, transient or neither
//! - Walk the `source()` chain so wrapped errors classify like their cause

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Boxed error used where a retry hook may fail for reasons of its own.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error codes a service uses to say "slow down".
pub const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

/// Error codes for failures that are worth retrying as-is.
pub const TRANSIENT_CODES: &[&str] = &[
    "RequestError",
    "RequestTimeout",
    "RequestTimeoutException",
    "ResponseTimeout",
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
];

/// HTTP statuses treated as transient server failures.
pub const TRANSIENT_STATUS_CODES: &[u16] = &[500, 502, 503, 504];

/// An error returned by an AWS service API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} {operation}: {code}: {message}")]
pub struct ApiError {
    /// Service identifier (e.g. `ec2`).
    pub service: String,
    /// Operation name (e.g. `CreateVpnGateway`).
    pub operation: String,
    /// Service error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// HTTP status of the response, when one was received.
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: String::new(),
            operation: String::new(),
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Attach the service and operation that produced the error.
    pub fn with_operation(mut self, service: impl Into<String>, operation: impl Into<String>) -> Self {
        self.service = service.into();
        self.operation = operation.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_throttle(&self) -> bool {
        self.status == Some(429) || THROTTLE_CODES.contains(&self.code.as_str())
    }

    pub fn is_transient(&self) -> bool {
        TRANSIENT_CODES.contains(&self.code.as_str())
            || self
                .status
                .is_some_and(|s| TRANSIENT_STATUS_CODES.contains(&s))
    }
}

/// Iterate over `err` and every error in its source chain.
pub fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Find the first `ApiError` in the chain.
pub fn find_api_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ApiError> {
    chain(err).find_map(|e| e.downcast_ref::<ApiError>())
}

/// True if the error chain contains a throttling response.
pub fn is_throttle_error(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return api.is_throttle();
        }
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            return http.status().is_some_and(|s| s.as_u16() == 429);
        }
        false
    })
}

/// True if the error chain contains a transient failure: a transient service
/// code or status, a connection-level IO error, or a timed out HTTP call.
pub fn is_transient_error(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return api.is_transient();
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return is_transient_io(io_err.kind());
        }
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            return http.is_timeout()
                || http.is_connect()
                || http
                    .status()
                    .is_some_and(|s| TRANSIENT_STATUS_CODES.contains(&s.as_u16()));
        }
        false
    })
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

/// Default retryability: throttling or transient.
pub fn is_retryable_error(err: &(dyn StdError + 'static)) -> bool {
    is_throttle_error(err) || is_transient_error(err)
}
