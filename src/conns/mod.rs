//! Provider connection setup.
//!
//! # Responsibilities
//! - Validate region and account before any client exists
//! - Build the shared HTTP client, with mTLS when configured
//! - Compose the retry policy: jitter backoff, standard retryer, per-service rules
//! - Hand out per-service clients, each built on first use
//!
//! # Data Flow
//! ```text
//! ProviderConfig
//!     → endpoints.rs (region check, partition, DNS suffix)
//!     → account.rs (allowed / forbidden account IDs)
//!     → net::configure_mtls → reqwest::Client
//!     → client.rs: AwsClient { LazyClient<ServiceClient> per service }
//!         → ServiceClient::call → resilience::retry
//! ```

pub mod account;
pub mod client;
pub mod endpoints;

use thiserror::Error;

use crate::net::TlsError;
use crate::resilience::ApiError;

pub use client::{AwsClient, ServiceClient};
pub use endpoints::{EndpointResolver, Partition, ResolvedEndpoint};

/// Errors from setting up or using provider connections.
#[derive(Debug, Error)]
pub enum ConnsError {
    #[error("region is required")]
    MissingRegion,

    #[error("invalid AWS region: {0}")]
    InvalidRegion(String),

    #[error("Account ID not allowed ({0})")]
    AccountNotAllowed(String),

    #[error("Forbidden account ID ({0})")]
    ForbiddenAccount(String),

    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("invalid endpoint URL {url}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("configuring TLS: {0}")]
    Tls(#[from] TlsError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(#[from] ApiError),
}
