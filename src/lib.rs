//! Connection core of an AWS resource provider.
//!
//! Governs how calls to AWS service APIs are retried, paced and
//! authenticated: v1-SDK-compatible backoff with jitter, per-service retry
//! rules layered over a standard retryer, lazily built service clients, and
//! client-certificate (mTLS) configuration of the outbound HTTP transport.

pub mod config;
pub mod conns;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod sync;

pub use config::schema::ProviderConfig;
pub use conns::{AwsClient, ConnsError, ServiceClient};
