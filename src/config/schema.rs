//! Configuration schema definitions.
//!
//! This module defines the provider configuration structure. All types derive
//! Serde traits for deserialization from TOML files; every section has
//! defaults so a minimal file only names a region.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::tls::TlsSettings;
use crate::net::transport::Transport;
use crate::observability::logging;

/// Retries used when neither the file nor `AWS_MAX_ATTEMPTS` sets them.
pub const DEFAULT_MAX_RETRIES: u32 = 25;

/// Root configuration for the provider connection layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Region to operate in (e.g. `us-west-2`).
    pub region: Option<String>,

    /// Named profile from the shared credentials file.
    pub profile: Option<String>,

    /// Account the credentials belong to, checked against the lists below.
    pub account_id: Option<String>,

    pub allowed_account_ids: Vec<String>,

    pub forbidden_account_ids: Vec<String>,

    /// Accept regions missing from the built-in region table.
    pub skip_region_validation: bool,

    /// Skip TLS verification of service endpoints.
    pub insecure: bool,

    /// Per-service endpoint overrides, keyed by service identifier.
    pub endpoints: BTreeMap<String, String>,

    pub retries: RetryConfig,

    pub http: HttpConfig,

    /// Client certificate and CA bundle.
    pub tls: TlsSettings,

    pub logging: LoggingConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Unset means the default (25).
    pub max_retries: Option<u32>,

    /// Upper bound on a single backoff delay, in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            max_retry_delay_ms: 300_000,
        }
    }
}

impl RetryConfig {
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Total attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries().saturating_add(1)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds. 0 disables it.
    pub request_timeout_secs: u64,

    /// Overrides the default `User-Agent`.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 0,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    /// Transport carrying these settings, before any TLS material is added.
    pub fn transport(&self, insecure: bool) -> Transport {
        let mut transport = Transport {
            insecure,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
            ..Transport::default()
        };
        if let Some(user_agent) = &self.user_agent {
            transport.user_agent = user_agent.clone();
        }
        transport
    }
}

/// Logging settings used by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: logging::DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}
