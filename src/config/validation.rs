//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Region known to a partition, unless validation is skipped
//! - Account IDs well formed, allow and deny lists not both set
//! - Endpoint overrides name a known service and parse as URLs
//! - TLS settings complete and pointing at existing files
//!
//! Returns all validation errors, not just the first.

use thiserror::Error;

use crate::config::schema::ProviderConfig;
use crate::conns::{account, endpoints};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("region is required")]
    MissingRegion,

    #[error("invalid AWS region: {0}")]
    InvalidRegion(String),

    #[error("invalid account ID {0:?}: expected 12 digits")]
    InvalidAccountId(String),

    #[error("allowed_account_ids and forbidden_account_ids cannot both be set")]
    ConflictingAccountLists,

    #[error("endpoint override for unknown service {0:?}")]
    UnknownEndpointService(String),

    #[error("endpoint override for {service} is not a valid URL: {url}")]
    InvalidEndpointUrl { service: String, url: String },

    #[error("retries.max_retry_delay_ms must be greater than 0")]
    ZeroRetryDelay,

    #[error("tls: {0}")]
    Tls(String),
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ProviderConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.region.as_deref() {
        None | Some("") => errors.push(ValidationError::MissingRegion),
        Some(region) if !config.skip_region_validation => {
            if endpoints::validate_region(region).is_err() {
                errors.push(ValidationError::InvalidRegion(region.to_string()));
            }
        }
        Some(_) => {}
    }

    let ids = config
        .account_id
        .iter()
        .chain(&config.allowed_account_ids)
        .chain(&config.forbidden_account_ids);
    for id in ids {
        if !account::is_account_id(id) {
            errors.push(ValidationError::InvalidAccountId(id.clone()));
        }
    }
    if !config.allowed_account_ids.is_empty() && !config.forbidden_account_ids.is_empty() {
        errors.push(ValidationError::ConflictingAccountLists);
    }

    for (service, url) in &config.endpoints {
        if !endpoints::is_endpoint_key(service) {
            errors.push(ValidationError::UnknownEndpointService(service.clone()));
        }
        if !url.is_empty() && url::Url::parse(url).is_err() {
            errors.push(ValidationError::InvalidEndpointUrl {
                service: service.clone(),
                url: url.clone(),
            });
        }
    }

    if config.retries.max_retry_delay_ms == 0 {
        errors.push(ValidationError::ZeroRetryDelay);
    }

    if let Err(e) = config.tls.validate() {
        errors.push(ValidationError::Tls(e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
