//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ProviderConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for environment variable {name}")]
    Env { name: &'static str, value: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, overlay the process environment, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<ProviderConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(
        path = %path.display(),
        region = config.region.as_deref().unwrap_or(""),
        max_retries = config.retries.max_retries(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse TOML without validating.
pub fn parse_config(content: &str) -> Result<ProviderConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Fill settings the file left unset from environment variables.
///
/// `AWS_REGION` wins over `AWS_DEFAULT_REGION`. `AWS_MAX_ATTEMPTS` counts the
/// first attempt, so it maps to `max_retries = attempts - 1`.
pub fn apply_env_overrides<F>(config: &mut ProviderConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if config.region.is_none() {
        config.region = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION"));
    }
    if config.profile.is_none() {
        config.profile = non_empty("AWS_PROFILE");
    }
    if config.retries.max_retries.is_none() {
        if let Some(value) = non_empty("AWS_MAX_ATTEMPTS") {
            let attempts = value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Env {
                    name: "AWS_MAX_ATTEMPTS",
                    value: value.clone(),
                })?;
            config.retries.max_retries = Some(attempts - 1);
        }
    }
    Ok(())
}
