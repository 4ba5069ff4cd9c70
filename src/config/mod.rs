//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! provider.toml
//!     → loader.rs (read, parse, overlay AWS_* environment variables)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ProviderConfig (validated, immutable)
//!     → conns::AwsClient::from_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so a minimal file only names a region
//! - The file wins over the environment; the environment only fills gaps
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{HttpConfig, LoggingConfig, ProviderConfig, RetryConfig};
pub use validation::ValidationError;
