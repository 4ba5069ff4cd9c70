//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection layer produces:
//!     → tracing events (client setup, TLS configuration, retry decisions)
//!     → metrics.rs counters (retry attempts, exhausted retries, lazy inits)
//!
//! Consumers:
//!     → logging.rs subscriber installed by the binary (stderr, text or JSON)
//!     → whatever metrics recorder the embedding process installs
//! ```

pub mod logging;
pub mod metrics;
