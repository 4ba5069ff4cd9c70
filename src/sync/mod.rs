//! Synchronization primitives shared across the connection layer.
//!
//! # Data Flow
//! ```text
//! Provider configuration
//!     → MutexKV created once, shared via Arc
//!         → JitterBackoff locks "seeded-rand" around each jitter draw
//!     → AwsClient holds one LazyClient per service
//!         → first client() call builds the ServiceClient, later calls read it
//! ```

pub mod lazy;
pub mod mutexkv;

pub use lazy::LazyClient;
pub use mutexkv::{MutexKV, MutexKVGuard};
