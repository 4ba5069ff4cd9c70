//! Outbound network layer.
//!
//! # Data Flow
//! ```text
//! TlsSettings (client cert, key, passphrase, CA bundle)
//!     → tls.rs (validate paths, load chain, load or decrypt key)
//!         → pkcs5.rs (legacy DEK-Info decryption when PKCS#8 fails)
//!     → transport.rs (append identity, replace roots)
//!         → Standard: copy of the shared transport swapped in
//!         → Buildable: option applied on every build()
//!         → Prebuilt: rejected
//!     → reqwest::Client over a preconfigured rustls ClientConfig
//! ```

pub mod pkcs5;
pub mod tls;
pub mod transport;

pub use tls::{configure_mtls, TlsError, TlsMaterial, TlsSettings};
pub use transport::{BuildableHttpClient, HttpClient, StandardHttpClient, Transport};
