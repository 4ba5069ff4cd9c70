//! Outbound HTTP transport and the client shapes TLS can be installed into.
//!
//! A [`Transport`] is the mutable description of how connections are made
//! (client identities, trust roots, timeouts). It turns into a
//! `reqwest::Client` through a preconfigured `rustls::ClientConfig`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::net::tls::{crypto_provider, TlsError};

/// Connection settings shared by every request of a client.
#[derive(Debug, Clone)]
pub struct Transport {
    /// Client identities offered during the handshake, in order of preference.
    pub identities: Vec<Arc<CertifiedKey>>,
    /// Trust roots. `None` uses the bundled web PKI roots.
    pub roots: Option<Arc<RootCertStore>>,
    /// Skip server certificate verification.
    pub insecure: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            identities: Vec::new(),
            roots: None,
            insecure: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            user_agent: concat!("provider-conns/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Transport {
    /// Build the rustls configuration this transport describes.
    pub fn tls_config(&self) -> Result<ClientConfig, TlsError> {
        let provider = crypto_provider();
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let builder = if self.insecure {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
        } else {
            let roots = match &self.roots {
                Some(roots) => RootCertStore::clone(roots),
                None => RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
                },
            };
            builder.with_root_certificates(roots)
        };

        let mut config = if self.identities.is_empty() {
            builder.with_no_client_auth()
        } else {
            builder.with_client_cert_resolver(Arc::new(IdentityResolver {
                identities: self.identities.clone(),
            }))
        };
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }

    /// Build a `reqwest::Client` over this transport.
    pub fn build_client(&self) -> Result<reqwest::Client, TlsError> {
        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(self.tls_config()?)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str());
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

/// Sends the first identity whose key can sign with a scheme the server offers.
#[derive(Debug)]
struct IdentityResolver {
    identities: Vec<Arc<CertifiedKey>>,
}

impl ResolvesClientCert for IdentityResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.identities
            .iter()
            .find(|identity| identity.key.choose_scheme(sigschemes).is_some())
            .cloned()
    }

    fn has_certs(&self) -> bool {
        !self.identities.is_empty()
    }
}

/// Accepts any server certificate. Signatures are still checked.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client whose transport sits behind an `Arc` shared with earlier clones.
///
/// Changes go through [`set_transport`](Self::set_transport) with a fresh
/// copy; holders of the previous transport never see them.
#[derive(Debug, Clone, Default)]
pub struct StandardHttpClient {
    transport: Arc<Transport>,
}

impl StandardHttpClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn set_transport(&mut self, transport: Transport) {
        self.transport = Arc::new(transport);
    }

    pub fn build(&self) -> Result<reqwest::Client, TlsError> {
        self.transport.build_client()
    }
}

type TransportOption = Box<dyn Fn(&mut Transport) + Send + Sync>;

/// Client assembled at `build()` time from a base transport plus registered
/// transport options, applied in registration order.
#[derive(Default)]
pub struct BuildableHttpClient {
    base: Transport,
    options: Vec<TransportOption>,
}

impl fmt::Debug for BuildableHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildableHttpClient")
            .field("base", &self.base)
            .field("options", &self.options.len())
            .finish()
    }
}

impl BuildableHttpClient {
    pub fn new(base: Transport) -> Self {
        Self {
            base,
            options: Vec::new(),
        }
    }

    /// Register a transport mutation applied on every `build()`.
    pub fn with_transport_options<F>(&mut self, option: F)
    where
        F: Fn(&mut Transport) + Send + Sync + 'static,
    {
        self.options.push(Box::new(option));
    }

    /// The transport `build()` would use.
    pub fn resolved_transport(&self) -> Transport {
        let mut transport = self.base.clone();
        for option in &self.options {
            option(&mut transport);
        }
        transport
    }

    pub fn build(&self) -> Result<reqwest::Client, TlsError> {
        self.resolved_transport().build_client()
    }
}

/// The HTTP client shapes the connection layer accepts.
#[derive(Debug)]
pub enum HttpClient {
    Standard(StandardHttpClient),
    Buildable(BuildableHttpClient),
    /// Already built; its TLS settings can no longer change.
    Prebuilt(reqwest::Client),
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClient::Standard(StandardHttpClient::default())
    }
}

impl HttpClient {
    pub fn build(&self) -> Result<reqwest::Client, TlsError> {
        match self {
            HttpClient::Standard(client) => client.build(),
            HttpClient::Buildable(client) => client.build(),
            HttpClient::Prebuilt(client) => Ok(client.clone()),
        }
    }

    /// The transport requests will use, when the shape exposes one.
    pub fn transport(&self) -> Option<Transport> {
        match self {
            HttpClient::Standard(client) => Some(Transport::clone(client.transport())),
            HttpClient::Buildable(client) => Some(client.resolved_transport()),
            HttpClient::Prebuilt(_) => None,
        }
    }
}
