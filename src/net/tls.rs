//! Client certificate (mTLS) and CA bundle configuration.
//!
//! Loads a client certificate and private key, optionally protected by a
//! passphrase, plus an optional CA bundle, and installs them into the
//! outbound HTTP transport.
//!
//! An encrypted key is tried as-is first, then as a PKCS#8
//! `ENCRYPTED PRIVATE KEY`, then as a legacy OpenSSL PEM
//! (`Proc-Type: 4,ENCRYPTED`). When both decryptions fail the error carries
//! both causes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::pkcs5::{self, Pkcs5Error};
use crate::net::transport::{HttpClient, Transport};

/// mTLS and trust settings from the provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM client certificate (chain).
    pub client_certificate: Option<PathBuf>,
    /// PEM private key for the client certificate.
    pub client_private_key: Option<PathBuf>,
    /// Passphrase protecting `client_private_key`.
    pub client_private_key_passphrase: Option<String>,
    /// PEM bundle replacing the default trust roots.
    pub custom_ca_bundle: Option<PathBuf>,
}

impl TlsSettings {
    /// Whether anything needs installing into the transport.
    pub fn is_configured(&self) -> bool {
        self.client_certificate.is_some() || self.custom_ca_bundle.is_some()
    }

    /// Cheap checks that do not parse any file: companions present, files exist.
    pub fn validate(&self) -> Result<(), TlsError> {
        match (&self.client_certificate, &self.client_private_key) {
            (Some(cert), None) => return Err(TlsError::CertificateWithoutKey(cert.clone())),
            (None, Some(key)) => return Err(TlsError::KeyWithoutCertificate(key.clone())),
            _ => {}
        }

        let files = [
            ("client certificate", &self.client_certificate),
            ("client private key", &self.client_private_key),
            ("CA bundle", &self.custom_ca_bundle),
        ];
        for (kind, path) in files {
            if let Some(path) = path {
                if !path.exists() {
                    return Err(TlsError::NotFound {
                        kind,
                        path: path.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Errors from loading TLS material or installing it into a client.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("client certificate {0} is configured without a client private key")]
    CertificateWithoutKey(PathBuf),

    #[error("client private key {0} is configured without a client certificate")]
    KeyWithoutCertificate(PathBuf),

    #[error("{kind} file {path} does not exist")]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing PEM in {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("decrypting private key {path}: as PKCS#8: {pkcs8}; as PKCS#5: {pkcs5}")]
    Decrypt {
        path: PathBuf,
        pkcs8: String,
        pkcs5: Pkcs5Error,
    },

    #[error("client certificate and key in {path} rejected: {source}")]
    InvalidKeyPair {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("HTTP client is neither a standard nor a buildable client; cannot configure TLS")]
    UnsupportedHttpClient,

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("building HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// The crypto provider used for every client configuration.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Load material and install it into `client`, returning what was installed.
///
/// Nothing configured is a no-op that returns empty material. A prebuilt
/// client cannot be modified and returns [`TlsError::UnsupportedHttpClient`].
pub fn configure_mtls(settings: &TlsSettings, client: &mut HttpClient) -> Result<TlsMaterial, TlsError> {
    settings.validate()?;
    if !settings.is_configured() {
        return Ok(TlsMaterial::default());
    }
    if matches!(client, HttpClient::Prebuilt(_)) {
        return Err(TlsError::UnsupportedHttpClient);
    }

    let material = TlsMaterial::load(settings)?;

    match client {
        HttpClient::Standard(standard) => {
            let mut transport = Transport::clone(standard.transport());
            material.apply(&mut transport);
            standard.set_transport(transport);
            tracing::info!(
                client_certificate = material.identity.is_some(),
                custom_ca_bundle = material.roots.is_some(),
                "mTLS configured on standard HTTP client"
            );
        }
        HttpClient::Buildable(buildable) => {
            tracing::info!(
                client_certificate = material.identity.is_some(),
                custom_ca_bundle = material.roots.is_some(),
                "mTLS registered on buildable HTTP client"
            );
            let installed = material.clone();
            buildable.with_transport_options(move |transport| installed.apply(transport));
        }
        HttpClient::Prebuilt(_) => return Err(TlsError::UnsupportedHttpClient),
    }
    Ok(material)
}

/// Parsed TLS material ready to install.
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub identity: Option<Arc<CertifiedKey>>,
    pub roots: Option<Arc<RootCertStore>>,
}

impl TlsMaterial {
    pub fn load(settings: &TlsSettings) -> Result<Self, TlsError> {
        let identity = match (&settings.client_certificate, &settings.client_private_key) {
            (Some(cert), Some(key)) => Some(Arc::new(load_key_pair(
                cert,
                key,
                settings.client_private_key_passphrase.as_deref(),
            )?)),
            _ => None,
        };
        let roots = settings
            .custom_ca_bundle
            .as_deref()
            .map(load_ca_bundle)
            .transpose()?
            .map(Arc::new);
        Ok(Self { identity, roots })
    }

    /// Append the identity and replace the trust roots.
    pub fn apply(&self, transport: &mut Transport) {
        if let Some(identity) = &self.identity {
            transport.identities.push(Arc::clone(identity));
        }
        if let Some(roots) = &self.roots {
            transport.roots = Some(Arc::clone(roots));
        }
    }
}

/// Load a certificate chain and its private key, decrypting the key when a
/// passphrase is given.
pub fn load_key_pair(
    cert_path: &Path,
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<CertifiedKey, TlsError> {
    let chain = load_certificates(cert_path)?;
    let key_pem = read_file(key_path)?;
    let provider = crypto_provider();

    let direct = parse_private_key(key_path, &key_pem).and_then(|key| {
        CertifiedKey::from_der(chain.clone(), key, &provider).map_err(|source| {
            TlsError::InvalidKeyPair {
                path: key_path.to_path_buf(),
                source,
            }
        })
    });

    let passphrase = match (direct, passphrase) {
        (Ok(certified), _) => return Ok(certified),
        (Err(err), None) => return Err(err),
        (Err(err), Some(passphrase)) => {
            tracing::debug!(path = %key_path.display(), error = %err, "key not usable as-is, decrypting");
            passphrase
        }
    };

    let key = decrypt_private_key(key_path, &key_pem, passphrase.as_bytes())?;
    CertifiedKey::from_der(chain, key, &provider).map_err(|source| TlsError::InvalidKeyPair {
        path: key_path.to_path_buf(),
        source,
    })
}

/// Decrypt a passphrase-protected key, PKCS#8 first, then legacy PKCS#5.
pub fn decrypt_private_key(
    path: &Path,
    pem_bytes: &[u8],
    passphrase: &[u8],
) -> Result<PrivateKeyDer<'static>, TlsError> {
    let block = pem::parse_many(pem_bytes)
        .map_err(|e| TlsError::Pem {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?
        .into_iter()
        .find(|block| block.tag().ends_with("PRIVATE KEY"))
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))?;

    let pkcs8_err = match decrypt_pkcs8(block.contents(), passphrase) {
        Ok(der) => {
            tracing::debug!(path = %path.display(), "decrypted PKCS#8 private key");
            return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)));
        }
        Err(err) => err,
    };

    match pkcs5::decrypt_pem_block(&block, passphrase) {
        Ok(der) => {
            tracing::debug!(path = %path.display(), tag = block.tag(), "decrypted legacy PEM private key");
            Ok(legacy_key_der(block.tag(), der))
        }
        Err(pkcs5) => Err(TlsError::Decrypt {
            path: path.to_path_buf(),
            pkcs8: pkcs8_err.to_string(),
            pkcs5,
        }),
    }
}

fn decrypt_pkcs8(der: &[u8], passphrase: &[u8]) -> Result<Vec<u8>, pkcs8::Error> {
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(der)?;
    let document = info.decrypt(passphrase)?;
    Ok(document.as_bytes().to_vec())
}

fn legacy_key_der(tag: &str, der: Vec<u8>) -> PrivateKeyDer<'static> {
    match tag {
        "EC PRIVATE KEY" => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
        "PRIVATE KEY" => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)),
        _ => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
    }
}

/// Parse every certificate in a PEM bundle into a root store.
pub fn load_ca_bundle(path: &Path) -> Result<RootCertStore, TlsError> {
    let certs = load_certificates(path)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    tracing::debug!(path = %path.display(), added, ignored, "loaded CA bundle");
    Ok(roots)
}

/// Read every `CERTIFICATE` block in a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bytes = read_file(path)?;
    let certs = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn parse_private_key(path: &Path, bytes: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut &bytes[..])
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}
