//! Shared utilities for the integration tests.

use std::future::Future;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// A canned reply from [`start_programmable_backend`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub error_type: Option<&'static str>,
    pub body: String,
}

#[allow(dead_code)]
impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            error_type: None,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, error_type: &'static str, body: &str) -> Self {
        Self {
            status,
            error_type: Some(error_type),
            body: body.to_string(),
        }
    }
}

/// Start a plain HTTP backend on an ephemeral port. `f` is called once per
/// request to decide the reply.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let reply = f().await;
                        let status_text = match reply.status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            403 => "403 Forbidden",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "500 Internal Server Error",
                        };
                        let error_type = reply
                            .error_type
                            .map(|t| format!("x-amzn-ErrorType: {t}\r\n"))
                            .unwrap_or_default();

                        let response_str = format!(
                            "HTTP/1.1 {}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            error_type,
                            reply.body.len(),
                            reply.body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

#[allow(dead_code)]
async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

#[allow(dead_code)]
fn read_certs(path: PathBuf) -> Vec<CertificateDer<'static>> {
    let file = std::fs::File::open(path).unwrap();
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .unwrap()
}

#[allow(dead_code)]
fn read_key(path: PathBuf) -> PrivateKeyDer<'static> {
    let file = std::fs::File::open(path).unwrap();
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .unwrap()
        .unwrap()
}

/// Server config presenting the fixture server certificate and requiring a
/// client certificate issued by the fixture CA.
#[allow(dead_code)]
pub fn mtls_server_config() -> ServerConfig {
    let provider = provider_conns::net::tls::crypto_provider();

    let mut roots = RootCertStore::empty();
    for cert in read_certs(fixture("ca.pem")) {
        roots.add(cert).unwrap();
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();

    ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(read_certs(fixture("server.pem")), read_key(fixture("server.key")))
        .unwrap()
}

/// Server config with a certificate from a CA generated on the spot, so no
/// fixture bundle trusts it. No client certificate is requested.
#[allow(dead_code)]
pub fn untrusted_server_config() -> ServerConfig {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let server_key = rcgen::KeyPair::generate().unwrap();
    let server_cert = rcgen::CertificateParams::new(vec!["127.0.0.1".to_string()])
        .unwrap()
        .signed_by(&server_key, &ca_cert, &ca_key)
        .unwrap();

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server_key.serialize_der()));
    ServerConfig::builder_with_provider(provider_conns::net::tls::crypto_provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![server_cert.der().clone(), ca_cert.der().clone()], key)
        .unwrap()
}

/// Serve `GET /` over TLS on an ephemeral port.
#[allow(dead_code)]
pub fn start_tls_server(mut config: ServerConfig) -> SocketAddr {
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route("/", get(|| async { "ok" }));
    let server = axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(Arc::new(config)));
    tokio::spawn(async move {
        let _ = server.serve(app.into_make_service()).await;
    });

    addr
}
