//! Retry behavior of service clients against a misbehaving backend.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{start_programmable_backend, MockResponse};
use provider_conns::resilience::errors::find_api_error;
use provider_conns::resilience::RetryError;
use provider_conns::{AwsClient, ConnsError, ProviderConfig};

fn client_for(service: &str, addr: SocketAddr, max_retries: u32) -> AwsClient {
    let mut config = ProviderConfig {
        region: Some("us-east-1".into()),
        account_id: Some("123456789012".into()),
        ..Default::default()
    };
    config
        .endpoints
        .insert(service.to_string(), format!("http://{addr}"));
    config.retries.max_retries = Some(max_retries);
    config.retries.max_retry_delay_ms = 200;
    config.client().unwrap()
}

fn api_code(err: &ConnsError) -> Option<String> {
    find_api_error(err).map(|api| api.code.clone())
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        let n = calls_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                MockResponse::error(503, "ServiceUnavailable", "try later")
            } else {
                MockResponse::ok("done")
            }
        }
    })
    .await;

    let client = client_for("sts", addr, 5);
    let response = client
        .service("sts")
        .unwrap()
        .get("GetCallerIdentity", "/")
        .await
        .unwrap();

    assert_eq!(response.text().await.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async { MockResponse::error(500, "InternalFailure", "boom") }
    })
    .await;

    let client = client_for("sts", addr, 2);
    let err = client
        .service("sts")
        .unwrap()
        .get("GetCallerIdentity", "/")
        .await
        .unwrap_err();

    assert_eq!(api_code(&err).as_deref(), Some("InternalFailure"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async { MockResponse::error(400, "ValidationException", "bad input") }
    })
    .await;

    let client = client_for("sts", addr, 5);
    let err = client
        .service("sts")
        .unwrap()
        .get("GetCallerIdentity", "/")
        .await
        .unwrap_err();

    let api = find_api_error(&err).unwrap();
    assert_eq!(api.code, "ValidationException");
    assert_eq!(api.message, "bad input");
    assert_eq!(api.status, Some(400));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_service_rule_retries_otherwise_fatal_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        let n = calls_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                MockResponse::error(
                    400,
                    "VpnGatewayLimitExceeded",
                    "The maximum number of mutating objects has been reached.",
                )
            } else {
                MockResponse::ok("created")
            }
        }
    })
    .await;

    let client = client_for("ec2", addr, 3);
    let ec2 = client.service("ec2").unwrap();

    let response = ec2.get("CreateVpnGateway", "/").await.unwrap();
    assert_eq!(response.text().await.unwrap(), "created");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_service_rule_is_scoped_to_its_operation() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async {
            MockResponse::error(
                400,
                "VpnGatewayLimitExceeded",
                "The maximum number of mutating objects has been reached.",
            )
        }
    })
    .await;

    let client = client_for("ec2", addr, 3);
    let err = client
        .service("ec2")
        .unwrap()
        .get("DeleteVpnGateway", "/")
        .await
        .unwrap_err();

    assert_eq!(api_code(&err).as_deref(), Some("VpnGatewayLimitExceeded"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deadline_cuts_retries_short() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let addr = start_programmable_backend(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async { MockResponse::error(503, "ServiceUnavailable", "still down") }
    })
    .await;

    let client = client_for("sts", addr, 25);
    let deadline = Duration::from_millis(300);
    let err = client
        .service("sts")
        .unwrap()
        .get_with_deadline("GetCallerIdentity", "/", deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, RetryError::DeadlineExceeded(d) if d == deadline));
    let made = calls.load(Ordering::SeqCst);
    assert!(made >= 1 && made < 26, "{made} calls");
}

#[tokio::test]
async fn test_connection_refused_surfaces_http_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for("sts", addr, 1);
    let err = client
        .service("sts")
        .unwrap()
        .get("GetCallerIdentity", "/")
        .await
        .unwrap_err();

    assert!(matches!(err, ConnsError::Http(_)), "{err}");
}
