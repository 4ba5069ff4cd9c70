//! The configured client aggregate and per-service handles.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::conns::endpoints::{self, EndpointResolver, Partition, ResolvedEndpoint, SERVICES};
use crate::conns::{account, ConnsError};
use crate::net::{configure_mtls, HttpClient, StandardHttpClient, TlsMaterial};
use crate::resilience::predicates::{rules_predicate, service_retry_rules};
use crate::resilience::{
    add_with_error_predicate, retry, retry_with_deadline, ApiError, JitterBackoff, RetryError,
    Retryer, SharedRand, StandardRetryer,
};
use crate::sync::{LazyClient, MutexKV};

/// A handle for one service: where to send requests, over which HTTP client,
/// and how to retry them.
#[derive(Clone)]
pub struct ServiceClient {
    service: &'static str,
    endpoint: ResolvedEndpoint,
    http: reqwest::Client,
    retryer: Arc<dyn Retryer>,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("max_attempts", &self.retryer.max_attempts())
            .finish()
    }
}

impl ServiceClient {
    pub fn new(
        service: &'static str,
        endpoint: ResolvedEndpoint,
        http: reqwest::Client,
        retryer: Arc<dyn Retryer>,
    ) -> Self {
        Self {
            service,
            endpoint,
            http,
            retryer,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn retryer(&self) -> &Arc<dyn Retryer> {
        &self.retryer
    }

    /// Run `op` under this service's retry policy.
    pub async fn call<F, Fut, T, E>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        retry(&*self.retryer, operation, op).await
    }

    /// Like [`call`](Self::call), bounded by an overall deadline.
    pub async fn call_with_deadline<F, Fut, T, E>(
        &self,
        operation: &str,
        deadline: Duration,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        retry_with_deadline(&*self.retryer, operation, deadline, op).await
    }

    /// GET `path` relative to the service endpoint, retrying failures the
    /// policy allows. Non-success statuses become [`ApiError`]s.
    pub async fn get(&self, operation: &str, path: &str) -> Result<reqwest::Response, ConnsError> {
        let url = self.url_for(path)?;
        self.call(operation, || self.get_once(operation, &url)).await
    }

    /// [`get`](Self::get) bounded by an overall deadline.
    pub async fn get_with_deadline(
        &self,
        operation: &str,
        path: &str,
        deadline: Duration,
    ) -> Result<reqwest::Response, RetryError<ConnsError>> {
        let url = self.url_for(path).map_err(RetryError::Operation)?;
        self.call_with_deadline(operation, deadline, || self.get_once(operation, &url))
            .await
    }

    fn url_for(&self, path: &str) -> Result<url::Url, ConnsError> {
        url::Url::parse(&self.endpoint.url)
            .and_then(|base| base.join(path))
            .map_err(|source| ConnsError::InvalidEndpoint {
                url: self.endpoint.url.clone(),
                source,
            })
    }

    async fn get_once(&self, operation: &str, url: &url::Url) -> Result<reqwest::Response, ConnsError> {
        let response = self.http.get(url.clone()).send().await?;
        error_for_status(self.service, operation, response).await
    }
}

async fn error_for_status(
    service: &str,
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ConnsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = response
        .headers()
        .get("x-amzn-ErrorType")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(':').next())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| status_error_code(status.as_u16()).to_string());
    let message = response.text().await.unwrap_or_default();

    Err(ApiError::new(code, message.trim())
        .with_operation(service, operation)
        .with_status(status.as_u16())
        .into())
}

fn status_error_code(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        403 => "AccessDenied",
        404 => "NotFound",
        429 => "Throttling",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ => "UnknownError",
    }
}

/// Everything a configured provider needs to talk to AWS.
pub struct AwsClient {
    account_id: Option<String>,
    resolver: EndpointResolver,
    http: reqwest::Client,
    tls: TlsMaterial,
    mutex_kv: Arc<MutexKV>,
    services: BTreeMap<&'static str, LazyClient<ServiceClient>>,
}

impl fmt::Debug for AwsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClient")
            .field("account_id", &self.account_id)
            .field("region", &self.resolver.region())
            .field("partition", &self.resolver.partition().id)
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}

impl AwsClient {
    /// Build from configuration with the default HTTP client.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConnsError> {
        let transport = config.http.transport(config.insecure);
        Self::with_http_client(config, HttpClient::Standard(StandardHttpClient::new(transport)))
    }

    /// Build from configuration over a caller-supplied HTTP client shape.
    pub fn with_http_client(config: &ProviderConfig, mut http: HttpClient) -> Result<Self, ConnsError> {
        let region = config
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(ConnsError::MissingRegion)?;
        if !config.skip_region_validation {
            endpoints::validate_region(region)?;
        }

        if config.account_id.is_none() {
            tracing::warn!("AWS account ID not found for provider");
        }
        account::validate_account_id(
            config.account_id.as_deref().unwrap_or(""),
            &config.allowed_account_ids,
            &config.forbidden_account_ids,
        )?;

        let tls = configure_mtls(&config.tls, &mut http)?;
        let client = http.build()?;

        let mutex_kv = Arc::new(MutexKV::new());
        let rand = Arc::new(SharedRand::new(Arc::clone(&mutex_kv)));
        let backoff = JitterBackoff::with_rand(config.retries.max_retry_delay(), rand);
        let base: Arc<dyn Retryer> =
            Arc::new(StandardRetryer::new(config.retries.max_attempts(), backoff));

        let resolver = EndpointResolver::new(region, &config.endpoints);
        let services = SERVICES
            .iter()
            .map(|&service| {
                let endpoint = resolver.resolve(service);
                let http = client.clone();
                let retryer = service_retryer(service, Arc::clone(&base));
                let slot = LazyClient::new(service, move || {
                    ServiceClient::new(service, endpoint.clone(), http.clone(), Arc::clone(&retryer))
                });
                (service, slot)
            })
            .collect();

        tracing::info!(
            region,
            partition = resolver.partition().id,
            max_attempts = config.retries.max_attempts(),
            mtls = config.tls.client_certificate.is_some(),
            "AWS client configured"
        );

        Ok(Self {
            account_id: config.account_id.clone(),
            resolver,
            http: client,
            tls,
            mutex_kv,
            services,
        })
    }

    /// The client for `service`, built on first access.
    pub fn service(&self, service: &str) -> Result<&ServiceClient, ConnsError> {
        self.services
            .get(service)
            .map(LazyClient::client)
            .ok_or_else(|| ConnsError::UnknownService(service.to_string()))
    }

    /// Whether `service`'s client has been built yet.
    pub fn is_initialized(&self, service: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(LazyClient::is_initialized)
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn region(&self) -> &str {
        self.resolver.region()
    }

    pub fn partition(&self) -> &'static Partition {
        self.resolver.partition()
    }

    pub fn dns_suffix(&self) -> &'static str {
        self.resolver.partition().dns_suffix
    }

    /// Shared HTTP client every service client uses.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Client identity and trust roots installed into the HTTP client.
    pub fn tls(&self) -> &TlsMaterial {
        &self.tls
    }

    /// Named locks shared across this provider's resources.
    pub fn mutex_kv(&self) -> &Arc<MutexKV> {
        &self.mutex_kv
    }

    pub fn endpoints(&self) -> Vec<ResolvedEndpoint> {
        self.resolver.resolve_all()
    }
}

impl ProviderConfig {
    /// Validate and build the connection aggregate.
    pub fn client(&self) -> Result<AwsClient, ConnsError> {
        AwsClient::from_config(self)
    }
}

/// The base retryer, with the service's extra retry rules layered on.
fn service_retryer(service: &str, base: Arc<dyn Retryer>) -> Arc<dyn Retryer> {
    let rules = service_retry_rules(service);
    if rules.is_empty() {
        return base;
    }
    Arc::new(add_with_error_predicate(base, rules_predicate(rules)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            region: Some("us-west-2".into()),
            account_id: Some("123456789012".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_service_clients_are_lazy() {
        let client = config().client().unwrap();
        assert!(!client.is_initialized("ec2"));

        let ec2 = client.service("ec2").unwrap();
        assert_eq!(ec2.endpoint().url, "https://ec2.us-west-2.amazonaws.com");
        assert!(client.is_initialized("ec2"));
        assert!(!client.is_initialized("s3"));

        let again = client.service("ec2").unwrap();
        assert!(std::ptr::eq(ec2, again));
    }

    #[test]
    fn test_unknown_service() {
        let client = config().client().unwrap();
        assert!(matches!(
            client.service("nosuchservice"),
            Err(ConnsError::UnknownService(_))
        ));
    }

    #[test]
    fn test_region_and_account_checks() {
        let mut bad_region = config();
        bad_region.region = Some("us-nowhere-1".into());
        assert!(matches!(bad_region.client(), Err(ConnsError::InvalidRegion(_))));

        bad_region.skip_region_validation = true;
        assert!(bad_region.client().is_ok());

        let mut missing = config();
        missing.region = None;
        assert!(matches!(missing.client(), Err(ConnsError::MissingRegion)));

        let mut forbidden = config();
        forbidden.forbidden_account_ids = vec!["123456789012".into()];
        assert!(matches!(forbidden.client(), Err(ConnsError::ForbiddenAccount(_))));

        let mut unlisted = config();
        unlisted.account_id = None;
        unlisted.allowed_account_ids = vec!["123456789012".into()];
        assert!(matches!(unlisted.client(), Err(ConnsError::AccountNotAllowed(_))));
    }

    #[test]
    fn test_partition_details() {
        let mut cfg = config();
        cfg.region = Some("cn-northwest-1".into());
        let client = cfg.client().unwrap();
        assert_eq!(client.partition().id, "aws-cn");
        assert_eq!(client.dns_suffix(), "amazonaws.com.cn");
        assert_eq!(client.account_id(), Some("123456789012"));
    }

    #[test]
    fn test_service_rules_layered_on_retryer() {
        let client = config().client().unwrap();
        let err = ApiError::new(
            "VpnGatewayLimitExceeded",
            "The maximum number of mutating objects has been reached.",
        )
        .with_operation("ec2", "CreateVpnGateway");

        let ec2 = client.service("ec2").unwrap();
        assert!(ec2.retryer().is_error_retryable(Some(&err)));
        assert_eq!(ec2.retryer().max_attempts(), 26);

        let s3 = client.service("s3").unwrap();
        assert!(!s3.retryer().is_error_retryable(Some(&err)));
    }

    #[test]
    fn test_installed_tls_material_exposed() {
        let plain = config().client().unwrap();
        assert!(plain.tls().identity.is_none());
        assert!(plain.tls().roots.is_none());

        let mut cfg = config();
        let fixtures = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        cfg.tls.client_certificate = Some(fixtures.join("client.pem"));
        cfg.tls.client_private_key = Some(fixtures.join("client-pkcs5-aes.key"));
        cfg.tls.client_private_key_passphrase = Some("correct-horse".into());
        cfg.tls.custom_ca_bundle = Some(fixtures.join("ca.pem"));

        let client = cfg.client().unwrap();
        assert!(client.tls().identity.is_some());
        assert_eq!(client.tls().roots.as_ref().map(|roots| roots.len()), Some(1));
    }

    #[test]
    fn test_prebuilt_http_client_rejected_with_mtls() {
        let mut cfg = config();
        let fixtures = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        cfg.tls.client_certificate = Some(fixtures.join("client.pem"));
        cfg.tls.client_private_key = Some(fixtures.join("client.key"));

        let err = AwsClient::with_http_client(&cfg, HttpClient::Prebuilt(reqwest::Client::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConnsError::Tls(crate::net::TlsError::UnsupportedHttpClient)
        ));
    }
}
