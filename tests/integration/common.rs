//! Common test harness for azure-devops-core integration tests.
//!
//! Provides mock-server clients with short timeouts and retry delays.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use azure_devops_core::{
    Client, CredentialConfig, CredentialProvider, RateLimitPolicy, RateLimiter, RetryConfig,
};
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

/// Organization every mock client is scoped to.
pub const ORGANIZATION: &str = "contoso";

/// Per-attempt timeout of mock clients.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// Installs a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retries with delays short enough for real-time tests.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
}

/// A limiter that never makes a test wait.
pub fn roomy_limiter() -> Result<Arc<RateLimiter>> {
    let policy = RateLimitPolicy::builder()
        .rate_per_second(1000.0)
        .burst_capacity(1000)
        .build();
    Ok(Arc::new(RateLimiter::new(policy)?))
}

/// API root of the mock organization.
pub fn api_root(server: &MockServer) -> String {
    format!("{}/{}/_apis", server.uri(), ORGANIZATION)
}

/// A bearer-token client against `server`.
pub fn bearer_client(server: &MockServer, max_retries: u32) -> Result<Client> {
    bearer_client_at(&api_root(server), max_retries)
}

/// A bearer-token client against an arbitrary API root.
pub fn bearer_client_at(base_url: &str, max_retries: u32) -> Result<Client> {
    init_tracing();
    let client = Client::builder()
        .credentials(CredentialConfig::static_bearer(ORGANIZATION, "test-token")?)
        .base_url(base_url)
        .timeout(ATTEMPT_TIMEOUT)
        .retry_config(fast_retry(max_retries))
        .rate_limiter(roomy_limiter()?)
        .build()?;
    Ok(client)
}

/// OAuth client-credentials configuration whose token endpoint is `server`.
pub fn oauth_config(server: &MockServer) -> Result<CredentialConfig> {
    Ok(
        CredentialConfig::oauth_client_credentials(ORGANIZATION, "app-id", "app-secret", "tenant")?
            .with_authority_host(server.uri()),
    )
}

/// A client sharing `provider`, so tests can inspect its token cache.
pub fn provider_client(server: &MockServer, provider: Arc<CredentialProvider>) -> Result<Client> {
    init_tracing();
    let client = Client::builder()
        .credentials_provider(provider)
        .base_url(api_root(server))
        .timeout(ATTEMPT_TIMEOUT)
        .retry_config(fast_retry(3))
        .rate_limiter(roomy_limiter()?)
        .build()?;
    Ok(client)
}

/// Number of requests `server` received on `path`.
pub async fn hits(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == path)
        .count()
}

/// A token endpoint response.
pub fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "access_token": token,
        "expires_in": expires_in,
    })
}
