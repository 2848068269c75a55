//! Client builder with typestate pattern.

use std::{marker::PhantomData, sync::Arc, time::Duration};

use crate::{
    Client, Error,
    auth::{CredentialConfig, CredentialProvider, CredentialsProvider},
    config::{RateLimitPolicy, RetryConfig},
    ratelimit::RateLimiter,
    transport::RequestExecutor,
};

/// Marker type: Credentials not yet provided.
pub struct NoCredentials;

/// Marker type: Credentials have been provided.
pub struct HasCredentials;

enum CredentialSource {
    Config(CredentialConfig),
    Provider(Arc<dyn CredentialsProvider>),
}

/// Builder for creating [`Client`] instances.
///
/// Uses the typestate pattern to ensure credentials are provided at compile
/// time.
///
/// ## Optional Configuration
///
/// - `base_url()`: Defaults to `https://dev.azure.com/{organization}/_apis`
/// - `api_version()`: Defaults to [`DEFAULT_API_VERSION`](crate::transport::DEFAULT_API_VERSION)
/// - `timeout()`: Per-attempt timeout
/// - `retry_config()`: Retry behavior for transient failures
/// - `rate_limit_policy()` / `rate_limiter()`: Admission control
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::{Client, CredentialConfig, RetryConfig};
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .credentials(CredentialConfig::personal_access_token("contoso", "pat")?)
///     .retry_config(RetryConfig::new().with_max_retries(5))
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// assert_eq!(client.base_url(), "https://dev.azure.com/contoso/_apis/");
/// # Ok::<(), azure_devops_core::Error>(())
/// ```
pub struct ClientBuilder<CredentialsState> {
    credentials: Option<CredentialSource>,
    base_url: Option<String>,
    api_version: Option<String>,
    timeout: Option<Duration>,
    retry_config: RetryConfig,
    rate_limit_policy: Option<RateLimitPolicy>,
    rate_limiter: Option<Arc<RateLimiter>>,
    application: Option<String>,
    http_client: Option<reqwest::Client>,
    _credentials_state: PhantomData<CredentialsState>,
}

impl ClientBuilder<NoCredentials> {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            credentials: None,
            base_url: None,
            api_version: None,
            timeout: None,
            retry_config: RetryConfig::default(),
            rate_limit_policy: None,
            rate_limiter: None,
            application: None,
            http_client: None,
            _credentials_state: PhantomData,
        }
    }

    /// Sets the credential configuration.
    ///
    /// The organization it names also determines the default base URL.
    pub fn credentials(self, config: CredentialConfig) -> ClientBuilder<HasCredentials> {
        self.with_source(CredentialSource::Config(config))
    }

    /// Uses a custom credentials provider.
    ///
    /// A custom provider carries no organization, so
    /// [`base_url`](ClientBuilder::base_url) must be set as well.
    pub fn credentials_provider(
        self,
        provider: Arc<dyn CredentialsProvider>,
    ) -> ClientBuilder<HasCredentials> {
        self.with_source(CredentialSource::Provider(provider))
    }

    fn with_source(self, source: CredentialSource) -> ClientBuilder<HasCredentials> {
        ClientBuilder {
            credentials: Some(source),
            base_url: self.base_url,
            api_version: self.api_version,
            timeout: self.timeout,
            retry_config: self.retry_config,
            rate_limit_policy: self.rate_limit_policy,
            rate_limiter: self.rate_limiter,
            application: self.application,
            http_client: self.http_client,
            _credentials_state: PhantomData,
        }
    }
}

impl Default for ClientBuilder<NoCredentials> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClientBuilder<C> {
    /// Sets the base URL relative endpoints are resolved against.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default `api-version` query parameter.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the policy of the client's own rate limiter.
    ///
    /// Ignored when a shared limiter is passed to
    /// [`rate_limiter`](ClientBuilder::rate_limiter).
    #[must_use]
    pub fn rate_limit_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit_policy = Some(policy);
        self
    }

    /// Shares an existing rate limiter, and its budget, with this client.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Adds an application name to the `User-Agent` header.
    #[must_use]
    pub fn application(mut self, name: impl Into<String>) -> Self {
        self.application = Some(name.into());
        self
    }

    /// Uses a preconfigured HTTP client for API and token requests.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl<C> std::fmt::Debug for ClientBuilder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credentials = match &self.credentials {
            Some(CredentialSource::Config(config)) => Some(config.kind().to_string()),
            Some(CredentialSource::Provider(_)) => Some("custom".to_string()),
            None => None,
        };
        f.debug_struct("ClientBuilder")
            .field("credentials", &credentials)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("retry_config", &self.retry_config)
            .field("shared_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientBuilder<HasCredentials> {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if:
    /// - no base URL is set and the credentials name no organization
    /// - the base URL, timeout, API version or retry configuration is invalid
    /// - the rate-limit policy is invalid
    pub fn build(self) -> Result<Client, Error> {
        let (provider, organization): (Arc<dyn CredentialsProvider>, Option<String>) =
            match self.credentials {
                Some(CredentialSource::Config(config)) => {
                    let organization = config.organization().to_string();
                    let provider = match &self.http_client {
                        Some(http) => CredentialProvider::with_http_client(config, http.clone()),
                        None => CredentialProvider::new(config)?,
                    };
                    (Arc::new(provider), Some(organization))
                }
                Some(CredentialSource::Provider(provider)) => (provider, None),
                None => return Err(Error::configuration("credentials are required")),
            };

        let base_url = match (self.base_url, organization) {
            (Some(url), _) => url,
            (None, Some(org)) => default_base_url(&org),
            (None, None) => {
                return Err(Error::configuration(
                    "base_url is required with a custom credentials provider",
                ));
            }
        };

        let limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::new(self.rate_limit_policy.unwrap_or_default())?),
        };

        let executor = RequestExecutor::builder()
            .base_url(base_url)
            .credentials(provider)
            .rate_limiter(limiter)
            .maybe_api_version(self.api_version)
            .maybe_timeout(self.timeout)
            .retry(self.retry_config)
            .maybe_application(self.application)
            .maybe_http_client(self.http_client)
            .build()?;

        Ok(Client::from_executor(executor))
    }
}

/// The organization-scoped default API root.
pub(crate) fn default_base_url(organization: &str) -> String {
    format!("https://dev.azure.com/{}/_apis", organization.trim())
}
