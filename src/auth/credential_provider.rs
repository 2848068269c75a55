//! Built-in credentials provider with a single-flight token cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use tokio::sync::Mutex;

use super::credentials::{CredentialConfig, CredentialKind};
use super::provider::{AuthHeaders, CredentialsFuture, CredentialsProvider};
use super::token::{self, CachedToken};
use crate::Error;

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces `Authorization` headers for every [`CredentialKind`].
///
/// Static bearer and personal access token headers are derived from the
/// configuration on each call without network access. The token-endpoint kinds
/// acquire a bearer token on first use and cache it until its refresh deadline.
///
/// The cache is guarded by an async mutex held across the whole
/// check-then-refresh sequence, so concurrent callers that find the cache
/// stale wait for one acquisition and share its result. Invalidation only
/// raises a flag, so it never waits on or loses a race with that lock.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::{CredentialConfig, CredentialProvider};
///
/// # async fn example() -> Result<(), azure_devops_core::Error> {
/// let provider = CredentialProvider::new(CredentialConfig::static_bearer("contoso", "tok")?)?;
/// let headers = provider.auth_headers().await?;
/// assert_eq!(headers["Authorization"], "Bearer tok");
/// # Ok(())
/// # }
/// ```
pub struct CredentialProvider {
    config: CredentialConfig,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
    invalidated: AtomicBool,
    acquisitions: AtomicU64,
}

impl CredentialProvider {
    /// Creates a provider with its own HTTP client for token requests.
    pub fn new(config: CredentialConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::configuration(format!("failed to build token HTTP client: {}", e))
                    .with_source(e)
            })?;
        Ok(Self::with_http_client(config, http))
    }

    /// Creates a provider that issues token requests through `http`.
    pub fn with_http_client(config: CredentialConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            cache: Mutex::new(None),
            invalidated: AtomicBool::new(false),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Returns the credential configuration.
    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Number of token acquisitions performed so far.
    pub fn acquisition_count(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Returns the cached token if one is held and still fresh.
    pub async fn cached_token(&self) -> Option<CachedToken> {
        let mut guard = self.cache.lock().await;
        self.discard_if_invalidated(&mut guard);
        guard.as_ref().filter(|t| !t.is_expired()).cloned()
    }

    /// Returns the headers authenticating one request.
    ///
    /// # Errors
    ///
    /// Returns an `Authentication` error wrapping the cause if a token
    /// acquisition fails. Nothing is cached on failure.
    pub async fn auth_headers(&self) -> Result<AuthHeaders, Error> {
        let value = match self.config.kind() {
            CredentialKind::StaticBearer => format!("Bearer {}", self.static_token()?),
            CredentialKind::PersonalAccessToken => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!(":{}", self.static_token()?));
                format!("Basic {}", encoded)
            }
            CredentialKind::OAuthClientCredentials
            | CredentialKind::ManagedIdentity
            | CredentialKind::ServicePrincipal => format!("Bearer {}", self.bearer_token().await?),
        };

        let mut headers = AuthHeaders::new();
        headers.insert("Authorization".to_string(), value);
        Ok(headers)
    }

    /// Marks the cached token as rejected. The next bearer call acquires a
    /// new one.
    ///
    /// A refresh already in flight keeps its result.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    fn discard_if_invalidated(&self, cache: &mut Option<CachedToken>) {
        if self.invalidated.swap(false, Ordering::AcqRel) && cache.take().is_some() {
            tracing::debug!(kind = %self.config.kind(), "cached token invalidated");
        }
    }

    fn static_token(&self) -> Result<&str, Error> {
        self.config.token().ok_or_else(|| {
            Error::authentication(format!("{} credentials carry no token", self.config.kind()))
        })
    }

    async fn bearer_token(&self) -> Result<String, Error> {
        let mut guard = self.cache.lock().await;
        self.discard_if_invalidated(&mut guard);
        if let Some(cached) = guard.as_ref().filter(|t| !t.is_expired()) {
            return Ok(cached.value().to_string());
        }

        let response = match self.config.kind() {
            CredentialKind::ManagedIdentity => {
                token::managed_identity(&self.http, &self.config).await
            }
            _ => token::client_credentials(&self.http, &self.config).await,
        }
        .inspect_err(|e| {
            tracing::warn!(kind = %self.config.kind(), error = %e, "token acquisition failed");
        })?;

        let fresh = response.into_cached();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            kind = %self.config.kind(),
            refresh_at = %fresh.expires_on(),
            "acquired bearer token"
        );

        let value = fresh.value().to_string();
        // Invalidations raised during this acquisition target an older token.
        self.invalidated.store(false, Ordering::Release);
        *guard = Some(fresh);
        Ok(value)
    }
}

impl CredentialsProvider for CredentialProvider {
    fn auth_headers(&self) -> CredentialsFuture<'_> {
        Box::pin(CredentialProvider::auth_headers(self))
    }

    fn invalidate(&self) {
        CredentialProvider::invalidate(self)
    }
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("config", &self.config)
            .field("acquisitions", &self.acquisition_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_bearer_header() {
        let config = CredentialConfig::static_bearer("org", "abc").unwrap();
        let provider = CredentialProvider::new(config).unwrap();
        let first = provider.auth_headers().await.unwrap();
        let second = provider.auth_headers().await.unwrap();
        assert_eq!(first["Authorization"], "Bearer abc");
        assert_eq!(first, second);
        assert_eq!(provider.acquisition_count(), 0);
        assert!(provider.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_personal_access_token_header() {
        let provider = CredentialProvider::new(
            CredentialConfig::personal_access_token("org", "pat").unwrap(),
        )
        .unwrap();
        let headers = provider.auth_headers().await.unwrap();
        // base64(":pat")
        assert_eq!(headers["Authorization"], "Basic OnBhdA==");
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_authentication_error() {
        let config = CredentialConfig::service_principal("org", "app", "secret", "tenant")
            .unwrap()
            .with_authority_host("http://127.0.0.1:1");
        let provider = CredentialProvider::new(config).unwrap();

        let err = provider.auth_headers().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authentication);
        assert!(std::error::Error::source(&err).is_some());
        assert!(provider.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_while_cache_is_held() {
        let config = CredentialConfig::service_principal("org", "app", "secret", "tenant")
            .unwrap()
            .with_authority_host("http://127.0.0.1:1");
        let provider = CredentialProvider::new(config).unwrap();
        *provider.cache.lock().await = Some(CachedToken::new("stale", Duration::from_secs(3600)));

        let reader = provider.cache.lock().await;
        provider.invalidate();
        drop(reader);

        assert!(provider.cached_token().await.is_none());
        assert_eq!(provider.acquisition_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidated_token_is_not_served() {
        let config = CredentialConfig::service_principal("org", "app", "secret", "tenant")
            .unwrap()
            .with_authority_host("http://127.0.0.1:1");
        let provider = CredentialProvider::new(config).unwrap();
        *provider.cache.lock().await = Some(CachedToken::new("stale", Duration::from_secs(3600)));

        let headers = provider.auth_headers().await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer stale");

        provider.invalidate();
        let err = provider.auth_headers().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authentication);
    }
}
