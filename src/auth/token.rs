//! Bearer token acquisition and caching primitives.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tokio::time::Instant;
use zeroize::Zeroizing;

use super::credentials::CredentialConfig;
use crate::Error;

/// Default OAuth scope for the DevOps resource.
pub const DEFAULT_SCOPE: &str = "https://app.vssps.visualstudio.com/.default";

/// Resource identifier sent to the instance-metadata endpoint.
pub const DEFAULT_RESOURCE: &str = "499b84ac-1321-427f-aa17-267ca6975798";

/// Identity authority for client-credentials grants.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Instance-metadata token endpoint.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// API version of the instance-metadata token endpoint.
pub const METADATA_API_VERSION: &str = "2018-02-01";

/// Tokens are treated as expired this long before the server-reported deadline.
pub const TOKEN_SAFETY_BUFFER: Duration = Duration::from_secs(300);

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// A bearer token together with its refresh deadline.
///
/// `expires_at` already has [`TOKEN_SAFETY_BUFFER`] subtracted.
#[derive(Clone)]
pub struct CachedToken {
    value: Zeroizing<String>,
    expires_at: Instant,
    expires_on: DateTime<Utc>,
}

impl CachedToken {
    /// Builds a cache entry from a raw token and the server-reported lifetime.
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        let usable = expires_in.saturating_sub(TOKEN_SAFETY_BUFFER);
        let expires_on = chrono::Duration::from_std(usable)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);
        Self {
            value: Zeroizing::new(value.into()),
            expires_at: Instant::now() + usable,
            expires_on,
        }
    }

    /// Returns the token value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns `true` once the refresh deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Wall-clock refresh deadline, for diagnostics.
    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Successful token endpoint response.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    pub fn into_cached(self) -> CachedToken {
        let lifetime = Duration::from_secs(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        CachedToken::new(self.access_token, lifetime)
    }
}

/// The metadata endpoint reports `expires_in` as a string, the identity
/// platform as a number.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Client-credentials grant against the tenant's token endpoint.
pub(crate) async fn client_credentials(
    http: &reqwest::Client,
    config: &CredentialConfig,
) -> Result<TokenResponse, Error> {
    let (Some(secret), Some(endpoint)) = (config.secret(), config.token_endpoint()) else {
        return Err(Error::authentication(format!(
            "{} credentials are missing client secret material",
            config.kind()
        )));
    };

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .append_pair("client_id", &secret.client_id)
        .append_pair("client_secret", &secret.client_secret)
        .append_pair("scope", config.scope())
        .finish();

    let response = http
        .post(&endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(reqwest::header::ACCEPT, "application/json")
        .body(form)
        .send()
        .await
        .map_err(|e| acquisition_failed(config, e))?;

    decode(config, response).await
}

/// Token request to the instance-metadata endpoint.
pub(crate) async fn managed_identity(
    http: &reqwest::Client,
    config: &CredentialConfig,
) -> Result<TokenResponse, Error> {
    let mut url = url::Url::parse(config.metadata_endpoint())?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("api-version", METADATA_API_VERSION)
            .append_pair("resource", config.resource());
        if let Some(client_id) = config.client_id() {
            query.append_pair("client_id", client_id);
        }
    }

    let response = http
        .get(url)
        .header("Metadata", "true")
        .send()
        .await
        .map_err(|e| acquisition_failed(config, e))?;

    decode(config, response).await
}

async fn decode(
    config: &CredentialConfig,
    response: reqwest::Response,
) -> Result<TokenResponse, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(|d| d.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(Error::authentication(format!(
            "failed to acquire {} token: {}",
            config.kind(),
            detail
        ))
        .with_status(status.as_u16()));
    }

    response.json::<TokenResponse>().await.map_err(|e| {
        Error::authentication(format!(
            "failed to decode {} token response: {}",
            config.kind(),
            e
        ))
        .with_source(e)
    })
}

fn acquisition_failed(config: &CredentialConfig, err: reqwest::Error) -> Error {
    Error::authentication(format!("failed to acquire {} token: {}", config.kind(), err))
        .with_source(err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_in_accepts_number_and_string() {
        let n: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#).unwrap();
        assert_eq!(n.expires_in, Some(3599));

        let s: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"86399"}"#).unwrap();
        assert_eq!(s.expires_in, Some(86399));

        let missing: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(missing.expires_in, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_expires_before_server_deadline() {
        let token = CachedToken::new("t", Duration::from_secs(600));
        assert!(!token.is_expired());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!token.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(token.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_token_is_immediately_stale() {
        let token = CachedToken::new("t", Duration::from_secs(120));
        assert!(token.is_expired());
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = CachedToken::new("super-secret", Duration::from_secs(3600));
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
