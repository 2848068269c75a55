//! Declarative client settings, from serde sources or `AZDO_*` variables.

use std::{str::FromStr, time::Duration};

use serde::Deserialize;

use super::{RateLimitPolicy, RetryConfig};
use crate::{
    Client, Error,
    auth::{CredentialConfig, CredentialFields, CredentialKind},
    client::{ClientBuilder, HasCredentials},
};

/// Prefix of every environment variable read by [`ClientSettings::from_env`].
pub const ENV_PREFIX: &str = "AZDO_";

/// Unvalidated client settings.
///
/// Credential fields sit at the top level next to the client knobs, so a
/// settings file reads:
///
/// ```toml
/// kind = "service_principal"
/// organization = "contoso"
/// client_id = "app-id"
/// client_secret = "..."
/// tenant_id = "tenant-id"
/// timeout_secs = 20
/// requests_per_second = 5.0
/// ```
///
/// Every field left out keeps the library default.
/// [`into_builder`](ClientSettings::into_builder) validates the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Credential kind and fields.
    #[serde(flatten)]
    pub credentials: CredentialFields,
    /// Token authority override.
    pub authority_host: Option<String>,
    /// Instance-metadata endpoint override.
    pub metadata_endpoint: Option<String>,
    /// API root; defaults to the organization's `dev.azure.com` root.
    pub base_url: Option<String>,
    /// Default `api-version`.
    pub api_version: Option<String>,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Initial retry delay in seconds.
    pub retry_delay_secs: Option<f64>,
    /// Growth factor of the retry delay.
    pub backoff_multiplier: Option<f64>,
    /// Sustained request rate.
    pub requests_per_second: Option<f64>,
    /// Token bucket capacity.
    pub burst_capacity: Option<u32>,
}

impl ClientSettings {
    /// Reads settings from `AZDO_*` environment variables.
    ///
    /// | Variable                    | Field                 |
    /// |-----------------------------|-----------------------|
    /// | `AZDO_AUTH_KIND`            | credential kind       |
    /// | `AZDO_ORGANIZATION`         | organization          |
    /// | `AZDO_TOKEN`                | token                 |
    /// | `AZDO_CLIENT_ID`            | client_id             |
    /// | `AZDO_CLIENT_SECRET`        | client_secret         |
    /// | `AZDO_TENANT_ID`            | tenant_id             |
    /// | `AZDO_SCOPE`                | scope                 |
    /// | `AZDO_AUTHORITY_HOST`       | authority_host        |
    /// | `AZDO_METADATA_ENDPOINT`    | metadata_endpoint     |
    /// | `AZDO_BASE_URL`             | base_url              |
    /// | `AZDO_API_VERSION`          | api_version           |
    /// | `AZDO_TIMEOUT_SECS`         | timeout_secs          |
    /// | `AZDO_MAX_RETRIES`          | max_retries           |
    /// | `AZDO_RETRY_DELAY_SECS`     | retry_delay_secs      |
    /// | `AZDO_BACKOFF_MULTIPLIER`   | backoff_multiplier    |
    /// | `AZDO_REQUESTS_PER_SECOND`  | requests_per_second   |
    /// | `AZDO_BURST_CAPACITY`       | burst_capacity        |
    ///
    /// Empty variables count as unset.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the variable that fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a full variable name
    /// (`AZDO_TOKEN`) to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        Ok(Self {
            credentials: CredentialFields {
                kind: env.parse::<CredentialKind>("AUTH_KIND")?,
                organization: env.string("ORGANIZATION").unwrap_or_default(),
                token: env.string("TOKEN"),
                client_id: env.string("CLIENT_ID"),
                client_secret: env.string("CLIENT_SECRET"),
                tenant_id: env.string("TENANT_ID"),
                scope: env.string("SCOPE"),
            },
            authority_host: env.string("AUTHORITY_HOST"),
            metadata_endpoint: env.string("METADATA_ENDPOINT"),
            base_url: env.string("BASE_URL"),
            api_version: env.string("API_VERSION"),
            timeout_secs: env.parse("TIMEOUT_SECS")?,
            max_retries: env.parse("MAX_RETRIES")?,
            retry_delay_secs: env.parse("RETRY_DELAY_SECS")?,
            backoff_multiplier: env.parse("BACKOFF_MULTIPLIER")?,
            requests_per_second: env.parse("REQUESTS_PER_SECOND")?,
            burst_capacity: env.parse("BURST_CAPACITY")?,
        })
    }

    /// Validates the settings into credential configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for a missing kind, organization or
    /// field the kind requires.
    pub fn credential_config(&self) -> Result<CredentialConfig, Error> {
        let mut config = CredentialConfig::try_from(self.credentials.clone())?;
        if let Some(host) = &self.authority_host {
            config = config.with_authority_host(host.clone());
        }
        if let Some(endpoint) = &self.metadata_endpoint {
            config = config.with_metadata_endpoint(endpoint.clone());
        }
        Ok(config)
    }

    /// Retry configuration with the configured overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for a negative or non-finite delay and
    /// for combinations [`RetryConfig::validate`] rejects.
    pub fn retry_config(&self) -> Result<RetryConfig, Error> {
        let mut retry = RetryConfig::default();
        if let Some(max_retries) = self.max_retries {
            retry = retry.with_max_retries(max_retries);
        }
        if let Some(secs) = self.retry_delay_secs {
            let delay = seconds("retry_delay_secs", secs)?;
            retry = retry.with_initial_delay(delay);
            if delay > retry.max_delay {
                retry = retry.with_max_delay(delay);
            }
        }
        if let Some(multiplier) = self.backoff_multiplier {
            retry = retry.with_multiplier(multiplier);
        }
        retry.validate()?;
        Ok(retry)
    }

    /// Rate-limit policy with the configured overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for combinations
    /// [`RateLimitPolicy::validate`] rejects.
    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy, Error> {
        let policy = RateLimitPolicy::builder()
            .maybe_rate_per_second(self.requests_per_second)
            .maybe_burst_capacity(self.burst_capacity)
            .build();
        policy.validate()?;
        Ok(policy)
    }

    /// Validates the settings and returns a builder ready to
    /// [`build`](ClientBuilder::build).
    ///
    /// # Errors
    ///
    /// Returns the first `Configuration` error found in the credentials,
    /// timeout, retry or rate-limit settings.
    pub fn into_builder(self) -> Result<ClientBuilder<HasCredentials>, Error> {
        let mut builder = Client::builder()
            .credentials(self.credential_config()?)
            .retry_config(self.retry_config()?)
            .rate_limit_policy(self.rate_limit_policy()?);

        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(seconds("timeout_secs", secs)?);
        }
        if let Some(url) = self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(version) = self.api_version {
            builder = builder.api_version(version);
        }
        Ok(builder)
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, suffix))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, suffix: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(suffix)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    Error::configuration(format!(
                        "invalid {}{} '{}': {}",
                        ENV_PREFIX, suffix, raw, e
                    ))
                })
            })
            .transpose()
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::configuration(format!("invalid {} {}: {}", field, secs, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ErrorKind;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_prefixed_variables() {
        let settings = ClientSettings::from_lookup(lookup(&[
            ("AZDO_AUTH_KIND", "pat"),
            ("AZDO_ORGANIZATION", "contoso"),
            ("AZDO_TOKEN", "secret"),
            ("AZDO_TIMEOUT_SECS", "12.5"),
            ("AZDO_MAX_RETRIES", "1"),
            ("AZDO_API_VERSION", " "),
        ]))
        .unwrap();

        assert_eq!(settings.credentials.kind, Some(CredentialKind::PersonalAccessToken));
        assert_eq!(settings.credentials.organization, "contoso");
        assert_eq!(settings.timeout_secs, Some(12.5));
        assert_eq!(settings.max_retries, Some(1));
        assert_eq!(settings.api_version, None);
    }

    #[test]
    fn test_from_lookup_names_bad_variable() {
        let err = ClientSettings::from_lookup(lookup(&[("AZDO_BURST_CAPACITY", "lots")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("AZDO_BURST_CAPACITY"));
    }

    #[test]
    fn test_deserialize_flat_record() {
        let settings: ClientSettings = serde_json::from_value(serde_json::json!({
            "kind": "service_principal",
            "organization": "contoso",
            "client_id": "app",
            "client_secret": "shh",
            "tenant_id": "tenant",
            "requests_per_second": 5.0,
            "burst_capacity": 20
        }))
        .unwrap();

        let config = settings.credential_config().unwrap();
        assert_eq!(config.kind(), CredentialKind::ServicePrincipal);

        let policy = settings.rate_limit_policy().unwrap();
        assert_eq!(policy.rate_per_second(), 5.0);
        assert_eq!(policy.burst_capacity(), 20);
    }

    #[test]
    fn test_into_builder_builds_client() {
        let settings = ClientSettings::from_lookup(lookup(&[
            ("AZDO_AUTH_KIND", "static_bearer"),
            ("AZDO_ORGANIZATION", "fabrikam"),
            ("AZDO_TOKEN", "tok"),
            ("AZDO_TIMEOUT_SECS", "5"),
            ("AZDO_RETRY_DELAY_SECS", "0.25"),
        ]))
        .unwrap();

        let client = settings.into_builder().unwrap().build().unwrap();
        let stats = client.stats();
        assert_eq!(stats.base_url, "https://dev.azure.com/fabrikam/_apis/");
        assert_eq!(stats.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_kind_is_configuration_error() {
        let err = ClientSettings::default().into_builder().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let settings = ClientSettings {
            credentials: CredentialFields {
                kind: Some(CredentialKind::StaticBearer),
                organization: "o".into(),
                token: Some("t".into()),
                ..Default::default()
            },
            timeout_secs: Some(-1.0),
            ..Default::default()
        };
        let err = settings.into_builder().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_retry_overrides() {
        let settings = ClientSettings {
            max_retries: Some(6),
            retry_delay_secs: Some(120.0),
            backoff_multiplier: Some(3.0),
            ..Default::default()
        };
        let retry = settings.retry_config().unwrap();
        assert_eq!(retry.max_retries, 6);
        assert_eq!(retry.initial_delay, Duration::from_secs(120));
        assert!(retry.max_delay >= retry.initial_delay);
        assert_eq!(retry.multiplier, 3.0);
    }
}
