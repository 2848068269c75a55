//! Credential configuration and validation.

use std::{fmt, str::FromStr};

use serde::Deserialize;
use zeroize::Zeroizing;

use super::token::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_METADATA_ENDPOINT, DEFAULT_RESOURCE, DEFAULT_SCOPE,
};
use crate::Error;

/// The supported ways of authenticating against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// A pre-issued bearer token sent as `Authorization: Bearer <token>`.
    StaticBearer,

    /// A personal access token sent as HTTP Basic with an empty user name.
    PersonalAccessToken,

    /// OAuth 2.0 client-credentials grant against the tenant's token endpoint.
    #[serde(alias = "oauth")]
    OAuthClientCredentials,

    /// Token issued by the instance-metadata endpoint of the hosting VM.
    ManagedIdentity,

    /// Service principal client-credentials grant with the default API scope.
    ServicePrincipal,
}

impl CredentialKind {
    /// Returns `true` if this kind acquires expiring tokens over the network.
    pub fn uses_token_endpoint(&self) -> bool {
        matches!(
            self,
            CredentialKind::OAuthClientCredentials
                | CredentialKind::ManagedIdentity
                | CredentialKind::ServicePrincipal
        )
    }

    /// Stable label used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::StaticBearer => "static_bearer",
            CredentialKind::PersonalAccessToken => "personal_access_token",
            CredentialKind::OAuthClientCredentials => "oauth_client_credentials",
            CredentialKind::ManagedIdentity => "managed_identity",
            CredentialKind::ServicePrincipal => "service_principal",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = Error;

    /// Parses a label as produced by [`CredentialKind::as_str`], ignoring case.
    /// `oauth` and `pat` are accepted as short forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static_bearer" | "bearer" => Ok(CredentialKind::StaticBearer),
            "personal_access_token" | "pat" => Ok(CredentialKind::PersonalAccessToken),
            "oauth_client_credentials" | "oauth" => Ok(CredentialKind::OAuthClientCredentials),
            "managed_identity" => Ok(CredentialKind::ManagedIdentity),
            "service_principal" => Ok(CredentialKind::ServicePrincipal),
            other => Err(Error::configuration(format!(
                "unknown credential kind '{}'",
                other
            ))),
        }
    }
}

/// Unvalidated credential fields, as read from settings or the environment.
///
/// Convert with [`CredentialConfig::try_from`] to validate the combination.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialFields {
    /// Which credential kind the fields describe.
    pub kind: Option<CredentialKind>,
    /// Organization name, e.g. `contoso` for `dev.azure.com/contoso`.
    #[serde(default)]
    pub organization: String,
    /// Bearer token or personal access token.
    #[serde(default)]
    pub token: Option<String>,
    /// Application (client) id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Directory (tenant) id.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// OAuth scope override for [`CredentialKind::OAuthClientCredentials`].
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for CredentialFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFields")
            .field("kind", &self.kind)
            .field("organization", &self.organization)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("tenant_id", &self.tenant_id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Material for the token-endpoint kinds.
#[derive(Clone)]
pub(crate) struct ClientSecretMaterial {
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub tenant_id: String,
}

/// Validated, immutable credential configuration.
///
/// Construction enforces the field set each kind requires:
///
/// | Kind                       | Required                              |
/// |----------------------------|---------------------------------------|
/// | `StaticBearer`             | `token`                               |
/// | `PersonalAccessToken`      | `token`                               |
/// | `OAuthClientCredentials`   | `client_id`, `client_secret`, `tenant_id` |
/// | `ManagedIdentity`          | `client_id`, `client_secret`, `tenant_id` |
/// | `ServicePrincipal`         | `client_id`, `client_secret`, `tenant_id` |
///
/// Every kind also needs a non-empty organization.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::{CredentialConfig, CredentialKind};
///
/// let config = CredentialConfig::personal_access_token("contoso", "pat-value")?;
/// assert_eq!(config.kind(), CredentialKind::PersonalAccessToken);
///
/// let err = CredentialConfig::service_principal("contoso", "app-id", "", "tenant");
/// assert!(err.is_err());
/// # Ok::<(), azure_devops_core::Error>(())
/// ```
#[derive(Clone)]
pub struct CredentialConfig {
    kind: CredentialKind,
    organization: String,
    token: Option<Zeroizing<String>>,
    secret: Option<ClientSecretMaterial>,
    scope: Option<String>,
    authority_host: String,
    metadata_endpoint: String,
    resource: String,
}

impl CredentialConfig {
    /// Bearer token credentials.
    pub fn static_bearer(
        organization: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::try_from(CredentialFields {
            kind: Some(CredentialKind::StaticBearer),
            organization: organization.into(),
            token: Some(token.into()),
            ..Default::default()
        })
    }

    /// Personal access token credentials.
    pub fn personal_access_token(
        organization: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::try_from(CredentialFields {
            kind: Some(CredentialKind::PersonalAccessToken),
            organization: organization.into(),
            token: Some(token.into()),
            ..Default::default()
        })
    }

    /// OAuth client-credentials grant.
    pub fn oauth_client_credentials(
        organization: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_client_secret(
            CredentialKind::OAuthClientCredentials,
            organization.into(),
            client_id.into(),
            client_secret.into(),
            tenant_id.into(),
        )
    }

    /// Managed identity of the hosting machine.
    pub fn managed_identity(
        organization: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_client_secret(
            CredentialKind::ManagedIdentity,
            organization.into(),
            client_id.into(),
            client_secret.into(),
            tenant_id.into(),
        )
    }

    /// Service principal client-credentials grant.
    pub fn service_principal(
        organization: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_client_secret(
            CredentialKind::ServicePrincipal,
            organization.into(),
            client_id.into(),
            client_secret.into(),
            tenant_id.into(),
        )
    }

    fn with_client_secret(
        kind: CredentialKind,
        organization: String,
        client_id: String,
        client_secret: String,
        tenant_id: String,
    ) -> Result<Self, Error> {
        Self::try_from(CredentialFields {
            kind: Some(kind),
            organization,
            client_id: Some(client_id),
            client_secret: Some(client_secret),
            tenant_id: Some(tenant_id),
            ..Default::default()
        })
    }

    /// Overrides the OAuth scope. Only honored for
    /// [`CredentialKind::OAuthClientCredentials`].
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Overrides the identity authority, e.g. for sovereign clouds.
    #[must_use]
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the instance-metadata token endpoint.
    #[must_use]
    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    /// Returns the credential kind.
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Returns the organization name.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Returns the client id for token-endpoint kinds.
    pub fn client_id(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.client_id.as_str())
    }

    /// Returns the tenant id for token-endpoint kinds.
    pub fn tenant_id(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.tenant_id.as_str())
    }

    /// The scope requested from the token endpoint.
    pub fn scope(&self) -> &str {
        match self.kind {
            CredentialKind::OAuthClientCredentials => {
                self.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
            }
            _ => DEFAULT_SCOPE,
        }
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.as_str())
    }

    pub(crate) fn secret(&self) -> Option<&ClientSecretMaterial> {
        self.secret.as_ref()
    }

    pub(crate) fn token_endpoint(&self) -> Option<String> {
        self.secret
            .as_ref()
            .map(|s| format!("{}/{}/oauth2/v2.0/token", self.authority_host, s.tenant_id))
    }

    pub(crate) fn metadata_endpoint(&self) -> &str {
        &self.metadata_endpoint
    }

    pub(crate) fn resource(&self) -> &str {
        &self.resource
    }
}

impl TryFrom<CredentialFields> for CredentialConfig {
    type Error = Error;

    fn try_from(fields: CredentialFields) -> Result<Self, Self::Error> {
        let kind = fields
            .kind
            .ok_or_else(|| Error::configuration("credential kind is required"))?;

        if fields.organization.trim().is_empty() {
            return Err(Error::configuration("organization is required"));
        }

        let mut token = None;
        let mut secret = None;

        match kind {
            CredentialKind::StaticBearer | CredentialKind::PersonalAccessToken => {
                token = Some(Zeroizing::new(required(fields.token, kind, "token")?));
            }
            CredentialKind::OAuthClientCredentials
            | CredentialKind::ManagedIdentity
            | CredentialKind::ServicePrincipal => {
                secret = Some(ClientSecretMaterial {
                    client_id: required(fields.client_id, kind, "client_id")?,
                    client_secret: Zeroizing::new(required(
                        fields.client_secret,
                        kind,
                        "client_secret",
                    )?),
                    tenant_id: required(fields.tenant_id, kind, "tenant_id")?,
                });
            }
        }

        Ok(Self {
            kind,
            organization: fields.organization,
            token,
            secret,
            scope: fields.scope,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
        })
    }
}

fn required(value: Option<String>, kind: CredentialKind, field: &str) -> Result<String, Error> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::configuration(format!(
            "{} is required for {} authentication",
            field, kind
        ))),
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("kind", &self.kind)
            .field("organization", &self.organization)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id())
            .field("client_secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("tenant_id", &self.tenant_id())
            .field("scope", &self.scope())
            .finish_non_exhaustive()
    }
}
