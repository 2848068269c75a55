//! Authentication and credentials.
//!
//! This module provides types for authenticating against the API:
//!
//! - [`CredentialConfig`]: Validated credential material for one [`CredentialKind`]
//! - [`CredentialProvider`]: Built-in provider with a single-flight token cache
//! - [`CredentialsProvider`]: Trait for custom header sources
//! - [`CachedToken`]: A bearer token and its refresh deadline
//!
//! ## Service Principal
//!
//! ```rust,no_run
//! use azure_devops_core::{Client, CredentialConfig};
//!
//! # async fn example() -> Result<(), azure_devops_core::Error> {
//! let client = Client::builder()
//!     .credentials(CredentialConfig::service_principal(
//!         "contoso",
//!         "app-id",
//!         "client-secret",
//!         "tenant-id",
//!     )?)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Personal Access Token
//!
//! ```rust
//! use azure_devops_core::{Client, CredentialConfig};
//!
//! # fn example() -> Result<(), azure_devops_core::Error> {
//! let client = Client::builder()
//!     .credentials(CredentialConfig::personal_access_token("contoso", "pat")?)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod credential_provider;
mod credentials;
mod provider;
mod token;

pub use credential_provider::CredentialProvider;
pub use credentials::{CredentialConfig, CredentialFields, CredentialKind};
pub use provider::{AuthHeaders, CredentialsFuture, CredentialsProvider};
pub use token::{
    CachedToken, DEFAULT_AUTHORITY_HOST, DEFAULT_METADATA_ENDPOINT, DEFAULT_RESOURCE,
    DEFAULT_SCOPE, TOKEN_SAFETY_BUFFER,
};
