//! Credentials provider trait for pluggable authentication.

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use crate::Error;

/// Header name to value map produced by a credentials provider.
pub type AuthHeaders = BTreeMap<String, String>;

/// A type alias for the boxed future returned by credentials providers.
pub type CredentialsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AuthHeaders, Error>> + Send + 'a>>;

/// Trait for producing authentication headers for each request.
///
/// [`CredentialProvider`](crate::CredentialProvider) implements it for the built-in
/// credential kinds; implement it yourself to source tokens from elsewhere.
///
/// ## Object Safety
///
/// This trait is object-safe and can be used as `Arc<dyn CredentialsProvider>`.
///
/// ## Example: Environment Variable Provider
///
/// ```rust
/// use azure_devops_core::auth::{AuthHeaders, CredentialsFuture, CredentialsProvider};
///
/// struct EnvTokenProvider {
///     env_var: String,
/// }
///
/// impl CredentialsProvider for EnvTokenProvider {
///     fn auth_headers(&self) -> CredentialsFuture<'_> {
///         let env_var = self.env_var.clone();
///         Box::pin(async move {
///             let token = std::env::var(&env_var).map_err(|_| {
///                 azure_devops_core::Error::authentication(format!("{} not set", env_var))
///             })?;
///             let mut headers = AuthHeaders::new();
///             headers.insert("Authorization".into(), format!("Bearer {}", token));
///             Ok(headers)
///         })
///     }
/// }
/// ```
pub trait CredentialsProvider: Send + Sync {
    /// Returns a future that resolves to the headers authenticating one request.
    ///
    /// # Errors
    ///
    /// Returns an `Authentication` error if the material is missing or a token
    /// refresh fails.
    fn auth_headers(&self) -> CredentialsFuture<'_>;

    /// Drops any cached token so the next call re-acquires.
    ///
    /// Called by the executor after a 401 response. The default does nothing.
    fn invalidate(&self) {}
}

// Allow using Arc<dyn CredentialsProvider> as CredentialsProvider
impl<T: CredentialsProvider + ?Sized> CredentialsProvider for Arc<T> {
    fn auth_headers(&self) -> CredentialsFuture<'_> {
        (**self).auth_headers()
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

// Allow using Box<dyn CredentialsProvider> as CredentialsProvider
impl<T: CredentialsProvider + ?Sized> CredentialsProvider for Box<T> {
    fn auth_headers(&self) -> CredentialsFuture<'_> {
        (**self).auth_headers()
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}
