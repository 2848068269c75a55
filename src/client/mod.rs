//! The Azure DevOps REST client.
//!
//! [`Client`] bundles a [`RequestExecutor`] with JSON helpers and pagination.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azure_devops_core::prelude::*;
//! use serde_json::Value;
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .credentials(CredentialConfig::personal_access_token("contoso", "pat")?)
//!     .build()?;
//!
//! let projects: Value = client.get_json("projects").await?;
//! let repos = client
//!     .paginate(ApiRequest::get("git/repositories"), 100)
//!     .get_all_pages()
//!     .await?;
//! # let _ = (projects, repos);
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::{ClientBuilder, HasCredentials, NoCredentials};

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Error,
    auth::AuthHeaders,
    cancel::CancelSignal,
    pagination::{PageEnvelope, PageRequest, PageTraverser},
    ratelimit::{RateLimiter, RateLimiterStats},
    transport::{ApiRequest, ApiResponse, RequestExecutor},
};

/// Future returned by the fetch function of [`Client::paginate`].
pub type PageFuture = BoxFuture<'static, Result<PageEnvelope, Error>>;

/// An Azure DevOps REST client.
///
/// ## Thread Safety
///
/// `Client` is `Clone` and thread-safe. Clones share one executor, and so one
/// credential cache and one rate limiter.
#[derive(Clone)]
pub struct Client {
    executor: Arc<RequestExecutor>,
}

/// Point-in-time view of a client's configuration and limiter.
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Base URL relative endpoints resolve against.
    pub base_url: String,
    /// Default `api-version`.
    pub api_version: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Rate limiter snapshot.
    pub rate_limiter: RateLimiterStats,
}

impl Client {
    /// Creates a new client builder.
    pub fn builder() -> ClientBuilder<NoCredentials> {
        ClientBuilder::new()
    }

    pub(crate) fn from_executor(executor: RequestExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Returns the underlying executor.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Returns the base URL. Always ends with `/`.
    pub fn base_url(&self) -> &str {
        self.executor.base_url().as_str()
    }

    /// Returns the default `api-version`.
    pub fn api_version(&self) -> &str {
        self.executor.api_version()
    }

    /// Returns the rate limiter shared by every clone of this client.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.executor.rate_limiter()
    }

    /// Returns the current authentication headers.
    pub async fn auth_headers(&self) -> Result<AuthHeaders, Error> {
        self.executor.auth_headers().await
    }

    /// Executes a request.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.executor.execute(request).await
    }

    /// Executes a request, aborting with `Cancelled` once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        request: ApiRequest,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse, Error> {
        self.executor.execute_with_cancel(request, cancel).await
    }

    /// `GET`s `endpoint` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, Error> {
        self.execute(ApiRequest::get(endpoint)).await?.json()
    }

    /// `POST`s `body` as JSON and decodes the JSON response.
    pub async fn post_json<T, B>(&self, endpoint: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::post(endpoint).json_from(body)?)
            .await?
            .json()
    }

    /// `PUT`s `body` as JSON and decodes the JSON response.
    pub async fn put_json<T, B>(&self, endpoint: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::put(endpoint).json_from(body)?)
            .await?
            .json()
    }

    /// `PATCH`es `body` as JSON and decodes the JSON response.
    pub async fn patch_json<T, B>(&self, endpoint: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::patch(endpoint).json_from(body)?)
            .await?
            .json()
    }

    /// `DELETE`s `endpoint`.
    pub async fn delete(&self, endpoint: &str) -> Result<ApiResponse, Error> {
        self.execute(ApiRequest::delete(endpoint)).await
    }

    /// Pages through `request`, sending `$top = page_size` and each cursor.
    ///
    /// Every page goes through [`execute`](Client::execute), so it is
    /// authenticated, rate limited and retried like any other call.
    pub fn paginate(
        &self,
        request: ApiRequest,
        page_size: u32,
    ) -> PageTraverser<impl FnMut(PageRequest) -> PageFuture + Send + 'static> {
        let client = self.clone();
        let fetch = move |page: PageRequest| -> PageFuture {
            let client = client.clone();
            let request = page.apply(request.clone());
            Box::pin(async move {
                let response = client.execute(request).await?;
                PageEnvelope::from_response(&response)
            })
        };
        PageTraverser::new(fetch).page_size(page_size)
    }

    /// Returns a snapshot of the client's configuration and limiter.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            base_url: self.base_url().to_string(),
            api_version: self.api_version().to_string(),
            timeout: self.executor.timeout(),
            max_retries: self.executor.retry_config().max_retries,
            rate_limiter: self.rate_limiter().stats(),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url())
            .field("api_version", &self.api_version())
            .finish_non_exhaustive()
    }
}
