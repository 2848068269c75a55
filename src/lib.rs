//! # Azure DevOps REST core
//!
//! Resilient request plumbing for the Azure DevOps REST API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azure_devops_core::prelude::*;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .credentials(CredentialConfig::personal_access_token("contoso", "pat")?)
//!         .build()?;
//!
//!     // Single call
//!     let project: Value = client.get_json("projects/Fabrikam").await?;
//!     println!("{}", project["name"]);
//!
//!     // Every page of a listing
//!     let builds = client
//!         .paginate(ApiRequest::get("build/builds"), 100)
//!         .get_all_pages()
//!         .await?;
//!     println!("{} builds", builds.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Key Concepts
//!
//! - **Credentials**: [`CredentialProvider`] turns a validated [`CredentialConfig`]
//!   into auth headers, caching expiring tokens with a five-minute safety margin
//! - **Admission**: [`RateLimiter`] is a token bucket shared by `Arc` between every
//!   executor that draws on the same budget
//! - **Execution**: [`RequestExecutor`] retries timeouts, connection failures,
//!   5xx and 429 responses with exponential backoff and honors `Retry-After`
//! - **Pagination**: [`PageTraverser`] follows continuation cursors as a lazy stream
//!   or collects every item eagerly
//!
//! ## Features
//!
//! - `rustls` (default): Use rustls for TLS
//! - `native-tls`: Use native TLS (OpenSSL on Linux, Secure Transport on macOS)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod pagination;
pub mod ratelimit;

// Transport layer
pub mod transport;

// Cancellation
pub mod cancel;

// Testing utilities
pub mod testing;

mod user_agent;

// Prelude for convenient imports
pub mod prelude;

// Re-export main types at crate root for convenience
pub use client::{Client, ClientBuilder, ClientStats};
pub use error::{Error, ErrorKind, Result};

// Re-export auth types
pub use auth::{
    AuthHeaders, CredentialConfig, CredentialFields, CredentialKind, CredentialProvider,
    CredentialsProvider,
};

// Re-export config types
pub use config::{ClientSettings, RateLimitPolicy, RetryConfig};

// Re-export execution types
pub use cancel::{CancelHandle, CancelSignal};
pub use pagination::{PageEnvelope, PageRequest, PageResult, PageTraverser, PaginationCursor};
pub use ratelimit::{RateLimiter, RateLimiterStats};
pub use transport::{ApiRequest, ApiResponse, Method, RequestBody, RequestExecutor};
