//! Error types for the Azure DevOps client core.
//!
//! Every failure surfaces as one [`Error`] carrying an [`ErrorKind`]. Transient kinds
//! (timeouts, connection failures, 5xx, 429) are retried by the request executor and
//! only reach the caller once the retry budget is spent; all other kinds propagate on
//! first occurrence.
//!
//! ```rust
//! use azure_devops_core::{Error, ErrorKind};
//!
//! fn describe(err: &Error) -> String {
//!     match err.kind() {
//!         ErrorKind::NotFound => "missing".to_string(),
//!         ErrorKind::RateLimited => format!("retry in {:?}", err.retry_after()),
//!         _ => err.to_string(),
//!     }
//! }
//! ```

#[allow(clippy::module_inception)]
mod error;
mod kind;

pub use error::Error;
pub use kind::ErrorKind;

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
