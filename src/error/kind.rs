//! Error kind enumeration for categorizing client errors.

/// Categorization of client errors.
///
/// This enum provides a stable interface for matching on error types, enabling
/// different handling strategies for different failure modes.
///
/// ## Retriable vs Non-Retriable
///
/// | ErrorKind         | Retried by the executor | Action                       |
/// |-------------------|-------------------------|------------------------------|
/// | `Timeout`         | Yes                     | Surfaced after exhaustion    |
/// | `Connection`      | Yes                     | Surfaced after exhaustion    |
/// | `Server`          | Yes                     | Surfaced after exhaustion    |
/// | `RateLimited`     | Yes                     | Use `retry_after()` delay    |
/// | `Authentication`  | No                      | Next call re-acquires token  |
/// | `Authorization`   | No                      | Fix permissions              |
/// | `NotFound`        | No                      | Resource doesn't exist       |
/// | `Validation`      | No                      | Fix the request              |
/// | `Configuration`   | No                      | Fix the configuration        |
/// | `Pagination`      | No                      | Inspect `source()`           |
/// | `Cancelled`       | No                      | Caller asked to stop         |
/// | `InvalidResponse` | No                      | Body could not be decoded    |
/// | `Unknown`         | No                      | Unclassified status          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid client configuration (missing credential fields, bad URL, bad knobs).
    ///
    /// Raised at construction time, never deferred to the first request.
    #[error("configuration error")]
    Configuration,

    /// Authentication failed: HTTP 401, or the bearer token could not be acquired.
    #[error("authentication failed")]
    Authentication,

    /// Valid credentials but insufficient permissions.
    ///
    /// HTTP: 403 Forbidden
    #[error("authorization failed")]
    Authorization,

    /// Requested resource was not found.
    ///
    /// HTTP: 404 Not Found
    #[error("not found")]
    NotFound,

    /// The server rejected the request payload or parameters.
    ///
    /// HTTP: 400 Bad Request
    #[error("validation failed")]
    Validation,

    /// Rate limit exceeded, either client-side admission or HTTP 429 after retries.
    ///
    /// **Retriable.** Use `Error::retry_after()` for the recommended delay.
    #[error("rate limited")]
    RateLimited,

    /// Server-side failure.
    ///
    /// HTTP: 5xx
    #[error("server error")]
    Server,

    /// A single network attempt exceeded its timeout.
    #[error("timeout")]
    Timeout,

    /// Connection error (DNS, TLS handshake, refused, reset).
    #[error("connection error")]
    Connection,

    /// An eager multi-page fetch failed; the cause is available via `source()`.
    #[error("pagination error")]
    Pagination,

    /// The operation was cancelled through a [`CancelSignal`](crate::CancelSignal).
    #[error("cancelled")]
    Cancelled,

    /// Response body could not be decoded.
    #[error("invalid response")]
    InvalidResponse,

    /// Unclassified HTTP status or unexpected transport failure.
    #[error("unknown error")]
    Unknown,
}

impl ErrorKind {
    /// Returns `true` if the request executor retries this kind locally.
    ///
    /// # Example
    ///
    /// ```rust
    /// use azure_devops_core::ErrorKind;
    ///
    /// assert!(ErrorKind::Timeout.is_retriable());
    /// assert!(!ErrorKind::Validation.is_retriable());
    /// ```
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Server | ErrorKind::RateLimited
        )
    }

    /// Returns the representative HTTP status code for this error kind.
    #[inline]
    pub fn http_status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Cancelled => 499, // Client Closed Request
            ErrorKind::Connection | ErrorKind::InvalidResponse => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Server
            | ErrorKind::Configuration
            | ErrorKind::Pagination
            | ErrorKind::Unknown => 500,
        }
    }

    /// Classifies an HTTP error status.
    ///
    /// Only the codes the API documents are mapped to specific kinds; every
    /// other 4xx is [`ErrorKind::Unknown`].
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }
}
