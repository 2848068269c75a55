//! Main error type for the client core.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use super::ErrorKind;

/// The primary error type for client operations.
///
/// `Error` provides rich context for debugging and error handling:
/// - [`kind()`](Error::kind): Categorization for `match` statements
/// - [`status()`](Error::status): HTTP status, when the failure came from a response
/// - [`request_id()`](Error::request_id): Correlation ID for support
/// - [`retry_after()`](Error::retry_after): Delay hint for rate limits
/// - [`body()`](Error::body): Decoded error body returned by the server
///
/// ## Error Hierarchy
///
/// ```text
/// Error
/// ├── kind: ErrorKind          (category for matching)
/// ├── message: String          (human-readable description)
/// ├── status: Option<u16>      (HTTP status of the failing response)
/// ├── request_id: Option       (server-assigned correlation ID)
/// ├── retry_after: Option      (rate limit delay hint)
/// ├── body: Option<Value>      (decoded error body)
/// └── source: Option           (underlying cause)
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    status: Option<u16>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    body: Option<serde_json::Value>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error with the given kind and message.
    ///
    /// # Example
    ///
    /// ```rust
    /// use azure_devops_core::{Error, ErrorKind};
    ///
    /// let err = Error::new(ErrorKind::Validation, "endpoint cannot be empty");
    /// assert_eq!(err.kind(), ErrorKind::Validation);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            request_id: None,
            retry_after: None,
            body: None,
            source: None,
        }
    }

    /// Creates an error from a kind with a default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        let message = match kind {
            ErrorKind::Configuration => "invalid configuration",
            ErrorKind::Authentication => "authentication failed",
            ErrorKind::Authorization => "access forbidden",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::Validation => "bad request",
            ErrorKind::RateLimited => "rate limit exceeded",
            ErrorKind::Server => "server error",
            ErrorKind::Timeout => "request timed out",
            ErrorKind::Connection => "connection failed",
            ErrorKind::Pagination => "failed to fetch page",
            ErrorKind::Cancelled => "operation cancelled",
            ErrorKind::InvalidResponse => "invalid response",
            ErrorKind::Unknown => "unknown error",
        };
        Self::new(kind, message)
    }

    /// Builds the error for a failed HTTP response.
    ///
    /// The message is taken from the body's `message` field, then `error.message`,
    /// falling back to `HTTP {status}`. When the response carried no request id the
    /// body's `ActivityId` is used instead.
    pub fn from_response(
        status: u16,
        body: serde_json::Value,
        request_id: Option<String>,
    ) -> Self {
        let kind = ErrorKind::from_http_status(status);
        let detail = body
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| {
                body.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
            })
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status));
        let request_id = request_id.or_else(|| {
            body.get("ActivityId")
                .or_else(|| body.get("activityId"))
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        });

        let mut err = Self::new(kind, detail);
        err.status = Some(status);
        err.request_id = request_id;
        err.body = Some(body);
        err
    }

    /// Returns the error kind for categorization.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message without the kind prefix.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status of the failing response, if any.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the server-assigned request ID, if available.
    ///
    /// Always include this in error logs for support correlation.
    #[inline]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the recommended retry delay for rate limit errors.
    ///
    /// Populated from the `Retry-After` header for server throttling, or from the
    /// token bucket's refill estimate for client-side admission failures.
    #[inline]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns the decoded error body, if the server sent one.
    #[inline]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Returns `true` if the executor treats this error as transient.
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    /// Sets the HTTP status for this error.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the request ID for this error.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the retry-after duration for this error.
    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Sets the source error for this error.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors for common error types

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates a rate limited error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let mut err = Self::from_kind(ErrorKind::RateLimited);
        err.retry_after = retry_after;
        err
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Creates a cancelled error.
    pub fn cancelled() -> Self {
        Self::from_kind(ErrorKind::Cancelled)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    /// Wraps the failure of an eager multi-page fetch.
    ///
    /// The cause keeps its own kind and is reachable through
    /// [`std::error::Error::source`].
    pub fn pagination(cause: Error) -> Self {
        let message = format!("failed to fetch page: {}", cause);
        let mut err = Self::new(ErrorKind::Pagination, message);
        err.status = cause.status;
        err.request_id = cause.request_id.clone();
        err.source = Some(Box::new(cause));
        err
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(status) = self.status {
            write!(f, " (status: {})", status)?;
        }

        if let Some(ref request_id) = self.request_id {
            write!(f, " (request_id: {})", request_id)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::configuration(format!("invalid URL: {}", err)).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::invalid_response(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::timeout(format!("request timed out: {}", err)).with_source(err)
        } else if err.is_connect() {
            Error::connection(format!("connection failed: {}", err)).with_source(err)
        } else if is_dropped_connection(&err) {
            Error::connection(format!("connection lost: {}", err)).with_source(err)
        } else {
            Error::new(ErrorKind::Unknown, format!("HTTP error: {}", err)).with_source(err)
        }
    }
}

/// A request that failed on the wire after the connection was established,
/// such as a socket the server closed before or while responding.
fn is_dropped_connection(err: &reqwest::Error) -> bool {
    (err.is_request() || err.is_body())
        && !(err.is_builder() || err.is_redirect() || err.is_decode())
}
