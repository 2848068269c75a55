//! Per-attempt classification driving the retry loop.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use super::request::{decode_error_body, ApiResponse, REQUEST_ID_HEADER};
use crate::{Error, ErrorKind};

/// Where a call currently is in its lifecycle. Recorded on tracing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// URL, headers and body are being prepared.
    Init,
    /// Credential headers are being obtained.
    Authenticating,
    /// Waiting for rate limiter admission.
    RateLimitWaiting,
    /// An attempt is on the wire.
    Sending,
    /// Sleeping before the next attempt.
    RetryWait,
    /// Completed with a `status < 400` response.
    Success,
    /// Completed with an error of the given kind.
    Failed(ErrorKind),
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPhase::Init => f.write_str("init"),
            RequestPhase::Authenticating => f.write_str("authenticating"),
            RequestPhase::RateLimitWaiting => f.write_str("rate_limit_waiting"),
            RequestPhase::Sending => f.write_str("sending"),
            RequestPhase::RetryWait => f.write_str("retry_wait"),
            RequestPhase::Success => f.write_str("success"),
            RequestPhase::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

/// Result of a single network attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// `status < 400`.
    Success(ApiResponse),
    /// Transient failure; another attempt may succeed.
    ///
    /// `server_retry_after` is set for 429 responses that carried `Retry-After`.
    Retryable {
        /// The error reported if no attempts remain.
        error: Error,
        /// Server-requested delay.
        server_retry_after: Option<Duration>,
    },
    /// Failure that retrying cannot fix.
    Terminal(Error),
}

impl AttemptOutcome {
    /// Classifies a fully read response.
    pub fn from_response(status: u16, headers: HeaderMap, body: bytes::Bytes) -> Self {
        if status < 400 {
            return AttemptOutcome::Success(ApiResponse::new(status, headers, body));
        }

        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let error = Error::from_response(status, decode_error_body(&body), request_id);

        if status == 429 {
            let server_retry_after = headers
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let error = match server_retry_after {
                Some(delay) => error.with_retry_after(delay),
                None => error,
            };
            return AttemptOutcome::Retryable {
                error,
                server_retry_after,
            };
        }

        if error.is_retriable() {
            AttemptOutcome::Retryable {
                error,
                server_retry_after: None,
            }
        } else {
            AttemptOutcome::Terminal(error)
        }
    }

    /// Classifies a transport-level failure.
    pub fn from_transport_error(err: reqwest::Error) -> Self {
        let error = Error::from(err);
        if error.is_retriable() {
            AttemptOutcome::Retryable {
                error,
                server_retry_after: None,
            }
        } else {
            AttemptOutcome::Terminal(error)
        }
    }
}

/// Parses a `Retry-After` value given as delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}
