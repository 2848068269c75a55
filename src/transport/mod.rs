//! HTTP execution layer.
//!
//! - [`ApiRequest`] / [`ApiResponse`]: One logical call and its buffered result
//! - [`RequestExecutor`]: Authentication, admission, per-attempt timeout and retry
//! - [`AttemptOutcome`]: Typed classification of a single attempt
//! - [`RequestPhase`]: Lifecycle phase recorded on tracing events
//!
//! The executor is usually reached through [`Client`](crate::Client), which
//! adds JSON convenience methods and pagination on top.

mod executor;
mod outcome;
mod request;

pub use executor::{RequestExecutor, DEFAULT_API_VERSION, DEFAULT_TIMEOUT};
pub use outcome::{parse_retry_after, AttemptOutcome, RequestPhase};
pub use request::{
    ApiRequest, ApiResponse, Method, RequestBody, CLIENT_REQUEST_ID_HEADER, CONTINUATION_HEADER,
    REQUEST_ID_HEADER,
};
