//! Request and response values exchanged with the executor.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use reqwest::Method;

use crate::Error;

/// Header carrying the server-assigned request id.
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";

/// Header carrying the caller-assigned correlation id.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Header some list endpoints use for the continuation cursor.
pub const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Payload of an [`ApiRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// UTF-8 text sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Bytes),
    /// Structured value, JSON-encoded with `Content-Type: application/json`.
    Json(serde_json::Value),
}

impl RequestBody {
    /// Returns `true` for [`RequestBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub(crate) fn encode(&self) -> Result<Option<Bytes>, Error> {
        Ok(match self {
            RequestBody::Empty => None,
            RequestBody::Text(s) => Some(Bytes::from(s.clone())),
            RequestBody::Bytes(b) => Some(b.clone()),
            RequestBody::Json(v) => Some(Bytes::from(serde_json::to_vec(v)?)),
        })
    }
}

/// One logical API call.
///
/// `endpoint` is relative to the client's base URL unless it is an absolute
/// `http(s)://` URL, which is used unchanged apart from the `api-version`
/// parameter.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::{ApiRequest, Method};
/// use serde_json::json;
///
/// let request = ApiRequest::post("wit/workitems/$Task")
///     .query("validateOnly", "true")
///     .header("Content-Type", "application/json-patch+json")
///     .json(json!([{"op": "add", "path": "/fields/System.Title", "value": "Fix build"}]));
/// assert_eq!(request.method(), &Method::POST);
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: RequestBody,
    api_version: Option<String>,
}

impl ApiRequest {
    /// Creates a request with no parameters, headers or body.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            api_version: None,
        }
    }

    /// `GET` request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// `POST` request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// `PUT` request.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    /// `PATCH` request.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// `DELETE` request.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends several query parameters.
    #[must_use]
    pub fn queries<K, V, I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Sets a header, overriding credential and default headers of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Serializes `value` as the JSON body.
    pub fn json_from<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, Error> {
        Ok(self.json(serde_json::to_value(value)?))
    }

    /// Sets a text body sent unchanged.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = RequestBody::Text(text.into());
        self
    }

    /// Sets a raw byte body sent unchanged.
    #[must_use]
    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(bytes.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Overrides the client's `api-version` for this call only.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the endpoint as given.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the query parameters, excluding `api-version`.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the caller-supplied headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the body.
    pub fn request_body(&self) -> &RequestBody {
        &self.body
    }

    /// Returns the per-call `api-version` override.
    pub fn api_version_override(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// Replaces the value of query parameter `key`, adding it if absent.
    pub(crate) fn set_query(&mut self, key: &str, value: impl ToString) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
    }
}

/// A successful (`status < 400`) response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    /// Creates a response value.
    pub fn new(status: u16, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns all response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response, returning the raw body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::invalid_response(format!(
                "failed to decode {} response body: {}",
                self.status, e
            ))
            .with_status(self.status)
            .with_source(e)
        })
    }

    /// Decodes the body as a JSON value, treating an empty body as an empty object.
    pub fn json_value(&self) -> Result<serde_json::Value, Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        self.json()
    }

    /// Returns the server-assigned request id.
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }
}

/// Decodes an error body: JSON if it parses, `{"text": ..}` otherwise.
pub(crate) fn decode_error_body(body: &[u8]) -> serde_json::Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::json!({ "text": String::from_utf8_lossy(body) })
    })
}
