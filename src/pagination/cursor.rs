//! Continuation cursor and item extraction from response envelopes.

use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

use crate::transport::CONTINUATION_HEADER;

/// Query parameter a cursor is sent back in unless it came from a next link.
pub const CONTINUATION_PARAM: &str = "continuationToken";

/// Next-link query parameters checked for a cursor, in order.
const NEXT_LINK_PARAMS: [&str; 4] = ["continuationToken", "$skip", "skipToken", "token"];

/// Opaque server-issued marker for the next page.
///
/// Remembers the query parameter it has to be sent back in: cursors read from
/// a body field or header use `continuationToken`, cursors parsed out of a next
/// link reuse that link's parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationCursor {
    value: String,
    parameter: String,
}

impl PaginationCursor {
    /// A cursor sent back as `continuationToken`.
    pub fn new(value: impl Into<String>) -> Self {
        Self::with_parameter(value, CONTINUATION_PARAM)
    }

    /// A cursor sent back as `parameter`.
    pub fn with_parameter(value: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            parameter: parameter.into(),
        }
    }

    /// Returns the opaque cursor value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the query parameter name the cursor is sent in.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }
}

/// Outcome of looking for a cursor in one response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CursorExtraction {
    /// The cursor, if a supported shape carried one.
    pub cursor: Option<PaginationCursor>,
    /// A next link was present but carried none of the supported parameters.
    ///
    /// Traversal stops in that case even though the server may hold more data.
    pub unrecognized: bool,
}

/// Finds the continuation cursor in a decoded body and its response headers.
///
/// Checked in order:
///
/// 1. body field `continuationToken`
/// 2. body field `x-ms-continuationtoken`, then the response header of that name
/// 3. body field `nextLink` or `@odata.nextLink`, parsed for `continuationToken`,
///    `$skip`, `skipToken` and `token` query parameters in that order
pub fn extract_cursor(body: &Value, headers: &HeaderMap) -> CursorExtraction {
    if let Some(token) = scalar_field(body, "continuationToken") {
        return found(PaginationCursor::new(token));
    }
    if let Some(token) = scalar_field(body, CONTINUATION_HEADER) {
        return found(PaginationCursor::new(token));
    }
    if let Some(token) = headers
        .get(CONTINUATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return found(PaginationCursor::new(token));
    }

    let link = ["nextLink", "@odata.nextLink"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|link| !link.trim().is_empty());

    match link {
        Some(link) => match cursor_from_link(link) {
            Some(cursor) => found(cursor),
            None => CursorExtraction {
                cursor: None,
                unrecognized: true,
            },
        },
        None => CursorExtraction::default(),
    }
}

fn found(cursor: PaginationCursor) -> CursorExtraction {
    CursorExtraction {
        cursor: Some(cursor),
        unrecognized: false,
    }
}

fn scalar_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a next link, relative or absolute, for a supported cursor parameter.
pub fn cursor_from_link(link: &str) -> Option<PaginationCursor> {
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://relative.invalid/").ok()?.join(link).ok()?
        }
        Err(_) => return None,
    };

    NEXT_LINK_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(k, v)| k == param && !v.is_empty())
            .map(|(_, v)| PaginationCursor::with_parameter(v.into_owned(), *param))
    })
}

/// Pulls the item list out of a page body.
///
/// Items come from `value`, `results` or `items`, a top-level array, or a
/// single non-empty object wrapped in a one-element list.
pub fn extract_items(body: &Value) -> Vec<Value> {
    for key in ["value", "results", "items"] {
        if let Some(field) = body.get(key) {
            return match field {
                Value::Array(items) => items.clone(),
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
        }
    }
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) if !map.is_empty() => vec![body.clone()],
        _ => Vec::new(),
    }
}

/// Reads the optional total `count` field.
pub fn extract_total_count(body: &Value) -> Option<u64> {
    body.get("count").and_then(Value::as_u64)
}
