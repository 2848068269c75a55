//! Stateful pagination for endpoints that return no cursor.
//!
//! Both strategies infer whether another page exists from the page they just
//! saw: a short page (`len(items) < page_size`) ends the listing, and
//! [`OffsetPagination`] also stops once the reported total `count` is reached.

use serde_json::Value;

use super::cursor::{extract_items, extract_total_count};
use crate::transport::ApiRequest;

/// `$top` / `$skip` paging that advances by the number of items received.
///
/// ```rust
/// use azure_devops_core::pagination::OffsetPagination;
/// use serde_json::json;
///
/// let mut paging = OffsetPagination::new(2);
/// paging.update(&json!({"count": 3, "value": [1, 2]}));
/// assert!(paging.has_more());
/// assert_eq!(paging.offset(), 2);
///
/// paging.update(&json!({"count": 3, "value": [3]}));
/// assert!(!paging.has_more());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPagination {
    page_size: u32,
    offset: u64,
    total_count: Option<u64>,
    has_more: bool,
}

impl OffsetPagination {
    /// Starts at offset zero.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            offset: 0,
            total_count: None,
            has_more: true,
        }
    }

    /// Query parameters for the next page.
    pub fn params(&self) -> Vec<(String, String)> {
        vec![
            ("$top".to_string(), self.page_size.to_string()),
            ("$skip".to_string(), self.offset.to_string()),
        ]
    }

    /// Adds the next page's parameters to `request`.
    pub fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        for (key, value) in self.params() {
            request.set_query(&key, value);
        }
        request
    }

    /// Advances from the page body just received.
    pub fn update(&mut self, body: &Value) {
        let received = extract_items(body).len() as u64;
        self.total_count = extract_total_count(body);

        if received < u64::from(self.page_size) {
            self.has_more = false;
        } else if self
            .total_count
            .is_some_and(|total| total > 0 && self.offset + received >= total)
        {
            self.has_more = false;
        } else {
            self.offset += received;
        }
    }

    /// Returns `true` while another page may exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Returns the `$skip` of the next page.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the total count reported by the last page.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }
}

/// Fixed-size pages whose cursor is the `$skip` of the next page.
///
/// The first page is requested without `$skip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipCursorPagination {
    page_size: u32,
    cursor: Option<u64>,
    has_more: bool,
}

impl SkipCursorPagination {
    /// Starts before the first page.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: None,
            has_more: true,
        }
    }

    /// Query parameters for the next page.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("$top".to_string(), self.page_size.to_string())];
        if let Some(skip) = self.cursor {
            params.push(("$skip".to_string(), skip.to_string()));
        }
        params
    }

    /// Adds the next page's parameters to `request`.
    pub fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        for (key, value) in self.params() {
            request.set_query(&key, value);
        }
        request
    }

    /// Advances from the page body just received.
    pub fn update(&mut self, body: &Value) {
        let received = extract_items(body).len() as u64;
        if received < u64::from(self.page_size) {
            self.has_more = false;
        } else {
            self.cursor = Some(self.cursor.unwrap_or(0) + u64::from(self.page_size));
        }
    }

    /// Returns `true` while another page may exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Returns the current `$skip` cursor.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }
}
