//! Lazy traversal of cursor-paginated list endpoints.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::cursor::{extract_cursor, extract_items, extract_total_count, PaginationCursor};
use crate::transport::{ApiRequest, ApiResponse};
use crate::Error;

/// Page size hint used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Pagination parameters handed to the page-fetch function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Page size hint, sent as `$top`.
    pub page_size: u32,
    /// Cursor of the page to fetch, `None` for the first page.
    pub cursor: Option<PaginationCursor>,
}

impl PageRequest {
    /// Adds `$top` and the cursor parameter to `request`.
    pub fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        request.set_query("$top", self.page_size);
        if let Some(cursor) = &self.cursor {
            request.set_query(cursor.parameter(), cursor.value());
        }
        request
    }
}

/// A decoded page body together with its response headers.
#[derive(Debug, Clone, Default)]
pub struct PageEnvelope {
    /// Decoded JSON body.
    pub body: Value,
    /// Response headers; some endpoints return the cursor here.
    pub headers: HeaderMap,
}

impl PageEnvelope {
    /// An envelope with no headers.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            headers: HeaderMap::new(),
        }
    }

    /// Decodes an executor response.
    pub fn from_response(response: &ApiResponse) -> Result<Self, Error> {
        Ok(Self {
            body: response.json_value()?,
            headers: response.headers().clone(),
        })
    }
}

/// One page of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// Items in server order.
    pub items: Vec<Value>,
    /// Cursor for the next page.
    pub next_cursor: Option<PaginationCursor>,
    /// `true` if the server indicated another page.
    pub has_more: bool,
    /// Total item count, when the server reports one.
    pub total_count: Option<u64>,
    /// The page carried a next link in a shape no cursor could be read from.
    pub continuation_unrecognized: bool,
}

impl PageResult {
    /// Interprets a page envelope.
    pub fn from_envelope(envelope: &PageEnvelope) -> Self {
        let extraction = extract_cursor(&envelope.body, &envelope.headers);
        if extraction.unrecognized {
            tracing::warn!(
                "page carried a next link without a recognized cursor parameter; \
                 traversal stops here and may be incomplete"
            );
        }
        Self {
            items: extract_items(&envelope.body),
            has_more: extraction.cursor.is_some(),
            next_cursor: extraction.cursor,
            total_count: extract_total_count(&envelope.body),
            continuation_unrecognized: extraction.unrecognized,
        }
    }
}

#[derive(Debug, Default)]
struct TraversalState {
    cursor: Option<PaginationCursor>,
    seen: HashSet<String>,
    pages: u32,
    done: bool,
}

/// Normalizes a caller-supplied page-fetch function into ordered sequences.
///
/// `fetch` receives a [`PageRequest`] and returns the decoded page. Each
/// traversal started from a `PageTraverser` keeps its own cursor and page
/// count. A traversal ends when a page carries no cursor, when a cursor repeats
/// one already followed, or after `max_pages` pages.
///
/// ## Limitation
///
/// A page whose next link carries none of the supported cursor parameters ends
/// the traversal. That page is flagged with
/// [`PageResult::continuation_unrecognized`] and a warning is logged.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::pagination::{PageEnvelope, PageRequest, PageTraverser};
/// use futures::TryStreamExt;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), azure_devops_core::Error> {
/// let fetch = |request: PageRequest| async move {
///     Ok::<_, azure_devops_core::Error>(match request.cursor {
///         None => PageEnvelope::new(json!({"value": [1, 2], "continuationToken": "p2"})),
///         Some(_) => PageEnvelope::new(json!({"value": [3]})),
///     })
/// };
///
/// let items: Vec<_> = PageTraverser::new(fetch).iterate_items().try_collect().await?;
/// assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
/// # Ok(())
/// # }
/// ```
pub struct PageTraverser<F> {
    fetch: F,
    page_size: u32,
    max_pages: Option<u32>,
}

impl<F, Fut> PageTraverser<F>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<PageEnvelope, Error>>,
{
    /// Creates a traverser with the default page size and no page bound.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }

    /// Sets the page size hint.
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stops after `max_pages` pages.
    #[must_use]
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Fetches the page at `cursor`.
    pub async fn fetch_page(
        &mut self,
        cursor: Option<PaginationCursor>,
    ) -> Result<PageResult, Error> {
        let request = PageRequest {
            page_size: self.page_size,
            cursor,
        };
        let envelope = (self.fetch)(request).await?;
        Ok(PageResult::from_envelope(&envelope))
    }

    async fn advance(&mut self, state: &mut TraversalState) -> Result<Option<PageResult>, Error> {
        if state.done || self.max_pages.is_some_and(|max| state.pages >= max) {
            return Ok(None);
        }

        let page = self.fetch_page(state.cursor.take()).await?;
        state.pages += 1;

        match &page.next_cursor {
            Some(next) if state.seen.insert(next.value().to_string()) => {
                state.cursor = Some(next.clone());
            }
            Some(next) => {
                tracing::warn!(
                    cursor = next.value(),
                    pages = state.pages,
                    "server repeated a continuation cursor, ending traversal"
                );
                state.done = true;
            }
            None => state.done = true,
        }

        Ok(Some(page))
    }

    /// Lazily yields pages in server order.
    ///
    /// The stream is forward-only and consumes the traverser. It ends after
    /// the first error.
    pub fn iterate_pages(self) -> impl Stream<Item = Result<PageResult, Error>> {
        stream::try_unfold(
            (self, TraversalState::default()),
            |(mut traverser, mut state)| async move {
                let page = traverser.advance(&mut state).await?;
                Ok(page.map(|page| (page, (traverser, state))))
            },
        )
    }

    /// Lazily yields individual items across all pages, preserving order.
    pub fn iterate_items(self) -> impl Stream<Item = Result<Value, Error>> {
        self.iterate_pages()
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<Value, Error>)))
            .try_flatten()
    }

    /// Fetches every page eagerly and concatenates the items.
    ///
    /// # Errors
    ///
    /// Any fetch failure aborts the traversal with a `Pagination` error whose
    /// source is the cause. Items gathered so far are discarded.
    pub async fn get_all_pages(&mut self) -> Result<Vec<Value>, Error> {
        let mut state = TraversalState::default();
        let mut items = Vec::new();
        while let Some(page) = self.advance(&mut state).await.map_err(Error::pagination)? {
            items.extend(page.items);
        }
        Ok(items)
    }
}

impl<F> std::fmt::Debug for PageTraverser<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTraverser")
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}
