//! Scripted page source for pagination tests.

use std::{
    collections::HashMap,
    future::{Ready, ready},
    sync::Arc,
};

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::{
    Error, ErrorKind,
    pagination::{PageEnvelope, PageRequest},
};

/// A fixed set of pages keyed by the cursor that requests them.
///
/// Clones share the script, the fetch counter and the request log, so a clone
/// can be handed to a traverser while the original is inspected afterwards.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::testing::ScriptedPages;
/// use serde_json::json;
///
/// let pages = ScriptedPages::new()
///     .page(None, json!({"value": [1], "continuationToken": "next"}))
///     .page(Some("next"), json!({"value": [2]}));
/// assert_eq!(pages.fetch_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedPages {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<Option<String>, Value>>,
    requests: Mutex<Vec<PageRequest>>,
    failure: Mutex<Option<(usize, ErrorKind)>>,
}

impl ScriptedPages {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts consecutive pages linked by `continuationToken` cursors
    /// `page-1`, `page-2` and so on. The last page carries no cursor.
    pub fn chain(pages: Vec<Vec<Value>>) -> Self {
        let script = Self::new();
        let last = pages.len().saturating_sub(1);
        for (index, items) in pages.into_iter().enumerate() {
            let cursor = (index > 0).then(|| format!("page-{}", index));
            let body = if index < last {
                json!({"value": items, "continuationToken": format!("page-{}", index + 1)})
            } else {
                json!({"value": items})
            };
            script.inner.pages.lock().insert(cursor, body);
        }
        script
    }

    /// Scripts `body` as the page returned for `cursor`, `None` being the
    /// first page.
    #[must_use]
    pub fn page(self, cursor: Option<&str>, body: Value) -> Self {
        self.inner
            .pages
            .lock()
            .insert(cursor.map(str::to_string), body);
        self
    }

    /// Makes the `nth` fetch (1-based) fail with an error of `kind`.
    #[must_use]
    pub fn fail_on_fetch(self, nth: usize, kind: ErrorKind) -> Self {
        *self.inner.failure.lock() = Some((nth, kind));
        self
    }

    /// Serves one page request.
    ///
    /// # Errors
    ///
    /// Returns the injected failure on its fetch, and an `InvalidResponse`
    /// error for a cursor with no scripted page.
    pub fn fetch(&self, request: PageRequest) -> Result<PageEnvelope, Error> {
        let key = request.cursor.as_ref().map(|c| c.value().to_string());
        let fetch_number = {
            let mut requests = self.inner.requests.lock();
            requests.push(request);
            requests.len()
        };

        let failure = *self.inner.failure.lock();
        if let Some((nth, kind)) = failure
            && nth == fetch_number
        {
            return Err(Error::new(kind, format!("scripted failure on fetch {}", nth)));
        }

        self.inner
            .pages
            .lock()
            .get(&key)
            .cloned()
            .map(PageEnvelope::new)
            .ok_or_else(|| {
                Error::invalid_response(format!("no scripted page for cursor {:?}", key))
            })
    }

    /// Returns a fetch function for
    /// [`PageTraverser::new`](crate::pagination::PageTraverser::new).
    pub fn source(
        &self,
    ) -> impl FnMut(PageRequest) -> Ready<Result<PageEnvelope, Error>> + Clone + Send + 'static
    {
        let script = self.clone();
        move |request| ready(script.fetch(request))
    }

    /// Number of fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Every page request received, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.inner.requests.lock().clone()
    }
}

impl std::fmt::Debug for ScriptedPages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPages")
            .field("pages", &self.inner.pages.lock().len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}
