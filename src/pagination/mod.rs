//! Pagination over enveloped list responses.
//!
//! - [`PageTraverser`]: Cursor-following traversal as lazy streams or an eager list
//! - [`extract_cursor`]: Cursor lookup across the supported response shapes
//! - [`OffsetPagination`] / [`SkipCursorPagination`]: Count-based paging for
//!   endpoints without cursors
//!
//! [`Client::paginate`](crate::Client::paginate) wires a traverser to an
//! [`ApiRequest`](crate::ApiRequest).

mod cursor;
mod strategies;
mod traverser;

pub use cursor::{
    cursor_from_link, extract_cursor, extract_items, extract_total_count, CursorExtraction,
    PaginationCursor, CONTINUATION_PARAM,
};
pub use strategies::{OffsetPagination, SkipCursorPagination};
pub use traverser::{PageEnvelope, PageRequest, PageResult, PageTraverser, DEFAULT_PAGE_SIZE};
