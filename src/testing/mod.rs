//! Testing utilities.
//!
//! - [`ScriptedPages`]: Deterministic in-memory page source for
//!   [`PageTraverser`](crate::pagination::PageTraverser)
//!
//! ## Quick Start
//!
//! ```rust
//! use azure_devops_core::pagination::PageTraverser;
//! use azure_devops_core::testing::ScriptedPages;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), azure_devops_core::Error> {
//! let pages = ScriptedPages::chain(vec![
//!     vec![json!(1), json!(2)],
//!     vec![json!(3)],
//! ]);
//!
//! let items = PageTraverser::new(pages.source()).get_all_pages().await?;
//! assert_eq!(items.len(), 3);
//! assert_eq!(pages.fetch_count(), 2);
//! # Ok(())
//! # }
//! ```

mod scripted_pages;

pub use scripted_pages::ScriptedPages;
