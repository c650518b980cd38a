//! Listing and directory reconstruction
//!
//! Converts flat key enumeration into a virtual directory hierarchy,
//! merges incremental pages behind a continuation cursor, keeps a
//! per-profile cache for instant redisplay, and provides the
//! filtered/sorted/paged views the UI consumes.

pub mod cache;
pub mod engine;
pub mod view;

pub use cache::ListingCache;
pub use engine::{derive_directories, ListingEngine};
pub use view::{build_view, SelectionState, SortKey, SortOrder, ViewPage, ViewQuery, ROOT};
