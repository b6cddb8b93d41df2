//! Book Finder catalog
//!
//! SQLite-backed reconciliation store: identifier-keyed coalesce upserts
//! plus the read-side queries used by the API and CLI.

mod stats;
mod store;

pub use stats::{AuthorCount, CatalogStats, LengthStats, YearRange, TOP_AUTHOR_COUNT};
pub use store::{CatalogStore, UpsertOutcome, MAX_LIST_LIMIT};
