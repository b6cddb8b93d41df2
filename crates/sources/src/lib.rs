//! Book Finder source reconciliation
//!
//! ISBN canonicalization, text normalization and the fallback-chained
//! metadata resolver over Google Books, Open Library and OpenAlex.

pub mod identifier;
pub mod normalizer;
pub mod providers;
mod resolver;
mod types;

pub use identifier::Isbn;
pub use normalizer::{normalize_text, parse_year};
pub use providers::{
    default_providers, http_client, reconstruct_abstract, GoogleBooksProvider, MetadataProvider,
    OpenAlexProvider, OpenLibraryProvider,
};
pub use resolver::{SourceResolver, DEFAULT_MAX_CONCURRENCY};
pub use types::{
    EnrichmentCandidate, LookupMode, LookupQuery, OutcomeKind, ProviderOutcome, ProviderReport,
    ResolvedRecord,
};
