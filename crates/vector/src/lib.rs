//! Book Finder Semantic Retrieval
//!
//! Embedding index over described catalog records, top-K cosine search
//! and optional LLM reranking

mod builder;
mod index;
mod retrieval;
pub mod similarity;
mod types;

pub use builder::{corpus_fingerprint, IndexBuilder};
pub use index::{save_snapshot, EmbeddingIndex};
pub use retrieval::{merge_rerank, DiscoveryRequest, Retriever, DEFAULT_RERANK_TIMEOUT, DEFAULT_TOP_K};
pub use types::{EmbeddingEntry, IndexHit, IndexSnapshot, Neighbor, RankedResult, INDEX_FORMAT_VERSION};
