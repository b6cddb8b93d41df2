use bookfinder_common::{CatalogRecord, Result};
use bookfinder_llm::LlmClient;
use futures::stream::{self, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::{EmbeddingEntry, IndexSnapshot};

/// Concurrent embedding requests during a build
const DEFAULT_EMBED_CONCURRENCY: usize = 4;

/// Digest of the text an index would embed, plus the model name
///
/// Two corpora with the same fingerprint produce the same index.
pub fn corpus_fingerprint(embedding_model: &str, records: &[CatalogRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(embedding_model.as_bytes());
    for record in records {
        if let Some(text) = record.embedding_text() {
            hasher.update([0u8]);
            hasher.update(record.isbn.as_bytes());
            hasher.update([0u8]);
            hasher.update(text.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Builds index snapshots by embedding catalog records
pub struct IndexBuilder {
    llm_client: Arc<dyn LlmClient>,
    embedding_model: String,
    concurrency: usize,
}

impl IndexBuilder {
    /// Create new index builder
    pub fn new(llm_client: Arc<dyn LlmClient>, embedding_model: impl Into<String>) -> Self {
        Self {
            llm_client,
            embedding_model: embedding_model.into(),
            concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    /// Builder: concurrent embedding requests
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Embed free text with the index model
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.llm_client.embed(&self.embedding_model, text).await
    }

    /// Embed every described record into a fresh snapshot
    ///
    /// Records without a description are skipped. Any embedding failure
    /// fails the whole build. `progress` receives `(embedded, total)`.
    pub async fn build<F>(&self, records: Vec<CatalogRecord>, mut progress: F) -> Result<IndexSnapshot>
    where
        F: FnMut(usize, usize),
    {
        let fingerprint = corpus_fingerprint(&self.embedding_model, &records);
        let described: Vec<(CatalogRecord, String)> = records
            .into_iter()
            .filter_map(|record| record.embedding_text().map(|text| (record, text)))
            .collect();

        let total = described.len();
        info!(
            "Building index: {} described records, model {}",
            total, self.embedding_model
        );

        if total == 0 {
            return Ok(IndexSnapshot::empty(&self.embedding_model, fingerprint));
        }

        let client = &self.llm_client;
        let model = self.embedding_model.as_str();

        // `buffered` keeps submission order, so row i stays record i
        let mut embedded = stream::iter(described)
            .map(move |(record, text)| async move {
                let vector = client.embed(model, &text).await?;
                Ok::<_, bookfinder_common::BookFinderError>(EmbeddingEntry { record, vector })
            })
            .buffered(self.concurrency);

        let mut entries = Vec::with_capacity(total);
        while let Some(entry) = embedded.try_next().await? {
            debug!("Embedded {}", entry.record.isbn);
            entries.push(entry);
            progress(entries.len(), total);
        }

        let snapshot = IndexSnapshot::from_entries(&self.embedding_model, entries, fingerprint)?;
        info!(
            "Index built: {} entries, dimension {}",
            snapshot.len(),
            snapshot.dimension()
        );
        Ok(snapshot)
    }
}
