use bookfinder_common::{BookFinderError, CatalogRecord, Result};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::similarity::{l2_normalize, score_rows, top_k};

/// Persisted index format version
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// A catalog record paired with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub record: CatalogRecord,
    pub vector: Vec<f32>,
}

/// Row position and similarity of one nearest neighbor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub similarity: f32,
}

/// Nearest-neighbor hit resolved to its record
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub record: CatalogRecord,
    /// Cosine similarity (-1.0 to 1.0)
    pub similarity: f32,
}

/// Immutable, fully built index
///
/// Row `i` of `matrix` is the unit-length embedding of `records[i]`.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    embedding_model: String,
    dimension: usize,
    records: Vec<CatalogRecord>,
    matrix: Array2<f32>,
    built_at: DateTime<Utc>,
    fingerprint: String,
}

impl IndexSnapshot {
    /// Build a snapshot from raw embeddings
    ///
    /// Fails when vectors disagree on dimension.
    pub fn from_entries(
        embedding_model: impl Into<String>,
        entries: Vec<EmbeddingEntry>,
        fingerprint: impl Into<String>,
    ) -> Result<Self> {
        Self::assemble(embedding_model.into(), entries, fingerprint.into(), Utc::now())
    }

    fn assemble(
        embedding_model: String,
        entries: Vec<EmbeddingEntry>,
        fingerprint: String,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(BookFinderError::vector_search(format!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.record.isbn,
                dimension,
                bad.vector.len()
            )));
        }

        let mut flat = Vec::with_capacity(entries.len() * dimension);
        let mut records = Vec::with_capacity(entries.len());
        for EmbeddingEntry { record, mut vector } in entries {
            l2_normalize(&mut vector);
            flat.extend_from_slice(&vector);
            records.push(record);
        }

        let matrix = Array2::from_shape_vec((records.len(), dimension), flat)
            .map_err(|e| BookFinderError::vector_search(format!("Failed to shape index matrix: {}", e)))?;

        Ok(Self {
            embedding_model,
            dimension,
            records,
            matrix,
            built_at,
            fingerprint,
        })
    }

    /// Snapshot with no rows
    pub fn empty(embedding_model: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            dimension: 0,
            records: Vec::new(),
            matrix: Array2::zeros((0, 0)),
            built_at: Utc::now(),
            fingerprint: fingerprint.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Digest of the corpus the snapshot was built from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Exact cosine top-K over every row
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(BookFinderError::vector_search(format!(
                "Query dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut unit = vector.to_vec();
        l2_normalize(&mut unit);
        let scores = score_rows(self.matrix.view(), &unit).to_vec();

        Ok(top_k(&scores, k)
            .into_iter()
            .map(|n| IndexHit {
                record: self.records[n.position].clone(),
                similarity: n.similarity,
            })
            .collect())
    }

    pub(crate) fn to_persisted(&self) -> PersistedIndex {
        PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension,
            built_at: self.built_at,
            fingerprint: self.fingerprint.clone(),
            entries: self
                .records
                .iter()
                .zip(self.matrix.rows())
                .map(|(record, row)| EmbeddingEntry {
                    record: record.clone(),
                    vector: row.to_vec(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_persisted(persisted: PersistedIndex) -> Result<Self> {
        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(BookFinderError::vector_search(format!(
                "Unsupported index format version {}",
                persisted.version
            )));
        }

        let snapshot = Self::assemble(
            persisted.embedding_model,
            persisted.entries,
            persisted.fingerprint,
            persisted.built_at,
        )?;

        if !snapshot.is_empty() && snapshot.dimension != persisted.dimension {
            return Err(BookFinderError::vector_search(format!(
                "Index header dimension {} does not match stored vectors ({})",
                persisted.dimension, snapshot.dimension
            )));
        }

        Ok(snapshot)
    }
}

/// On-disk index layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedIndex {
    pub version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub fingerprint: String,
    pub entries: Vec<EmbeddingEntry>,
}

/// One discovery result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub record: CatalogRecord,

    /// Cosine similarity clamped to 0.0 - 1.0
    pub similarity: f32,

    /// Similarity as a rounded percentage
    pub match_percent: u8,

    /// Position assigned by the reranker (0 = best)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_position: Option<usize>,

    /// Reranker's reason for the pick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    /// Reranker's own relevance score (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<u8>,
}

impl RankedResult {
    /// Result from a raw index hit, before any reranking
    pub fn from_hit(hit: IndexHit) -> Self {
        let similarity = if hit.similarity.is_finite() {
            hit.similarity.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            record: hit.record,
            similarity,
            match_percent: (similarity * 100.0).round() as u8,
            rerank_position: None,
            explanation: None,
            rerank_score: None,
        }
    }
}
