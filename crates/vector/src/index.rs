use bookfinder_common::{BookFinderError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::{IndexHit, IndexSnapshot, PersistedIndex};

/// Shared handle to the current index snapshot
///
/// Readers clone the `Arc` and query without holding the lock; a rebuild
/// swaps in a complete snapshot, so a query never sees a partial index.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl EmbeddingIndex {
    /// Create an index with nothing installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot
    pub async fn install(&self, snapshot: IndexSnapshot) {
        info!(
            "Installing index: {} entries, model {}, dimension {}",
            snapshot.len(),
            snapshot.embedding_model(),
            snapshot.dimension()
        );
        *self.current.write().await = Some(Arc::new(snapshot));
    }

    /// Current snapshot, or `IndexNotReady` before the first build/load
    pub async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(BookFinderError::IndexNotReady)
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Number of indexed records (0 when not ready)
    pub async fn len(&self) -> usize {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Top-K nearest neighbors of an embedding
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.snapshot().await?.query(vector, k)
    }

    /// Write the current snapshot to disk
    ///
    /// The file is written next to the target and renamed into place.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await?;
        save_snapshot(&snapshot, path).await
    }

    /// Load a persisted snapshot and install it
    ///
    /// Returns `false` without installing when the file is missing or was
    /// built with a different embedding model.
    pub async fn load(&self, path: &Path, expected_model: &str) -> Result<bool> {
        if !tokio::fs::try_exists(path).await? {
            info!("No persisted index at {}", path.display());
            return Ok(false);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let persisted: PersistedIndex = serde_json::from_str(&data)?;

        if persisted.embedding_model != expected_model {
            warn!(
                "Persisted index at {} was built with model '{}' but '{}' is configured; rebuild required",
                path.display(),
                persisted.embedding_model,
                expected_model
            );
            return Ok(false);
        }

        let snapshot = IndexSnapshot::from_persisted(persisted)?;
        info!(
            "Loaded index from {} ({} entries, built {})",
            path.display(),
            snapshot.len(),
            snapshot.built_at()
        );
        self.install(snapshot).await;
        Ok(true)
    }
}

/// Serialize a snapshot to `path`
pub async fn save_snapshot(snapshot: &IndexSnapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let data = serde_json::to_vec(&snapshot.to_persisted())?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, data).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    info!("Index saved to {} ({} entries)", path.display(), snapshot.len());
    Ok(())
}
