use bookfinder_catalog::CatalogStore;
use bookfinder_common::{AppConfig, Result};
use bookfinder_llm::{LlmClient, LlmReranker, OllamaClient, Reranker};
use bookfinder_sources::SourceResolver;
use bookfinder_vector::{EmbeddingIndex, IndexBuilder, Retriever};
use std::sync::Arc;
use tracing::{info, warn};

use crate::workflow::SyncWorkflow;

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Sync and index workflows
    pub workflow: Arc<SyncWorkflow>,

    /// Discovery over the installed index
    pub retriever: Arc<Retriever>,

    /// Embedding and generation backend
    pub llm_client: Arc<dyn LlmClient>,
}

impl AppState {
    /// Create application state with the HTTP providers and Ollama
    ///
    /// The persisted index is loaded when present; a missing or unusable
    /// index leaves discovery unavailable until the next rebuild.
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.ensure_directories()?;

        let catalog = CatalogStore::connect(&config.catalog_db_path).await?;
        let resolver = SourceResolver::from_config(&config)?;
        let llm_client: Arc<dyn LlmClient> = Arc::new(
            OllamaClient::with_timeout(&config.ollama_base_url, config.rerank_timeout())?,
        );

        let reranker: Option<Arc<dyn Reranker>> = if config.rerank_enabled {
            Some(Arc::new(LlmReranker::new(llm_client.clone(), &config.rerank_model)))
        } else {
            None
        };

        let state = Self::from_parts(config, catalog, resolver, llm_client, reranker);

        match state.workflow.load_index().await {
            Ok(true) => {}
            Ok(false) => info!("No usable index on disk; discovery needs an index rebuild"),
            Err(e) => warn!("Failed to load persisted index: {}", e),
        }

        Ok(state)
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: AppConfig,
        catalog: CatalogStore,
        resolver: SourceResolver,
        llm_client: Arc<dyn LlmClient>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        let index = Arc::new(EmbeddingIndex::new());
        let builder = Arc::new(IndexBuilder::new(llm_client.clone(), &config.embedding_model));

        let mut retriever = Retriever::new(index.clone(), builder.clone())
            .with_rerank_timeout(config.rerank_timeout())
            .with_default_top_k(config.default_top_k);
        if let Some(reranker) = reranker {
            retriever = retriever.with_reranker(reranker);
        }

        let workflow = SyncWorkflow::new(
            resolver,
            catalog,
            builder,
            index,
            config.vector_index_path.clone(),
        );

        info!(
            "Application state ready: embedding model {}, rerank {}",
            config.embedding_model,
            if retriever.has_reranker() { "on" } else { "off" }
        );

        Self {
            config,
            workflow: Arc::new(workflow),
            retriever: Arc::new(retriever),
            llm_client,
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        self.workflow.catalog()
    }
}
