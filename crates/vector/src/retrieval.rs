use bookfinder_common::Result;
use bookfinder_llm::{RerankCandidate, RerankDecision, Reranker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::builder::IndexBuilder;
use crate::index::EmbeddingIndex;
use crate::types::RankedResult;

/// Default number of retrieved candidates
pub const DEFAULT_TOP_K: usize = 20;

/// Default bound on one rerank call
pub const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_secs(30);

/// A meaning-based search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub query: String,
    /// Candidates to retrieve (defaults to the configured top-K)
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Whether to rerank (defaults to on when a reranker is configured)
    #[serde(default)]
    pub rerank: Option<bool>,
}

impl DiscoveryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = Some(rerank);
        self
    }
}

/// Embeds a query, retrieves neighbors and optionally reranks them
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    builder: Arc<IndexBuilder>,
    reranker: Option<Arc<dyn Reranker>>,
    rerank_timeout: Duration,
    default_top_k: usize,
}

impl Retriever {
    /// Create new retriever
    ///
    /// Queries are embedded through `builder` so they share the index model.
    pub fn new(index: Arc<EmbeddingIndex>, builder: Arc<IndexBuilder>) -> Self {
        Self {
            index,
            builder,
            reranker: None,
            rerank_timeout: DEFAULT_RERANK_TIMEOUT,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_rerank_timeout(mut self, timeout: Duration) -> Self {
        self.rerank_timeout = timeout;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.max(1);
        self
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Run a discovery request
    ///
    /// Blank queries return nothing. Reranking problems never fail the
    /// request; the similarity order is kept instead.
    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<RankedResult>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.index.snapshot().await?;
        if snapshot.is_empty() {
            debug!("Discovery on an empty index");
            return Ok(Vec::new());
        }

        let top_k = request.top_k.filter(|k| *k > 0).unwrap_or(self.default_top_k);
        let vector = self.builder.embed_query(query).await?;
        let results: Vec<RankedResult> = snapshot
            .query(&vector, top_k)?
            .into_iter()
            .map(RankedResult::from_hit)
            .collect();

        info!("Discovery '{}': {} candidates", query, results.len());

        let wants_rerank = request.rerank.unwrap_or(true);
        match (&self.reranker, wants_rerank) {
            (Some(reranker), true) if !results.is_empty() => {
                Ok(self.apply_rerank(reranker.as_ref(), query, results).await)
            }
            _ => Ok(results),
        }
    }

    async fn apply_rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        results: Vec<RankedResult>,
    ) -> Vec<RankedResult> {
        let candidates: Vec<RerankCandidate> = results
            .iter()
            .map(|r| RerankCandidate {
                title: r.record.title.clone().unwrap_or_default(),
                author: r.record.author.clone(),
                description: r.record.description.clone().unwrap_or_default(),
            })
            .collect();

        match tokio::time::timeout(self.rerank_timeout, reranker.rerank(query, &candidates)).await {
            Ok(Ok(decisions)) if !decisions.is_empty() => merge_rerank(results, decisions),
            Ok(Ok(_)) => {
                warn!("Reranker returned no picks; keeping similarity order");
                results
            }
            Ok(Err(e)) => {
                warn!("Rerank unavailable, keeping similarity order: {}", e);
                results
            }
            Err(_) => {
                warn!(
                    "Rerank timed out after {:?}; keeping similarity order",
                    self.rerank_timeout
                );
                results
            }
        }
    }
}

/// Reranked picks first in the reranker's order, then the rest by similarity
///
/// Invalid or repeated indices are ignored.
pub fn merge_rerank(results: Vec<RankedResult>, decisions: Vec<RerankDecision>) -> Vec<RankedResult> {
    let mut slots: Vec<Option<RankedResult>> = results.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(slots.len());

    for decision in decisions {
        let Some(mut result) = slots.get_mut(decision.index).and_then(Option::take) else {
            continue;
        };
        result.rerank_position = Some(merged.len());
        result.explanation = decision.explanation;
        result.rerank_score = decision.match_score;
        merged.push(result);
    }

    merged.extend(slots.into_iter().flatten());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmbeddingEntry, IndexSnapshot};
    use async_trait::async_trait;
    use bookfinder_common::{BookFinderError, CatalogRecord};
    use bookfinder_llm::{GenerateRequest, LlmClient};

    struct AxisEmbedder;

    #[async_trait]
    impl LlmClient for AxisEmbedder {
        async fn generate(&self, _request: GenerateRequest) -> Result<String> {
            Err(BookFinderError::llm("unused"))
        }

        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
            Ok(match text {
                "first" => vec![1.0, 0.0],
                "second" => vec![0.0, 1.0],
                _ => vec![0.8, 0.6],
            })
        }

        async fn test_connection(&self) -> Result<bool> {
            Ok(true)
        }
    }

    enum RerankBehavior {
        Picks(Vec<usize>),
        Fail,
        Hang,
    }

    struct FakeReranker(RerankBehavior);

    #[async_trait]
    impl Reranker for FakeReranker {
        async fn rerank(&self, _query: &str, _candidates: &[RerankCandidate]) -> Result<Vec<RerankDecision>> {
            match &self.0 {
                RerankBehavior::Picks(indices) => Ok(indices
                    .iter()
                    .map(|&index| RerankDecision {
                        index,
                        explanation: Some(format!("pick {}", index)),
                        match_score: Some(90),
                    })
                    .collect()),
                RerankBehavior::Fail => Err(BookFinderError::rerank("bad json")),
                RerankBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn record(isbn: &str) -> CatalogRecord {
        CatalogRecord {
            title: Some(format!("Title {}", isbn)),
            description: Some("desc".to_string()),
            ..CatalogRecord::new(isbn)
        }
    }

    async fn retriever() -> Retriever {
        let index = Arc::new(EmbeddingIndex::new());
        let snapshot = IndexSnapshot::from_entries(
            "m",
            vec![
                EmbeddingEntry { record: record("a"), vector: vec![1.0, 0.0] },
                EmbeddingEntry { record: record("b"), vector: vec![0.0, 1.0] },
                EmbeddingEntry { record: record("c"), vector: vec![0.7, 0.7] },
            ],
            "fp",
        )
        .unwrap();
        index.install(snapshot).await;

        let builder = Arc::new(IndexBuilder::new(Arc::new(AxisEmbedder), "m"));
        Retriever::new(index, builder).with_rerank_timeout(Duration::from_millis(100))
    }

    fn isbns(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.record.isbn.as_str()).collect()
    }

    #[tokio::test]
    async fn test_similarity_order() {
        let results = retriever().await.discover(&DiscoveryRequest::new("first")).await.unwrap();
        assert_eq!(isbns(&results), vec!["a", "c", "b"]);
        assert_eq!(results[0].match_percent, 100);
        assert_eq!(results[2].match_percent, 0);
        assert!(results.iter().all(|r| r.rerank_position.is_none()));
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let request = DiscoveryRequest::new("first").with_top_k(1);
        let results = retriever().await.discover(&request).await.unwrap();
        assert_eq!(isbns(&results), vec!["a"]);
    }

    #[tokio::test]
    async fn test_blank_query_is_empty() {
        let results = retriever().await.discover(&DiscoveryRequest::new("   ")).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_index() {
        let builder = Arc::new(IndexBuilder::new(Arc::new(AxisEmbedder), "m"));
        let retriever = Retriever::new(Arc::new(EmbeddingIndex::new()), builder);

        let err = retriever.discover(&DiscoveryRequest::new("first")).await.unwrap_err();
        assert!(matches!(err, BookFinderError::IndexNotReady));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = Arc::new(EmbeddingIndex::new());
        index.install(IndexSnapshot::empty("m", "fp")).await;
        let builder = Arc::new(IndexBuilder::new(Arc::new(AxisEmbedder), "m"));

        let results = Retriever::new(index, builder)
            .discover(&DiscoveryRequest::new("first"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_rerank_picks_lead_then_similarity_order() {
        let retriever = retriever()
            .await
            .with_reranker(Arc::new(FakeReranker(RerankBehavior::Picks(vec![2, 9, 2]))));

        let results = retriever.discover(&DiscoveryRequest::new("first")).await.unwrap();
        // Candidates were [a, c, b]; index 2 is b
        assert_eq!(isbns(&results), vec!["b", "a", "c"]);
        assert_eq!(results[0].rerank_position, Some(0));
        assert_eq!(results[0].explanation.as_deref(), Some("pick 2"));
        assert_eq!(results[0].rerank_score, Some(90));
        assert_eq!(results[1].rerank_position, None);
    }

    #[tokio::test]
    async fn test_rerank_failures_keep_similarity_order() {
        let baseline = retriever().await.discover(&DiscoveryRequest::new("first")).await.unwrap();

        for behavior in [RerankBehavior::Fail, RerankBehavior::Hang, RerankBehavior::Picks(Vec::new())] {
            let retriever = retriever().await.with_reranker(Arc::new(FakeReranker(behavior)));
            let results = retriever.discover(&DiscoveryRequest::new("first")).await.unwrap();
            assert_eq!(results, baseline);
        }
    }

    #[tokio::test]
    async fn test_rerank_can_be_disabled_per_request() {
        let retriever = retriever()
            .await
            .with_reranker(Arc::new(FakeReranker(RerankBehavior::Picks(vec![2]))));

        let request = DiscoveryRequest::new("first").with_rerank(false);
        let results = retriever.discover(&request).await.unwrap();
        assert_eq!(isbns(&results), vec!["a", "c", "b"]);
    }
}
