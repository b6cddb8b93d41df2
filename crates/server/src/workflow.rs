use bookfinder_catalog::CatalogStore;
use bookfinder_common::{BookFinderError, CatalogRecord, Result};
use bookfinder_sources::{Isbn, LookupQuery, ResolvedRecord, SourceResolver};
use bookfinder_vector::{corpus_fingerprint, save_snapshot, EmbeddingIndex, IndexBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::{BatchFailure, BatchReport, RebuildReport, SyncOutcome, SyncRequest};

/// Orchestrates resolution, catalog writes and index rebuilds
pub struct SyncWorkflow {
    resolver: SourceResolver,
    catalog: CatalogStore,
    builder: Arc<IndexBuilder>,
    index: Arc<EmbeddingIndex>,
    index_path: PathBuf,
    rebuild_lock: Mutex<()>,
}

impl SyncWorkflow {
    /// Create new workflow
    pub fn new(
        resolver: SourceResolver,
        catalog: CatalogStore,
        builder: Arc<IndexBuilder>,
        index: Arc<EmbeddingIndex>,
        index_path: PathBuf,
    ) -> Self {
        Self {
            resolver,
            catalog,
            builder,
            index,
            index_path,
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Resolve one request through the providers and store the result
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncOutcome> {
        let query = lookup_query(request)?;
        let resolved = self.resolver.resolve(&query).await;
        self.store(request, &query, resolved).await
    }

    /// Synchronize many requests with bounded provider concurrency
    ///
    /// Invalid requests and per-record failures are reported, never fatal.
    /// `progress` receives `(resolved, total)` for the valid requests.
    pub async fn sync_batch<F>(&self, requests: Vec<SyncRequest>, progress: F) -> BatchReport
    where
        F: FnMut(usize, usize),
    {
        let mut report = BatchReport {
            total: requests.len(),
            ..Default::default()
        };

        let mut accepted = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            match lookup_query(&request) {
                Ok(query) => accepted.push((index, request, query)),
                Err(e) => report.failures.push(failure(index, &request, &e)),
            }
        }

        let queries = accepted.iter().map(|(_, _, query)| query.clone()).collect();
        let resolved = self.resolver.resolve_batch(queries, progress).await;

        for ((index, request, query), record) in accepted.into_iter().zip(resolved) {
            match self.store(&request, &query, record).await {
                Ok(outcome) if !outcome.stored => report.unmatched += 1,
                Ok(outcome) => {
                    report.synced += 1;
                    if outcome.description_found {
                        report.with_description += 1;
                    }
                }
                Err(e) => {
                    warn!("Batch record {} not stored: {}", index, e);
                    report.failures.push(failure(index, &request, &e));
                }
            }
        }

        report.failures.sort_by_key(|f| f.index);
        info!(
            "Batch sync finished: {}/{} stored, {} with description, {} unmatched, {} failures",
            report.synced,
            report.total,
            report.with_description,
            report.unmatched,
            report.failures.len()
        );
        report
    }

    async fn store(
        &self,
        request: &SyncRequest,
        query: &LookupQuery,
        resolved: ResolvedRecord,
    ) -> Result<SyncOutcome> {
        let Some(record) = merge_record(request, query, &resolved) else {
            info!(
                "No ISBN found for '{}' by {}; nothing stored",
                query.title.as_deref().unwrap_or_default(),
                query.author.as_deref().unwrap_or_default()
            );
            return Ok(SyncOutcome {
                record: request.caller_fields(""),
                description_found: false,
                created: false,
                stored: false,
                reports: resolved.reports,
            });
        };
        let outcome = self.catalog.upsert(&record).await?;

        info!(
            "Synced {} ({}, description: {})",
            outcome.record.isbn,
            if outcome.created { "new" } else { "merged" },
            resolved.description_source.as_deref().unwrap_or("none")
        );

        Ok(SyncOutcome {
            record: outcome.record,
            description_found: resolved.has_description(),
            created: outcome.created,
            stored: true,
            reports: resolved.reports,
        })
    }

    /// Rebuild the embedding index from the catalog
    ///
    /// Skipped when the installed index already covers the same corpus,
    /// unless `force` is set. The new snapshot is saved before it is
    /// installed; any failure leaves the current index in place.
    pub async fn rebuild_index<F>(&self, force: bool, progress: F) -> Result<RebuildReport>
    where
        F: FnMut(usize, usize),
    {
        let _guard = self.rebuild_lock.lock().await;

        let records = self.catalog.described_records().await?;
        let model = self.builder.embedding_model().to_string();
        let fingerprint = corpus_fingerprint(&model, &records);

        if !force {
            if let Ok(current) = self.index.snapshot().await {
                if current.fingerprint() == fingerprint {
                    info!("Index is current ({} entries); rebuild skipped", current.len());
                    return Ok(RebuildReport {
                        indexed: current.len(),
                        embedding_model: model,
                        rebuilt: false,
                    });
                }
            }
        }

        let snapshot = self.builder.build(records, progress).await?;
        save_snapshot(&snapshot, &self.index_path).await?;

        let indexed = snapshot.len();
        self.index.install(snapshot).await;

        Ok(RebuildReport {
            indexed,
            embedding_model: model,
            rebuilt: true,
        })
    }

    /// Load the persisted index, warning when the catalog has moved on
    pub async fn load_index(&self) -> Result<bool> {
        let loaded = self
            .index
            .load(&self.index_path, self.builder.embedding_model())
            .await?;

        if loaded {
            let records = self.catalog.described_records().await?;
            let fingerprint = corpus_fingerprint(self.builder.embedding_model(), &records);
            let snapshot = self.index.snapshot().await?;
            if snapshot.fingerprint() != fingerprint {
                warn!(
                    "Loaded index ({} entries) is older than the catalog ({} described records); run an index rebuild",
                    snapshot.len(),
                    records.len()
                );
            }
        }

        Ok(loaded)
    }
}

/// Validate a request into a resolver query
///
/// A present identifier must be valid. Without one, title and author are
/// both required.
pub fn lookup_query(request: &SyncRequest) -> Result<LookupQuery> {
    let isbn = Isbn::parse_optional(request.isbn.as_deref())?;
    let query = LookupQuery {
        isbn,
        ..Default::default()
    }
    .with_title_author(request.title.clone(), request.author.clone());

    if query.isbn.is_none() && !query.can_search() {
        return Err(BookFinderError::insufficient_input(
            "An ISBN or both title and author are required",
        ));
    }

    Ok(query)
}

/// Caller fields first, provider fields fill the gaps
///
/// `None` when there is no identifier to key the record by.
fn merge_record(
    request: &SyncRequest,
    query: &LookupQuery,
    resolved: &ResolvedRecord,
) -> Option<CatalogRecord> {
    let isbn = query.isbn.as_ref().or(resolved.isbn.as_ref())?;

    let mut record = request.caller_fields(isbn.as_str());
    fill(&mut record.title, &resolved.title);
    fill(&mut record.author, &resolved.author);
    if record.year.is_none() {
        record.year = resolved.year;
    }
    fill(&mut record.edition, &resolved.edition);
    fill(&mut record.publisher, &resolved.publisher);
    record.description = resolved.description.clone();

    Some(record)
}

fn fill(slot: &mut Option<String>, incoming: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn failure(index: usize, request: &SyncRequest, error: &BookFinderError) -> BatchFailure {
    BatchFailure {
        index,
        isbn: request.isbn.clone(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bookfinder_llm::{GenerateRequest, LlmClient};
    use bookfinder_sources::{EnrichmentCandidate, MetadataProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers lookups with fixed fields and counts calls
    struct StaticProvider {
        description: Option<&'static str>,
        search_isbn: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn new(description: Option<&'static str>) -> Self {
            Self {
                description,
                search_isbn: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn lookup(&self, _isbn: &Isbn) -> Result<Option<EnrichmentCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(EnrichmentCandidate {
                title: Some("Provider Title".to_string()),
                publisher: Some("Provider Press".to_string()),
                year: Some(2001),
                description: self.description.map(String::from),
                ..EnrichmentCandidate::new("static")
            }))
        }

        fn supports_search(&self) -> bool {
            true
        }

        async fn search(&self, _title: &str, _author: &str) -> Result<Option<EnrichmentCandidate>> {
            Ok(self.search_isbn.map(|isbn| EnrichmentCandidate {
                isbn: Isbn::parse(isbn).ok(),
                description: Some("Found by search".to_string()),
                ..EnrichmentCandidate::new("static")
            }))
        }
    }

    struct LengthEmbedder;

    #[async_trait]
    impl LlmClient for LengthEmbedder {
        async fn generate(&self, _request: GenerateRequest) -> Result<String> {
            Err(BookFinderError::llm("unused"))
        }

        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn test_connection(&self) -> Result<bool> {
            Ok(true)
        }
    }

    async fn workflow(provider: Arc<StaticProvider>, dir: &tempfile::TempDir) -> SyncWorkflow {
        let resolver = SourceResolver::new(vec![provider as Arc<dyn MetadataProvider>], Duration::from_secs(1));
        let builder = Arc::new(IndexBuilder::new(Arc::new(LengthEmbedder), "test-embed"));
        SyncWorkflow::new(
            resolver,
            CatalogStore::in_memory().await.unwrap(),
            builder,
            Arc::new(EmbeddingIndex::new()),
            dir.path().join("index.json"),
        )
    }

    #[tokio::test]
    async fn test_sync_caller_fields_win() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(Some("A book."))), &dir).await;

        let request = SyncRequest {
            title: Some("Caller Title".to_string()),
            ..SyncRequest::by_isbn("0-306-40615-2")
        };
        let outcome = workflow.sync(&request).await.unwrap();

        assert!(outcome.created);
        assert!(outcome.description_found);
        assert_eq!(outcome.record.isbn, "9780306406157");
        assert_eq!(outcome.record.title.as_deref(), Some("Caller Title"));
        assert_eq!(outcome.record.publisher.as_deref(), Some("Provider Press"));
        assert_eq!(outcome.record.year, Some(2001));
        assert_eq!(outcome.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(Some("A book."))), &dir).await;
        let request = SyncRequest::by_isbn("9780134685991");

        let first = workflow.sync(&request).await.unwrap();
        let second = workflow.sync(&request).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record, second.record);
        assert_eq!(workflow.catalog().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_keeps_stored_description_when_providers_have_none() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(None)), &dir).await;

        let mut stored = CatalogRecord::new("9780134685991");
        stored.description = Some("Earlier description".to_string());
        workflow.catalog().upsert(&stored).await.unwrap();

        let outcome = workflow.sync(&SyncRequest::by_isbn("9780134685991")).await.unwrap();
        assert!(!outcome.description_found);
        assert_eq!(outcome.record.description.as_deref(), Some("Earlier description"));
    }

    #[tokio::test]
    async fn test_sync_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StaticProvider::new(Some("A book.")));
        let workflow = workflow(provider.clone(), &dir).await;

        let err = workflow.sync(&SyncRequest::default()).await.unwrap_err();
        assert!(matches!(err, BookFinderError::InsufficientInput(_)));

        let err = workflow.sync(&SyncRequest::by_isbn("abc")).await.unwrap_err();
        assert!(matches!(err, BookFinderError::InvalidIdentifier(_)));

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sync_by_title_adopts_found_isbn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StaticProvider {
            search_isbn: Some("9780134685991"),
            ..StaticProvider::new(None)
        });
        let workflow = workflow(provider, &dir).await;

        let request = SyncRequest {
            title: Some("Effective Java".to_string()),
            author: Some("Joshua Bloch".to_string()),
            ..Default::default()
        };
        let outcome = workflow.sync(&request).await.unwrap();
        assert_eq!(outcome.record.isbn, "9780134685991");
        assert_eq!(outcome.record.description.as_deref(), Some("Found by search"));
    }

    #[tokio::test]
    async fn test_sync_by_title_without_isbn_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(None)), &dir).await;

        let request = SyncRequest {
            title: Some("Unknown".to_string()),
            author: Some("Nobody".to_string()),
            ..Default::default()
        };
        let outcome = workflow.sync(&request).await.unwrap();
        assert!(!outcome.stored);
        assert!(!outcome.created);
        assert!(!outcome.description_found);
        assert_eq!(outcome.record.title.as_deref(), Some("Unknown"));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(workflow.catalog().count().await.unwrap(), 0);

        let report = workflow.sync_batch(vec![request], |_, _| {}).await;
        assert_eq!(report.synced, 0);
        assert_eq!(report.unmatched, 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_failures_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(Some("A book."))), &dir).await;

        let requests = vec![
            SyncRequest::by_isbn("9780134685991"),
            SyncRequest::by_isbn("not-an-isbn"),
            SyncRequest::by_isbn("9780306406157"),
            SyncRequest::default(),
        ];

        let mut ticks = 0;
        let report = workflow.sync_batch(requests, |_, _| ticks += 1).await;

        assert_eq!(report.total, 4);
        assert_eq!(report.synced, 2);
        assert_eq!(report.with_description, 2);
        assert_eq!(ticks, 2);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_rebuild_skips_unchanged_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(Arc::new(StaticProvider::new(Some("A book."))), &dir).await;
        workflow.sync(&SyncRequest::by_isbn("9780134685991")).await.unwrap();

        let first = workflow.rebuild_index(false, |_, _| {}).await.unwrap();
        assert!(first.rebuilt);
        assert_eq!(first.indexed, 1);
        assert_eq!(first.embedding_model, "test-embed");

        let second = workflow.rebuild_index(false, |_, _| {}).await.unwrap();
        assert!(!second.rebuilt);

        let forced = workflow.rebuild_index(true, |_, _| {}).await.unwrap();
        assert!(forced.rebuilt);
    }

    #[tokio::test]
    async fn test_load_index_after_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StaticProvider::new(Some("A book.")));
        let workflow = workflow(provider.clone(), &dir).await;
        workflow.sync(&SyncRequest::by_isbn("9780134685991")).await.unwrap();
        workflow.rebuild_index(false, |_, _| {}).await.unwrap();

        let restarted = self::workflow(provider, &dir).await;
        assert!(restarted.load_index().await.unwrap());
        assert_eq!(restarted.index().len().await, 1);
    }
}
