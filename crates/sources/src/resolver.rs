//! Fallback-chained enrichment across metadata providers

use crate::identifier::Isbn;
use crate::normalizer::primary_author;
use crate::providers::{default_providers, http_client, MetadataProvider};
use crate::types::{
    EnrichmentCandidate, LookupMode, LookupQuery, ProviderOutcome, ProviderReport, ResolvedRecord,
};
use bookfinder_common::{AppConfig, Result};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Batch progress is logged every this many completed records
const PROGRESS_LOG_INTERVAL: usize = 500;

/// Default bound on concurrently resolving records
pub const DEFAULT_MAX_CONCURRENCY: usize = 30;

/// Queries an ordered provider chain and merges the answers
#[derive(Clone)]
pub struct SourceResolver {
    providers: Vec<Arc<dyn MetadataProvider>>,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl SourceResolver {
    /// Create new resolver over providers in priority order
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>, call_timeout: Duration) -> Self {
        Self {
            providers,
            call_timeout,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Builder: bound on concurrently resolving records in a batch
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Resolver over the default HTTP providers
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = http_client(config.provider_timeout())?;
        let providers = default_providers(client, config.google_books_api_key.clone());

        info!(
            "Source resolver initialized: {} providers, timeout {:?}, concurrency {}",
            providers.len(),
            config.provider_timeout(),
            config.max_concurrent_lookups
        );

        Ok(Self::new(providers, config.provider_timeout())
            .with_max_concurrency(config.max_concurrent_lookups))
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Resolve one record through the fallback chain
    ///
    /// Never fails: providers that error or time out count as "no data".
    /// An all-`None` record means nothing was found.
    pub async fn resolve(&self, query: &LookupQuery) -> ResolvedRecord {
        let mut record = ResolvedRecord {
            isbn: query.isbn.clone(),
            ..Default::default()
        };

        if let Some(isbn) = &query.isbn {
            self.run_identifier_chain(isbn, &mut record).await;
        }

        if !record.has_description() && query.can_search() {
            if let Some(title) = &query.title {
                self.run_search_chain(
                    title,
                    query.author.as_deref(),
                    query.isbn.is_none(),
                    &mut record,
                )
                .await;
            }
        }

        debug!(
            "Resolved {}: description={} ({} provider calls)",
            record.isbn.as_ref().map(Isbn::as_str).unwrap_or("<no isbn>"),
            record.description_source.as_deref().unwrap_or("none"),
            record.reports.len()
        );

        record
    }

    async fn run_identifier_chain(&self, isbn: &Isbn, record: &mut ResolvedRecord) {
        for (rank, provider) in self.providers.iter().enumerate() {
            let mode = LookupMode::Identifier;
            let outcome = self.call(provider.as_ref(), mode, provider.lookup(isbn)).await;
            if let Some(candidate) = self.record_outcome(provider.as_ref(), rank, mode, outcome, record) {
                record.absorb(candidate, false);
            }

            if record.is_complete() {
                break;
            }
        }
    }

    async fn run_search_chain(
        &self,
        title: &str,
        author: Option<&str>,
        adopt_isbn: bool,
        record: &mut ResolvedRecord,
    ) {
        let author = author
            .map(|a| primary_author(a).unwrap_or_else(|| a.trim().to_string()))
            .unwrap_or_default();

        for (rank, provider) in self.providers.iter().enumerate() {
            if !provider.supports_search() {
                continue;
            }

            let mode = LookupMode::Search;
            let outcome = self.call(provider.as_ref(), mode, provider.search(title, &author)).await;
            if let Some(candidate) = self.record_outcome(provider.as_ref(), rank, mode, outcome, record) {
                record.absorb_description(candidate, adopt_isbn);
            }

            if record.has_description() {
                break;
            }
        }
    }

    /// Run one provider call under the per-call timeout
    async fn call<F>(&self, provider: &dyn MetadataProvider, mode: LookupMode, fut: F) -> ProviderOutcome
    where
        F: Future<Output = Result<Option<EnrichmentCandidate>>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Err(_) => {
                warn!("Provider {} timed out after {:?} ({:?})", provider.name(), self.call_timeout, mode);
                ProviderOutcome::TimedOut
            }
            Ok(Err(e)) => {
                warn!("Provider {} failed ({:?}): {}", provider.name(), mode, e);
                ProviderOutcome::Failed(e.to_string())
            }
            Ok(Ok(Some(candidate))) if !candidate.is_empty() => {
                debug!("Provider {} found data ({:?})", provider.name(), mode);
                ProviderOutcome::Found(candidate)
            }
            Ok(Ok(_)) => {
                debug!("Provider {} returned nothing ({:?})", provider.name(), mode);
                ProviderOutcome::Empty
            }
        }
    }

    /// Append the call's report and hand back the ranked candidate, if any
    fn record_outcome(
        &self,
        provider: &dyn MetadataProvider,
        rank: usize,
        mode: LookupMode,
        outcome: ProviderOutcome,
        record: &mut ResolvedRecord,
    ) -> Option<EnrichmentCandidate> {
        let kind = outcome.kind();
        let (candidate, detail) = match outcome {
            ProviderOutcome::Found(mut candidate) => {
                candidate.source = provider.name().to_string();
                candidate.rank = rank;
                (Some(candidate), None)
            }
            ProviderOutcome::Failed(reason) => (None, Some(reason)),
            ProviderOutcome::Empty | ProviderOutcome::TimedOut => (None, None),
        };

        record.reports.push(ProviderReport {
            provider: provider.name().to_string(),
            mode,
            outcome: kind,
            detail,
            description: candidate
                .as_ref()
                .is_some_and(|c| c.description.is_some()),
        });

        candidate
    }

    /// Resolve many records with bounded concurrency
    ///
    /// Results are returned in submission order. `progress` receives
    /// `(completed, total)` after every completion.
    pub async fn resolve_batch<F>(&self, queries: Vec<LookupQuery>, mut progress: F) -> Vec<ResolvedRecord>
    where
        F: FnMut(usize, usize),
    {
        let total = queries.len();
        let mut results: Vec<Option<ResolvedRecord>> = vec![None; total];

        info!(
            "Resolving batch of {} records with {} workers",
            total, self.max_concurrency
        );

        let this = self;
        let mut completions = stream::iter(queries.into_iter().enumerate())
            .map(move |(index, query)| async move { (index, this.resolve(&query).await) })
            .buffer_unordered(self.max_concurrency);

        let mut completed = 0;
        let mut with_description = 0;
        while let Some((index, record)) = completions.next().await {
            if record.has_description() {
                with_description += 1;
            }
            results[index] = Some(record);
            completed += 1;
            progress(completed, total);

            if completed % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "Batch progress: {}/{} ({} with description)",
                    completed, total, with_description
                );
            }
        }

        info!(
            "Batch complete: {}/{} records with description",
            with_description, total
        );

        results.into_iter().map(Option::unwrap_or_default).collect()
    }
}
