//! External metadata providers
//!
//! Each provider deserializes its own JSON shape into serde structs with
//! every field optional, then converts at the edge into an
//! [`EnrichmentCandidate`].

mod google_books;
mod open_alex;
mod open_library;

pub use google_books::GoogleBooksProvider;
pub use open_alex::{reconstruct_abstract, OpenAlexProvider};
pub use open_library::OpenLibraryProvider;

use crate::identifier::Isbn;
use crate::types::EnrichmentCandidate;
use async_trait::async_trait;
use bookfinder_common::{BookFinderError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Common trait for metadata providers
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name used in reports and logs
    fn name(&self) -> &str;

    /// Look up a record by canonical identifier
    ///
    /// `Ok(None)` means the provider answered but knows nothing useful.
    async fn lookup(&self, isbn: &Isbn) -> Result<Option<EnrichmentCandidate>>;

    /// Whether [`MetadataProvider::search`] is implemented
    fn supports_search(&self) -> bool {
        false
    }

    /// Free-text search by title and author, returning the top hit
    async fn search(&self, _title: &str, _author: &str) -> Result<Option<EnrichmentCandidate>> {
        Ok(None)
    }
}

/// Build a shared HTTP client for providers
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bookfinder/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BookFinderError::network(format!("Failed to create HTTP client: {}", e)))
}

/// Default chain in priority order: Google Books, Open Library, OpenAlex
pub fn default_providers(
    client: Client,
    google_books_api_key: Option<String>,
) -> Vec<Arc<dyn MetadataProvider>> {
    vec![
        Arc::new(GoogleBooksProvider::new(client.clone(), google_books_api_key)),
        Arc::new(OpenLibraryProvider::new(client.clone())),
        Arc::new(OpenAlexProvider::new(client)),
    ]
}

/// GET a JSON document, mapping every failure to `ProviderUnavailable`
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| BookFinderError::provider(provider, format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BookFinderError::provider(provider, format!("HTTP {}", status)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| BookFinderError::provider(provider, format!("invalid response body: {}", e)))
}
