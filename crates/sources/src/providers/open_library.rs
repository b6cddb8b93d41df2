use super::{fetch_json, MetadataProvider};
use crate::identifier::Isbn;
use crate::normalizer::{normalize_optional, parse_year};
use crate::types::EnrichmentCandidate;
use async_trait::async_trait;
use bookfinder_common::Result;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
const NAME: &str = "open_library";

/// Open Library books API (`jscmd=data`)
#[derive(Debug, Clone)]
pub struct OpenLibraryProvider {
    client: Client,
    base_url: String,
}

impl OpenLibraryProvider {
    /// Create new Open Library provider
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Bibkeys to ask for, canonical first; older editions are often only
/// indexed under their ISBN-10
fn bibkeys(isbn: &Isbn) -> Vec<String> {
    let mut keys = vec![format!("ISBN:{}", isbn)];
    if let Some(isbn10) = isbn.to_isbn10() {
        keys.push(format!("ISBN:{}", isbn10));
    }
    keys
}

#[async_trait]
impl MetadataProvider for OpenLibraryProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<EnrichmentCandidate>> {
        debug!("Open Library lookup: {}", isbn);

        let url = format!("{}/api/books", self.base_url);
        let keys = bibkeys(isbn);
        let joined = keys.join(",");
        let query = [("bibkeys", joined.as_str()), ("format", "json"), ("jscmd", "data")];

        let mut response: HashMap<String, OpenLibraryBook> =
            fetch_json(&self.client, NAME, &url, &query).await?;

        Ok(keys
            .iter()
            .find_map(|key| response.remove(key))
            .and_then(|book| book.into_candidate(isbn)))
    }
}

#[derive(Debug, Default, Deserialize)]
struct OpenLibraryBook {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<NamedEntity>,
    publish_date: Option<String>,
    #[serde(default)]
    publishers: Vec<NamedEntity>,
    edition_name: Option<String>,
    description: Option<Description>,
}

#[derive(Debug, Default, Deserialize)]
struct NamedEntity {
    name: Option<String>,
}

/// Either a plain string or `{ "type": "/type/text", "value": "..." }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Description {
    Text(String),
    Typed { value: Option<String> },
}

impl Description {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Typed { value } => value.as_deref(),
        }
    }
}

fn join_names(entities: &[NamedEntity]) -> Option<String> {
    let names: Vec<&str> = entities
        .iter()
        .filter_map(|e| e.name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

impl OpenLibraryBook {
    fn into_candidate(self, isbn: &Isbn) -> Option<EnrichmentCandidate> {
        let candidate = EnrichmentCandidate {
            isbn: Some(isbn.clone()),
            author: join_names(&self.authors),
            publisher: join_names(&self.publishers),
            year: self.publish_date.as_deref().and_then(parse_year),
            description: self
                .description
                .as_ref()
                .and_then(|d| normalize_optional(d.as_str())),
            title: self.title,
            edition: self.edition_name,
            ..EnrichmentCandidate::new(NAME)
        }
        .cleaned();

        let has_content = candidate.title.is_some()
            || candidate.author.is_some()
            || candidate.description.is_some()
            || candidate.publisher.is_some()
            || candidate.year.is_some();
        has_content.then_some(candidate)
    }
}
