use super::{fetch_json, MetadataProvider};
use crate::identifier::Isbn;
use crate::normalizer::{normalize_text, plausible_year};
use crate::types::EnrichmentCandidate;
use async_trait::async_trait;
use bookfinder_common::Result;
use reqwest::Client;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openalex.org";
const NAME: &str = "open_alex";

/// Number of concepts used for the keyword fallback
const MAX_KEYWORDS: usize = 10;

/// OpenAlex works API
#[derive(Debug, Clone)]
pub struct OpenAlexProvider {
    client: Client,
    base_url: String,
}

impl OpenAlexProvider {
    /// Create new OpenAlex provider
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

#[async_trait]
impl MetadataProvider for OpenAlexProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<EnrichmentCandidate>> {
        debug!("OpenAlex lookup: {}", isbn);

        let url = format!("{}/works", self.base_url);
        let filter = format!("ids.isbn:{}", isbn);
        let response: WorksResponse =
            fetch_json(&self.client, NAME, &url, &[("filter", filter.as_str())]).await?;

        Ok(response
            .results
            .into_iter()
            .next()
            .and_then(|work| work.into_candidate(isbn)))
    }
}

/// Rebuild abstract text from OpenAlex's inverted index
///
/// `{"the": [0, 2], "cat": [1]}` becomes `"the cat the"`.
pub fn reconstruct_abstract(inverted_index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, &str)> = inverted_index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |pos| (*pos, word.as_str())))
        .collect();

    if positioned.is_empty() {
        return None;
    }

    positioned.sort_unstable();
    Some(
        positioned
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

#[derive(Debug, Default, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Default, Deserialize)]
struct Work {
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    concepts: Vec<Concept>,
}

#[derive(Debug, Default, Deserialize)]
struct Authorship {
    #[serde(default)]
    author: AuthorRef,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorRef {
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Concept {
    display_name: Option<String>,
    #[serde(default)]
    score: f64,
}

impl Work {
    fn description(&self) -> Option<String> {
        if let Some(text) = self
            .abstract_inverted_index
            .as_ref()
            .and_then(reconstruct_abstract)
            .and_then(|raw| normalize_text(&raw))
        {
            return Some(text);
        }

        let mut concepts: Vec<&Concept> = self
            .concepts
            .iter()
            .filter(|c| c.display_name.as_deref().is_some_and(|n| !n.trim().is_empty()))
            .collect();
        if concepts.is_empty() {
            return None;
        }

        concepts.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let keywords: Vec<&str> = concepts
            .iter()
            .take(MAX_KEYWORDS)
            .filter_map(|c| c.display_name.as_deref())
            .map(str::trim)
            .collect();

        Some(format!("Keywords: {}", keywords.join(", ")))
    }

    fn into_candidate(self, isbn: &Isbn) -> Option<EnrichmentCandidate> {
        let description = self.description();
        let authors: Vec<String> = self
            .authorships
            .into_iter()
            .filter_map(|a| a.author.display_name)
            .collect();

        let candidate = EnrichmentCandidate {
            isbn: Some(isbn.clone()),
            title: self.title.or(self.display_name),
            author: (!authors.is_empty()).then(|| authors.join(", ")),
            year: self.publication_year.and_then(plausible_year),
            description,
            ..EnrichmentCandidate::new(NAME)
        }
        .cleaned();

        let has_content =
            candidate.title.is_some() || candidate.author.is_some() || candidate.description.is_some();
        has_content.then_some(candidate)
    }
}
