use super::{fetch_json, MetadataProvider};
use crate::identifier::Isbn;
use crate::normalizer::{normalize_optional, parse_year};
use crate::types::EnrichmentCandidate;
use async_trait::async_trait;
use bookfinder_common::Result;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const NAME: &str = "google_books";

/// Google Books volumes API
#[derive(Debug, Clone)]
pub struct GoogleBooksProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    /// Create new Google Books provider
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point the provider at another host (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn first_volume(&self, q: &str, max_results: Option<&str>) -> Result<Option<EnrichmentCandidate>> {
        let url = format!("{}/volumes", self.base_url);
        let mut query = vec![("q", q)];
        if let Some(max) = max_results {
            query.push(("maxResults", max));
        }
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key));
        }

        let response: VolumesResponse = fetch_json(&self.client, NAME, &url, &query).await?;
        Ok(response.into_candidate())
    }
}

#[async_trait]
impl MetadataProvider for GoogleBooksProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<EnrichmentCandidate>> {
        debug!("Google Books lookup: {}", isbn);
        self.first_volume(&format!("isbn:{}", isbn), None).await
    }

    fn supports_search(&self) -> bool {
        true
    }

    async fn search(&self, title: &str, author: &str) -> Result<Option<EnrichmentCandidate>> {
        debug!("Google Books search: {} / {}", title, author);
        let q = format!("{} {}", title, author);
        self.first_volume(q.trim(), Some("1")).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Default, Deserialize)]
struct Volume {
    #[serde(default, rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    published_date: Option<String>,
    publisher: Option<String>,
    description: Option<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Default, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: Option<String>,
    identifier: Option<String>,
}

impl VolumesResponse {
    fn into_candidate(self) -> Option<EnrichmentCandidate> {
        let info = self.items.into_iter().next()?.volume_info;

        let candidate = EnrichmentCandidate {
            isbn: info.preferred_isbn(),
            title: info.title,
            author: (!info.authors.is_empty()).then(|| info.authors.join(", ")),
            year: info.published_date.as_deref().and_then(parse_year),
            edition: None,
            publisher: info.publisher,
            description: normalize_optional(info.description.as_deref()),
            ..EnrichmentCandidate::new(NAME)
        }
        .cleaned();

        (!candidate.is_empty()).then_some(candidate)
    }
}

impl VolumeInfo {
    /// ISBN_13 first, then ISBN_10; identifiers that fail validation are skipped
    fn preferred_isbn(&self) -> Option<Isbn> {
        ["ISBN_13", "ISBN_10"].iter().find_map(|wanted| {
            self.industry_identifiers
                .iter()
                .filter(|id| id.kind.as_deref() == Some(*wanted))
                .find_map(|id| id.identifier.as_deref().and_then(|raw| Isbn::parse(raw).ok()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<EnrichmentCandidate> {
        serde_json::from_str::<VolumesResponse>(json).unwrap().into_candidate()
    }

    #[test]
    fn test_full_volume() {
        let candidate = parse(
            r#"{
                "totalItems": 1,
                "items": [{
                    "volumeInfo": {
                        "title": "Effective Java",
                        "authors": ["Joshua Bloch", "Someone Else"],
                        "publisher": "Addison-Wesley",
                        "publishedDate": "2018-01-06",
                        "description": "<p>The definitive guide</p>",
                        "industryIdentifiers": [
                            {"type": "ISBN_10", "identifier": "0134685997"},
                            {"type": "ISBN_13", "identifier": "9780134685991"}
                        ]
                    }
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(candidate.source, "google_books");
        assert_eq!(candidate.title.as_deref(), Some("Effective Java"));
        assert_eq!(candidate.author.as_deref(), Some("Joshua Bloch, Someone Else"));
        assert_eq!(candidate.year, Some(2018));
        assert_eq!(candidate.description.as_deref(), Some("The definitive guide"));
        assert_eq!(candidate.isbn.unwrap().as_str(), "9780134685991");
    }

    #[test]
    fn test_no_items() {
        assert_eq!(parse(r#"{"kind": "books#volumes", "totalItems": 0}"#), None);
    }

    #[test]
    fn test_sentinel_description_dropped() {
        let candidate = parse(
            r#"{"items": [{"volumeInfo": {"title": "T", "description": "Description not available"}}]}"#,
        )
        .unwrap();
        assert_eq!(candidate.description, None);
        assert_eq!(candidate.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_invalid_identifier_skipped() {
        let candidate = parse(
            r#"{"items": [{"volumeInfo": {
                "title": "T",
                "industryIdentifiers": [
                    {"type": "ISBN_13", "identifier": "not-an-isbn"},
                    {"type": "ISBN_10", "identifier": "0-306-40615-2"},
                    {"type": "OTHER", "identifier": "UOM:39015"}
                ]
            }}]}"#,
        )
        .unwrap();
        assert_eq!(candidate.isbn.unwrap().as_str(), "9780306406157");
    }

    #[test]
    fn test_empty_volume_info_is_none() {
        assert_eq!(parse(r#"{"items": [{}]}"#), None);
    }
}
