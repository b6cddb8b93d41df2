use bookfinder_common::CatalogRecord;
use bookfinder_sources::normalizer::{non_empty, plausible_year};
use bookfinder_sources::{parse_year, ProviderReport};
use bookfinder_vector::RankedResult;
use serde::{Deserialize, Serialize};

/// Publication year as sent by callers: `1999` or `"May 1999"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YearInput {
    Number(i64),
    Text(String),
}

impl YearInput {
    /// Plausible year, or `None` when the value cannot be read as one
    pub fn parse(&self) -> Option<i32> {
        match self {
            Self::Number(n) => i32::try_from(*n).ok().and_then(plausible_year),
            Self::Text(text) => parse_year(text),
        }
    }
}

/// Synchronization request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<YearInput>,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
}

impl SyncRequest {
    /// Identifier-only request
    pub fn by_isbn(isbn: impl Into<String>) -> Self {
        Self {
            isbn: Some(isbn.into()),
            ..Default::default()
        }
    }

    /// Caller-supplied fields as a record keyed by `isbn`
    pub fn caller_fields(&self, isbn: &str) -> CatalogRecord {
        CatalogRecord {
            isbn: isbn.to_string(),
            title: non_empty(self.title.clone()),
            author: non_empty(self.author.clone()),
            year: self.year.as_ref().and_then(YearInput::parse),
            edition: non_empty(self.edition.clone()),
            publisher: non_empty(self.publisher.clone()),
            description: None,
        }
    }
}

/// Result of one synchronization
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Stored record after the merge, or the caller's fields when nothing
    /// could be keyed
    pub record: CatalogRecord,
    pub description_found: bool,
    /// First time this identifier was stored
    pub created: bool,
    /// False when neither the caller nor a provider supplied an ISBN
    pub stored: bool,
    pub reports: Vec<ProviderReport>,
}

/// One record of a batch that could not be synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub isbn: Option<String>,
    pub error: String,
}

/// Summary of a bulk synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub synced: usize,
    pub with_description: usize,
    /// Title/author requests no provider could match to an ISBN
    pub unmatched: usize,
    pub failures: Vec<BatchFailure>,
}

/// Result of an index rebuild request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Records in the installed index
    pub indexed: usize,
    pub embedding_model: String,
    /// False when the catalog was unchanged and the build was skipped
    pub rebuilt: bool,
}

/// Response for `POST /sync`
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: String,
    pub message: String,
    pub data: CatalogRecord,
    pub description_found: bool,
    pub created: bool,
    pub stored: bool,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        let message = if outcome.stored {
            format!(
                "Book {} processed through pipeline and saved.",
                outcome.record.isbn
            )
        } else {
            format!(
                "No ISBN found for '{}'; nothing saved.",
                outcome.record.title.as_deref().unwrap_or_default()
            )
        };

        Self {
            status: "success".to_string(),
            message,
            data: outcome.record,
            description_found: outcome.description_found,
            created: outcome.created,
            stored: outcome.stored,
        }
    }
}

/// Query string for `GET /books`
#[derive(Debug, Deserialize)]
pub struct BooksQuery {
    /// Keywords matched against title or author
    pub q: Option<String>,

    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    50
}

/// Query string for `GET /discover`
#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub q: String,
    pub top_k: Option<usize>,
    pub rerank: Option<bool>,
}

/// Response for `GET /discover`
#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<RankedResult>,
}

/// Query string for `POST /index/rebuild`
#[derive(Debug, Default, Deserialize)]
pub struct RebuildQuery {
    #[serde(default)]
    pub force: bool,
}

/// Response for `GET /health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub catalog_books: i64,
    pub indexed_books: usize,
    /// Whether the embedding/rerank backend answered
    pub ollama: bool,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_accepts_text_or_number() {
        let request: SyncRequest =
            serde_json::from_str(r#"{"isbn":"9780134685991","year":"May 2008"}"#).unwrap();
        assert_eq!(request.year.as_ref().and_then(YearInput::parse), Some(2008));

        let request: SyncRequest = serde_json::from_str(r#"{"isbn":"x","year":1999}"#).unwrap();
        assert_eq!(request.year.as_ref().and_then(YearInput::parse), Some(1999));

        assert_eq!(YearInput::Number(12).parse(), None);
        assert_eq!(YearInput::Text("unknown".to_string()).parse(), None);
    }

    #[test]
    fn test_caller_fields_drop_blanks() {
        let request = SyncRequest {
            title: Some("  ".to_string()),
            author: Some("Ann Author".to_string()),
            ..SyncRequest::by_isbn("9780134685991")
        };

        let record = request.caller_fields("9780134685991");
        assert_eq!(record.title, None);
        assert_eq!(record.author.as_deref(), Some("Ann Author"));
        assert_eq!(record.description, None);
    }
}
