use crate::identifier::Isbn;
use crate::normalizer::non_empty;
use serde::{Deserialize, Serialize};

/// One provider's answer for a single lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentCandidate {
    /// Identifier reported by the provider (title search may discover one)
    pub isbn: Option<Isbn>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub edition: Option<String>,
    pub publisher: Option<String>,
    /// Normalized description
    pub description: Option<String>,
    /// Provider name
    pub source: String,
    /// Position of the provider in the fallback chain (0 = highest priority)
    pub rank: usize,
}

impl EnrichmentCandidate {
    /// Create an empty candidate for a provider
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Whether the candidate carries no usable field at all
    pub fn is_empty(&self) -> bool {
        self.isbn.is_none()
            && self.title.is_none()
            && self.author.is_none()
            && self.year.is_none()
            && self.edition.is_none()
            && self.publisher.is_none()
            && self.description.is_none()
    }

    /// Blank strings become absent
    pub fn cleaned(mut self) -> Self {
        self.title = non_empty(self.title);
        self.author = non_empty(self.author);
        self.edition = non_empty(self.edition);
        self.publisher = non_empty(self.publisher);
        self.description = non_empty(self.description);
        self
    }
}

/// Result of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Found(EnrichmentCandidate),
    Empty,
    Failed(String),
    TimedOut,
}

impl ProviderOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Found(_) => OutcomeKind::Found,
            Self::Empty => OutcomeKind::Empty,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::TimedOut => OutcomeKind::TimedOut,
        }
    }
}

/// Outcome without the payload, kept for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Found,
    Empty,
    Failed,
    TimedOut,
}

/// Which request shape a provider call answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
    Identifier,
    Search,
}

/// Per-call record kept so "no data" and "call failed" stay distinguishable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub provider: String,
    pub mode: LookupMode,
    pub outcome: OutcomeKind,
    /// Failure reason, when the call failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Whether the call contributed a description
    pub description: bool,
}

/// What the resolver is asked to find
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub isbn: Option<Isbn>,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl LookupQuery {
    /// Identifier lookup
    pub fn by_isbn(isbn: Isbn) -> Self {
        Self {
            isbn: Some(isbn),
            ..Default::default()
        }
    }

    /// Builder: attach title and author for the search fallback
    pub fn with_title_author(mut self, title: Option<String>, author: Option<String>) -> Self {
        self.title = non_empty(title);
        self.author = non_empty(author);
        self
    }

    /// The search path can run: a title plus an author, or a title alone
    /// when an identifier is also known
    pub fn can_search(&self) -> bool {
        self.title.is_some() && (self.author.is_some() || self.isbn.is_some())
    }
}

/// Merged result of a full fallback chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub isbn: Option<Isbn>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub edition: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    /// Provider that supplied the description
    pub description_source: Option<String>,
    pub reports: Vec<ProviderReport>,
}

impl ResolvedRecord {
    pub fn has_description(&self) -> bool {
        self.description.is_some()
    }

    /// Every merged field is filled, so later providers have nothing to add
    pub fn is_complete(&self) -> bool {
        self.title.is_some()
            && self.author.is_some()
            && self.year.is_some()
            && self.edition.is_some()
            && self.publisher.is_some()
            && self.description.is_some()
    }

    /// Fill every still-empty field from a lower-priority candidate
    ///
    /// The identifier is only taken when `adopt_isbn` is set, so a search
    /// hit never re-keys a record that already has one.
    pub fn absorb(&mut self, candidate: EnrichmentCandidate, adopt_isbn: bool) {
        if adopt_isbn && self.isbn.is_none() {
            self.isbn = candidate.isbn;
        }
        fill(&mut self.title, candidate.title);
        fill(&mut self.author, candidate.author);
        if self.year.is_none() {
            self.year = candidate.year;
        }
        fill(&mut self.edition, candidate.edition);
        fill(&mut self.publisher, candidate.publisher);
        if self.description.is_none() && candidate.description.is_some() {
            self.description = candidate.description;
            self.description_source = Some(candidate.source);
        }
    }

    /// Take only the description (and optionally the identifier)
    pub fn absorb_description(&mut self, candidate: EnrichmentCandidate, adopt_isbn: bool) {
        if adopt_isbn && self.isbn.is_none() {
            self.isbn = candidate.isbn;
        }
        if self.description.is_none() && candidate.description.is_some() {
            self.description = candidate.description;
            self.description_source = Some(candidate.source);
        }
    }
}

fn fill(slot: &mut Option<String>, incoming: Option<String>) {
    if slot.is_none() {
        *slot = incoming;
    }
}
