/// Book Finder error types
#[derive(Debug, thiserror::Error)]
pub enum BookFinderError {
    /// Identifier is not a valid ISBN-10 or ISBN-13
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Sync request carries neither an identifier nor a title/author pair
    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    /// Metadata provider call failed
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: String,
        reason: String,
    },

    /// Catalog persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding index queried before it was built
    #[error("Embedding index is not ready")]
    IndexNotReady,

    /// Reranking service failed or returned nothing usable
    #[error("Rerank unavailable: {0}")]
    RerankUnavailable(String),

    /// LLM related error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector search related error
    #[error("Vector search error: {0}")]
    VectorSearch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BookFinderError {
    /// Create invalid identifier error
    pub fn invalid_identifier<S: Into<String>>(raw: S) -> Self {
        Self::InvalidIdentifier(raw.into())
    }

    /// Create insufficient input error
    pub fn insufficient_input<S: Into<String>>(msg: S) -> Self {
        Self::InsufficientInput(msg.into())
    }

    /// Create provider error
    pub fn provider<P: Into<String>, S: Into<String>>(provider: P, reason: S) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create rerank error
    pub fn rerank<S: Into<String>>(msg: S) -> Self {
        Self::RerankUnavailable(msg.into())
    }

    /// Create LLM error
    pub fn llm<S: Into<String>>(msg: S) -> Self {
        Self::Llm(msg.into())
    }

    /// Create vector search error
    pub fn vector_search<S: Into<String>>(msg: S) -> Self {
        Self::VectorSearch(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether the error comes from a best-effort collaborator
    /// (providers, reranker) and may be degraded to "no data"
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::RerankUnavailable(_) | Self::Network(_)
        )
    }
}

// HTTP response conversion
impl BookFinderError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,
            Self::InsufficientInput(_) => 400,
            Self::InvalidInput(_) => 400,
            Self::Json(_) => 400,
            Self::NotFound(_) => 404,
            Self::ProviderUnavailable { .. } => 502,
            Self::RerankUnavailable(_) => 502,
            Self::IndexNotReady => 503,
            Self::Network(_) => 503,
            Self::Storage(_) => 500,
            Self::Llm(_) => 500,
            Self::VectorSearch(_) => 500,
            Self::Config(_) => 500,
            Self::Io(_) => 500,
            Self::Other(_) => 500,
        }
    }
}
