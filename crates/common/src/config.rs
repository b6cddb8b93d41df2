use crate::error::BookFinderError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Book Finder application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data directory (catalog, index, logs)
    pub data_dir: PathBuf,

    /// SQLite catalog file path
    pub catalog_db_path: PathBuf,

    /// Vector index file path
    pub vector_index_path: PathBuf,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// LLM reranking model name
    pub rerank_model: String,

    /// Whether discovery may call the reranker
    pub rerank_enabled: bool,

    /// Google Books API key (optional, raises quota)
    pub google_books_api_key: Option<String>,

    /// Per-provider call timeout in seconds
    pub provider_timeout_secs: u64,

    /// Rerank call timeout in seconds
    pub rerank_timeout_secs: u64,

    /// Maximum concurrently resolving records during bulk enrichment
    pub max_concurrent_lookups: usize,

    /// Default number of discovery candidates
    pub default_top_k: usize,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            catalog_db_path: PathBuf::from("./data/books.db"),
            vector_index_path: PathBuf::from("./data/books_index.json"),
            ollama_base_url: "http://localhost:11434".to_string(),
            embedding_model: "all-minilm".to_string(),
            rerank_model: "llama3.2:latest".to_string(),
            rerank_enabled: true,
            google_books_api_key: None,
            provider_timeout_secs: 5,
            rerank_timeout_secs: 30,
            max_concurrent_lookups: 30,
            default_top_k: 20,
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            log_dir: PathBuf::from("./data/log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, BookFinderError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();
        let data_dir = Self::get_env_path("DATA_DIR").unwrap_or(defaults.data_dir);

        let config = Self {
            catalog_db_path: Self::get_env_path("CATALOG_DB_PATH")
                .unwrap_or_else(|| data_dir.join("books.db")),
            vector_index_path: Self::get_env_path("VECTOR_INDEX_PATH")
                .unwrap_or_else(|| data_dir.join("books_index.json")),
            log_dir: Self::get_env_path("LOG_DIR")
                .unwrap_or_else(|| data_dir.join("log")),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or(defaults.ollama_base_url),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            rerank_model: std::env::var("RERANK_MODEL")
                .unwrap_or(defaults.rerank_model),
            rerank_enabled: std::env::var("RERANK_ENABLED")
                .ok()
                .map(|s| Self::parse_bool(&s))
                .unwrap_or(defaults.rerank_enabled),
            google_books_api_key: std::env::var("GOOGLE_BOOKS_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            provider_timeout_secs: Self::get_env_parsed("PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.provider_timeout_secs),
            rerank_timeout_secs: Self::get_env_parsed("RERANK_TIMEOUT_SECS")
                .unwrap_or(defaults.rerank_timeout_secs),
            max_concurrent_lookups: Self::get_env_parsed("MAX_CONCURRENT_LOOKUPS")
                .unwrap_or(defaults.max_concurrent_lookups),
            default_top_k: Self::get_env_parsed("DEFAULT_TOP_K")
                .unwrap_or(defaults.default_top_k),
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT")
                .unwrap_or(defaults.server_port),
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or(defaults.log_level),
            data_dir,
        };

        // Ensure required directories exist
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    /// Get a parsed value from environment variable
    fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
    }

    fn parse_bool(value: &str) -> bool {
        matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), BookFinderError> {
        let mut dirs = vec![self.data_dir.as_path(), self.log_dir.as_path()];
        for file in [&self.catalog_db_path, &self.vector_index_path] {
            if let Some(parent) = file.parent() {
                dirs.push(parent);
            }
        }

        for dir in dirs {
            if dir.as_os_str().is_empty() || dir.exists() {
                continue;
            }
            std::fs::create_dir_all(dir).map_err(|e| {
                BookFinderError::config(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Get per-provider call timeout
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Get rerank call timeout
    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_secs(self.rerank_timeout_secs)
    }

    /// Get log file path
    pub fn get_log_path(&self, filename: &str) -> PathBuf {
        self.log_dir.join(filename)
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), BookFinderError> {
        // Validate Ollama URL
        if !self.ollama_base_url.starts_with("http://")
            && !self.ollama_base_url.starts_with("https://") {
            return Err(BookFinderError::config(
                "Ollama base URL must start with http:// or https://"
            ));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(BookFinderError::config("Embedding model name cannot be empty"));
        }

        if self.rerank_enabled && self.rerank_model.trim().is_empty() {
            return Err(BookFinderError::config(
                "Rerank model name cannot be empty when reranking is enabled"
            ));
        }

        if self.provider_timeout_secs == 0 || self.rerank_timeout_secs == 0 {
            return Err(BookFinderError::config("Timeouts must be at least 1 second"));
        }

        if self.max_concurrent_lookups == 0 {
            return Err(BookFinderError::config("MAX_CONCURRENT_LOOKUPS cannot be 0"));
        }

        if self.default_top_k == 0 {
            return Err(BookFinderError::config("DEFAULT_TOP_K cannot be 0"));
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(BookFinderError::config("Server port cannot be 0"));
        }

        Ok(())
    }
}
