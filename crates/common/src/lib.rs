pub mod config;
pub mod error;
pub mod logger;
pub mod record;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::BookFinderError;
pub use record::CatalogRecord;
pub type Result<T> = std::result::Result<T, BookFinderError>;
