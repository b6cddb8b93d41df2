use serde::{Deserialize, Serialize};

/// One catalog entry, keyed by canonical ISBN-13
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Canonical identifier (ISBN-13 digits)
    pub isbn: String,

    /// Title
    #[serde(default)]
    pub title: Option<String>,

    /// Author or editor, as listed
    #[serde(default)]
    pub author: Option<String>,

    /// Publication year
    #[serde(default)]
    pub year: Option<i32>,

    /// Edition or volume
    #[serde(default)]
    pub edition: Option<String>,

    /// Place and publisher
    #[serde(default)]
    pub publisher: Option<String>,

    /// Normalized description
    #[serde(default)]
    pub description: Option<String>,
}

impl CatalogRecord {
    /// Create an empty record for an identifier
    pub fn new(isbn: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            ..Default::default()
        }
    }

    /// Whether the record carries a usable description
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }

    /// Text fed to the embedding model: title followed by description
    pub fn embedding_text(&self) -> Option<String> {
        let description = self.description.as_deref().map(str::trim)?;
        if description.is_empty() {
            return None;
        }

        Some(match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{} {}", title, description),
            _ => description.to_string(),
        })
    }

    /// Display label for logs ("Title (isbn)")
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("{} ({})", title, self.isbn),
            None => self.isbn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text() {
        let mut record = CatalogRecord::new("9780134685991");
        assert_eq!(record.embedding_text(), None);

        record.description = Some("Best practices for Java.".to_string());
        assert_eq!(record.embedding_text().as_deref(), Some("Best practices for Java."));

        record.title = Some("Effective Java".to_string());
        assert_eq!(
            record.embedding_text().as_deref(),
            Some("Effective Java Best practices for Java.")
        );
    }

    #[test]
    fn test_blank_description_is_absent() {
        let mut record = CatalogRecord::new("9780134685991");
        record.description = Some("   ".to_string());
        assert!(!record.has_description());
        assert_eq!(record.embedding_text(), None);
    }
}
