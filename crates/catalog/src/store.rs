use crate::stats::CatalogStats;
use bookfinder_common::{BookFinderError, CatalogRecord, Result};
use bookfinder_sources::Isbn;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS books (
        isbn TEXT PRIMARY KEY,
        title TEXT,
        author TEXT,
        year INTEGER,
        edition TEXT,
        publisher TEXT,
        description TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title)",
    "CREATE INDEX IF NOT EXISTS idx_books_author ON books(author)",
];

const SELECT_COLUMNS: &str = "SELECT isbn, title, author, year, edition, publisher, description FROM books";

/// How long a writer waits for the database lock before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for keyword listings
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Result of a coalesce upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Row as stored after the merge
    pub record: CatalogRecord,
    /// Whether the identifier was previously unseen
    pub created: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    isbn: String,
    title: Option<String>,
    author: Option<String>,
    year: Option<i64>,
    edition: Option<String>,
    publisher: Option<String>,
    description: Option<String>,
}

impl From<BookRow> for CatalogRecord {
    fn from(row: BookRow) -> Self {
        Self {
            isbn: row.isbn,
            title: row.title,
            author: row.author,
            year: row.year.and_then(|y| i32::try_from(y).ok()),
            edition: row.edition,
            publisher: row.publisher,
            description: row.description,
        }
    }
}

pub(crate) fn storage_error(e: sqlx::Error) -> BookFinderError {
    BookFinderError::storage(e.to_string())
}

/// Empty and whitespace-only strings are stored as NULL
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Escape LIKE wildcards so user keywords match literally
fn like_pattern(word: &str) -> String {
    let escaped = word
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Identifier-keyed book catalog over SQLite
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Open (or create) the catalog database file
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                BookFinderError::storage(format!(
                    "Failed to open catalog {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let store = Self { pool };
        store.init_schema().await?;

        info!("Catalog opened: {}", path.display());
        Ok(store)
    }

    /// In-memory catalog (single connection so every query sees the same database)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_error)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or merge a record
    ///
    /// New identifiers are inserted with every provided field. Existing rows
    /// are merged with `COALESCE`, so an absent incoming field never erases
    /// a stored value. The transaction opens with a write, so it holds the
    /// database write lock from its first statement and concurrent upserts
    /// of the same identifier serialize behind `busy_timeout`. On error the
    /// transaction is dropped uncommitted.
    pub async fn upsert(&self, record: &CatalogRecord) -> Result<UpsertOutcome> {
        let isbn = Isbn::parse(&record.isbn)?;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO books (isbn, title, author, year, edition, publisher, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(isbn) DO NOTHING
            "#,
        )
        .bind(isbn.as_str())
        .bind(present(&record.title))
        .bind(present(&record.author))
        .bind(record.year)
        .bind(present(&record.edition))
        .bind(present(&record.publisher))
        .bind(present(&record.description))
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        let created = inserted.rows_affected() == 1;
        if !created {
            sqlx::query(
                r#"
                UPDATE books SET
                    title = COALESCE(?, title),
                    author = COALESCE(?, author),
                    year = COALESCE(?, year),
                    edition = COALESCE(?, edition),
                    publisher = COALESCE(?, publisher),
                    description = COALESCE(?, description)
                WHERE isbn = ?
                "#,
            )
            .bind(present(&record.title))
            .bind(present(&record.author))
            .bind(record.year)
            .bind(present(&record.edition))
            .bind(present(&record.publisher))
            .bind(present(&record.description))
            .bind(isbn.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        let row: BookRow = sqlx::query_as(&format!("{} WHERE isbn = ?", SELECT_COLUMNS))
            .bind(isbn.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        debug!(
            "Upserted {} ({})",
            isbn,
            if created { "created" } else { "updated" }
        );

        Ok(UpsertOutcome {
            record: row.into(),
            created,
        })
    }

    /// Point lookup by canonical identifier
    pub async fn get(&self, isbn: &Isbn) -> Result<Option<CatalogRecord>> {
        let row: Option<BookRow> = sqlx::query_as(&format!("{} WHERE isbn = ?", SELECT_COLUMNS))
            .bind(isbn.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(Into::into))
    }

    /// Keyword listing over title and author
    ///
    /// Every whitespace-separated word must appear (case-insensitively) in
    /// the title or the author. A blank query lists everything.
    pub async fn list(&self, query: Option<&str>, limit: u32) -> Result<Vec<CatalogRecord>> {
        let words: Vec<&str> = query
            .map(|q| q.split_whitespace().collect())
            .unwrap_or_default();

        let mut sql = SELECT_COLUMNS.to_string();
        if !words.is_empty() {
            let clauses = vec![
                r"(LOWER(title) LIKE ? ESCAPE '\' OR LOWER(author) LIKE ? ESCAPE '\')";
                words.len()
            ];
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY title COLLATE NOCASE, isbn LIMIT ?");

        let mut statement = sqlx::query_as::<_, BookRow>(&sql);
        for word in &words {
            let pattern = like_pattern(word);
            statement = statement.bind(pattern.clone()).bind(pattern);
        }

        let rows = statement
            .bind(i64::from(limit.min(MAX_LIST_LIMIT)))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Records with a non-empty description, in identifier order
    pub async fn described_records(&self) -> Result<Vec<CatalogRecord>> {
        let rows: Vec<BookRow> = sqlx::query_as(&format!(
            "{} WHERE description IS NOT NULL AND TRIM(description) != '' ORDER BY isbn",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Total number of records
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)
    }

    /// Aggregate catalog statistics
    pub async fn stats(&self) -> Result<CatalogStats> {
        CatalogStats::collect(self).await
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(isbn: &str) -> CatalogRecord {
        CatalogRecord::new(isbn)
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_same_isbn() {
        for round in 0..10 {
            let dir = tempfile::tempdir().unwrap();
            let store = CatalogStore::connect(&dir.path().join("catalog.db")).await.unwrap();

            let tasks: Vec<_> = (0..5)
                .map(|writer| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let mut incoming = record("9780134685991");
                        match writer {
                            0 => incoming.title = Some("Effective Java".to_string()),
                            1 => incoming.author = Some("Joshua Bloch".to_string()),
                            2 => incoming.year = Some(2018),
                            3 => incoming.publisher = Some("Addison-Wesley".to_string()),
                            _ => incoming.description = Some("Best practices.".to_string()),
                        }
                        store.upsert(&incoming).await
                    })
                })
                .collect();

            let mut created = 0;
            for task in tasks {
                let outcome = task.await.unwrap().unwrap_or_else(|e| panic!("round {}: {}", round, e));
                if outcome.created {
                    created += 1;
                }
            }
            assert_eq!(created, 1, "round {}", round);

            let isbn = Isbn::parse("9780134685991").unwrap();
            let stored = store.get(&isbn).await.unwrap().unwrap();
            assert_eq!(stored.title.as_deref(), Some("Effective Java"));
            assert_eq!(stored.author.as_deref(), Some("Joshua Bloch"));
            assert_eq!(stored.year, Some(2018));
            assert_eq!(stored.publisher.as_deref(), Some("Addison-Wesley"));
            assert_eq!(stored.description.as_deref(), Some("Best practices."));
            assert_eq!(store.count().await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = CatalogStore::in_memory().await.unwrap();

        let mut incoming = record("978-0-13-468599-1");
        incoming.title = Some("Effective Java".to_string());
        incoming.year = Some(2018);

        let outcome = store.upsert(&incoming).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.record.isbn, "9780134685991");

        let isbn = Isbn::parse("9780134685991").unwrap();
        let stored = store.get(&isbn).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Effective Java"));
        assert_eq!(stored.year, Some(2018));
        assert_eq!(stored.author, None);
    }

    #[tokio::test]
    async fn test_null_never_erases_stored_value() {
        let store = CatalogStore::in_memory().await.unwrap();

        let mut first = record("9780134685991");
        first.title = Some("Effective Java".to_string());
        first.description = Some("Best practices.".to_string());
        store.upsert(&first).await.unwrap();

        let mut second = record("9780134685991");
        second.publisher = Some("Addison-Wesley".to_string());
        let outcome = store.upsert(&second).await.unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.record.title.as_deref(), Some("Effective Java"));
        assert_eq!(outcome.record.description.as_deref(), Some("Best practices."));
        assert_eq!(outcome.record.publisher.as_deref(), Some("Addison-Wesley"));
    }

    #[tokio::test]
    async fn test_empty_string_treated_as_null() {
        let store = CatalogStore::in_memory().await.unwrap();

        let mut first = record("9780134685991");
        first.title = Some("Effective Java".to_string());
        store.upsert(&first).await.unwrap();

        let mut second = record("9780134685991");
        second.title = Some("   ".to_string());
        second.edition = Some(String::new());
        let outcome = store.upsert(&second).await.unwrap();

        assert_eq!(outcome.record.title.as_deref(), Some("Effective Java"));
        assert_eq!(outcome.record.edition, None);
    }

    #[tokio::test]
    async fn test_non_null_fields_overwrite() {
        let store = CatalogStore::in_memory().await.unwrap();

        let mut first = record("9780134685991");
        first.title = Some("Old".to_string());
        store.upsert(&first).await.unwrap();

        let mut second = record("9780134685991");
        second.title = Some("New".to_string());
        let outcome = store.upsert(&second).await.unwrap();
        assert_eq!(outcome.record.title.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let store = CatalogStore::in_memory().await.unwrap();

        let mut incoming = record("9780134685991");
        incoming.title = Some("Effective Java".to_string());
        incoming.description = Some("Desc".to_string());

        let first = store.upsert(&incoming).await.unwrap();
        let second = store.upsert(&incoming).await.unwrap();

        assert_eq!(first.record, second.record);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_isbn10_and_isbn13_share_row() {
        let store = CatalogStore::in_memory().await.unwrap();

        store.upsert(&record("0-306-40615-2")).await.unwrap();
        let outcome = store.upsert(&record("9780306406157")).await.unwrap();

        assert!(!outcome.created);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejected() {
        let store = CatalogStore::in_memory().await.unwrap();
        let err = store.upsert(&record("abc")).await.unwrap_err();
        assert!(matches!(err, BookFinderError::InvalidIdentifier(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    async fn seeded() -> CatalogStore {
        let store = CatalogStore::in_memory().await.unwrap();
        let books = [
            ("9780134685991", "Effective Java", "Joshua Bloch", Some("Java best practices")),
            ("9780306406157", "Java Puzzlers", "Joshua Bloch, Neal Gafter", None),
            ("9780441013593", "Dune", "Frank Herbert", Some("  ")),
            ("9780262033848", "Introduction to Algorithms", "Cormen", Some("100% classic")),
        ];
        for (isbn, title, author, description) in books {
            let mut r = record(isbn);
            r.title = Some(title.to_string());
            r.author = Some(author.to_string());
            r.description = description.map(String::from);
            store.upsert(&r).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_list_every_word_must_match() {
        let store = seeded().await;

        let hits = store.list(Some("java BLOCH"), 50).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store.list(Some("java gafter"), 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("Java Puzzlers"));

        let hits = store.list(Some("herbert java"), 50).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_list_blank_query_and_limit() {
        let store = seeded().await;

        assert_eq!(store.list(None, 50).await.unwrap().len(), 4);
        assert_eq!(store.list(Some("   "), 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_wildcards_are_literal() {
        let store = seeded().await;
        assert!(store.list(Some("%"), 50).await.unwrap().is_empty());
        assert!(store.list(Some("_"), 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_described_records_skip_blank() {
        let store = seeded().await;

        // Whitespace-only descriptions are stored as NULL in the first place
        let described = store.described_records().await.unwrap();
        let isbns: Vec<&str> = described.iter().map(|r| r.isbn.as_str()).collect();
        assert_eq!(isbns, vec!["9780134685991", "9780262033848"]);
    }
}
