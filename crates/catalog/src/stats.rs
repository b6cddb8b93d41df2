use crate::store::{storage_error, CatalogStore};
use bookfinder_common::Result;
use serde::{Deserialize, Serialize};

/// Number of authors listed in [`CatalogStats::top_authors`]
pub const TOP_AUTHOR_COUNT: i64 = 5;

/// Catalog-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_books: i64,
    pub described_books: i64,
    pub unique_publishers: i64,
    pub years: Option<YearRange>,
    pub description_length: Option<LengthStats>,
    pub top_authors: Vec<AuthorCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i64,
    pub max: i64,
    pub average: f64,
}

/// Description length in characters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: i64,
    pub max: i64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: i64,
}

impl CatalogStats {
    pub(crate) async fn collect(store: &CatalogStore) -> Result<Self> {
        let pool = store.pool();

        let (total_books, described_books, unique_publishers): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(description),
                COUNT(DISTINCT publisher)
            FROM books
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(storage_error)?;

        let (min_year, max_year, avg_year): (Option<i64>, Option<i64>, Option<f64>) =
            sqlx::query_as("SELECT MIN(year), MAX(year), AVG(year) FROM books WHERE year IS NOT NULL")
                .fetch_one(pool)
                .await
                .map_err(storage_error)?;

        let (min_len, max_len, avg_len): (Option<i64>, Option<i64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT MIN(LENGTH(description)), MAX(LENGTH(description)), AVG(LENGTH(description))
            FROM books
            WHERE description IS NOT NULL
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(storage_error)?;

        let top_authors: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT author, COUNT(*) AS count
            FROM books
            WHERE author IS NOT NULL
            GROUP BY author
            ORDER BY count DESC, author
            LIMIT ?
            "#,
        )
        .bind(TOP_AUTHOR_COUNT)
        .fetch_all(pool)
        .await
        .map_err(storage_error)?;

        Ok(Self {
            total_books,
            described_books,
            unique_publishers,
            years: match (min_year, max_year, avg_year) {
                (Some(min), Some(max), Some(average)) => Some(YearRange { min, max, average }),
                _ => None,
            },
            description_length: match (min_len, max_len, avg_len) {
                (Some(min), Some(max), Some(average)) => Some(LengthStats { min, max, average }),
                _ => None,
            },
            top_authors: top_authors
                .into_iter()
                .map(|(author, count)| AuthorCount { author, count })
                .collect(),
        })
    }

    /// Share of records with a description, in percent
    pub fn description_coverage(&self) -> f64 {
        if self.total_books == 0 {
            0.0
        } else {
            self.described_books as f64 * 100.0 / self.total_books as f64
        }
    }
}
