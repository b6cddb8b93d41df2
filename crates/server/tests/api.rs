//! End-to-end API tests: sync -> index -> discover with in-process fakes

use actix_web::{test, web, App};
use async_trait::async_trait;
use bookfinder_catalog::CatalogStore;
use bookfinder_common::{AppConfig, BookFinderError, Result};
use bookfinder_llm::{GenerateRequest, LlmClient, RerankCandidate, RerankDecision, Reranker};
use bookfinder_server::{routes, AppState};
use bookfinder_sources::{EnrichmentCandidate, Isbn, MetadataProvider, SourceResolver};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Serves a fixed shelf of books by ISBN
struct ShelfProvider {
    books: HashMap<&'static str, (&'static str, &'static str)>,
}

impl ShelfProvider {
    fn new() -> Self {
        let books = HashMap::from([
            ("9780134685991", ("Deep Space", "A voyage through space and stars.")),
            ("9780306406157", ("Tides", "An ocean story of ocean tides.")),
            ("9780262033848", ("Hearts", "A love story.")),
        ]);
        Self { books }
    }
}

#[async_trait]
impl MetadataProvider for ShelfProvider {
    fn name(&self) -> &str {
        "shelf"
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<EnrichmentCandidate>> {
        Ok(self.books.get(isbn.as_str()).map(|(title, description)| EnrichmentCandidate {
            isbn: Some(isbn.clone()),
            title: Some(title.to_string()),
            author: Some("Shelf Author".to_string()),
            description: Some(description.to_string()),
            ..EnrichmentCandidate::new("shelf")
        }))
    }
}

/// Embeds text by counting topic words
struct TopicEmbedder;

#[async_trait]
impl LlmClient for TopicEmbedder {
    async fn generate(&self, _request: GenerateRequest) -> Result<String> {
        Err(BookFinderError::llm("generation not available"))
    }

    async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let count = |word: &str| text.matches(word).count() as f32;
        Ok(vec![count("space"), count("ocean"), count("love"), 0.01])
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Always promotes the last candidate
struct LastFirstReranker;

#[async_trait]
impl Reranker for LastFirstReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankDecision>> {
        Ok(vec![RerankDecision {
            index: candidates.len() - 1,
            explanation: Some("Promoted".to_string()),
            match_score: Some(70),
        }])
    }
}

async fn app_state(dir: &tempfile::TempDir, reranker: Option<Arc<dyn Reranker>>) -> Arc<AppState> {
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        vector_index_path: dir.path().join("books_index.json"),
        embedding_model: "topic-embed".to_string(),
        ..AppConfig::default()
    };

    let providers: Vec<Arc<dyn MetadataProvider>> = vec![Arc::new(ShelfProvider::new())];
    let resolver = SourceResolver::new(providers, Duration::from_secs(1));
    let catalog = CatalogStore::in_memory().await.unwrap();

    Arc::new(AppState::from_parts(
        config,
        catalog,
        resolver,
        Arc::new(TopicEmbedder),
        reranker,
    ))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_sync_index_discover_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, None).await;
    let app = app!(state);

    for isbn in ["978-0-13-468599-1", "0306406152", "9780262033848"] {
        let req = test::TestRequest::post()
            .uri("/sync")
            .set_json(json!({ "isbn": isbn, "year": "2018" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["description_found"], true);
        assert_eq!(body["created"], true);
        assert_eq!(body["stored"], true);
        assert_eq!(body["data"]["year"], 2018);
    }

    let req = test::TestRequest::post().uri("/index/rebuild").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["indexed"], 3);
    assert_eq!(body["embedding_model"], "topic-embed");
    assert_eq!(body["rebuilt"], true);
    assert!(dir.path().join("books_index.json").exists());

    let req = test::TestRequest::get().uri("/discover?q=ocean").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["query"], "ocean");
    assert_eq!(body["count"], 3);
    assert_eq!(body["results"][0]["record"]["isbn"], "9780306406157");
    assert_eq!(body["results"][0]["match_percent"], 100);

    let req = test::TestRequest::get().uri("/discover?q=ocean&top_k=1").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
}

#[actix_web::test]
async fn test_discover_with_reranker() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, Some(Arc::new(LastFirstReranker))).await;
    let app = app!(state);

    for isbn in ["9780134685991", "9780306406157"] {
        let req = test::TestRequest::post()
            .uri("/sync")
            .set_json(json!({ "isbn": isbn }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }
    let req = test::TestRequest::post().uri("/index/rebuild").to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/discover?q=space").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["results"][0]["record"]["isbn"], "9780306406157");
    assert_eq!(body["results"][0]["rerank_position"], 0);
    assert_eq!(body["results"][0]["explanation"], "Promoted");
    assert_eq!(body["results"][1]["record"]["isbn"], "9780134685991");

    let req = test::TestRequest::get().uri("/discover?q=space&rerank=false").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["results"][0]["record"]["isbn"], "9780134685991");
    assert!(body["results"][0].get("rerank_position").is_none());
}

#[actix_web::test]
async fn test_books_listing_and_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, None).await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/sync/batch")
        .set_json(json!([
            { "isbn": "9780134685991" },
            { "isbn": "bad" },
            { "isbn": "9780262033848", "title": "Caller Hearts" }
        ]))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["total"], 3);
    assert_eq!(report["synced"], 2);
    assert_eq!(report["with_description"], 2);
    assert_eq!(report["failures"][0]["index"], 1);

    let req = test::TestRequest::get().uri("/books?q=caller%20hearts").to_request();
    let books: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(books.as_array().map(Vec::len), Some(1));
    assert_eq!(books[0]["title"], "Caller Hearts");

    let req = test::TestRequest::get().uri("/books/9780000000002").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // ISBN-10 form of a stored ISBN-13
    let req = test::TestRequest::get().uri("/books/0-13-468599-7").to_request();
    let book: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(book["title"], "Deep Space");

    let req = test::TestRequest::get().uri("/stats").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["total_books"], 2);
    assert_eq!(stats["described_books"], 2);

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["catalog_books"], 2);
    assert_eq!(health["indexed_books"], 0);
    assert_eq!(health["ollama"], true);
}

#[actix_web::test]
async fn test_error_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, None).await;
    let app = app!(state);

    let req = test::TestRequest::post().uri("/sync").set_json(json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().is_some());

    let req = test::TestRequest::post()
        .uri("/sync")
        .set_json(json!({ "isbn": "abc" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/sync")
        .set_json(json!({ "title": "Unknown", "author": "Nobody" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["stored"], false);
    assert_eq!(body["description_found"], false);

    let req = test::TestRequest::get().uri("/books/abc").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/discover?q=space").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 503);
}

#[actix_web::test]
async fn test_discover_on_empty_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, None).await;
    let app = app!(state);

    let req = test::TestRequest::post().uri("/index/rebuild").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["indexed"], 0);

    let req = test::TestRequest::get().uri("/discover?q=anything").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 0);
}
