use actix_web::{get, web, HttpResponse};
use std::sync::Arc;

use super::ApiResult;
use crate::state::AppState;
use crate::types::HealthResponse;

/// Liveness plus catalog/index sizes and backend reachability
#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> ApiResult {
    let catalog_books = state.catalog().count().await?;
    let indexed_books = state.workflow.index().len().await;
    let ollama = state.llm_client.test_connection().await.unwrap_or(false);

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        catalog_books,
        indexed_books,
        ollama,
    }))
}

/// Catalog statistics
#[get("/stats")]
pub async fn stats(state: web::Data<Arc<AppState>>) -> ApiResult {
    let stats = state.catalog().stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}
