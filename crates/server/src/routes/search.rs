use actix_web::{get, web, HttpResponse};
use bookfinder_vector::DiscoveryRequest;
use std::sync::Arc;

use super::ApiResult;
use crate::state::AppState;
use crate::types::{DiscoverQuery, DiscoverResponse};

/// Meaning-based search over the indexed catalog
#[get("/discover")]
pub async fn discover(query: web::Query<DiscoverQuery>, state: web::Data<Arc<AppState>>) -> ApiResult {
    let query = query.into_inner();
    let request = DiscoveryRequest {
        query: query.q.clone(),
        top_k: query.top_k,
        rerank: query.rerank,
    };

    let results = state.retriever.discover(&request).await?;

    Ok(HttpResponse::Ok().json(DiscoverResponse {
        query: query.q,
        count: results.len(),
        results,
    }))
}
