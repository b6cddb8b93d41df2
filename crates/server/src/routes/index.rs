use actix_web::{post, web, HttpResponse};
use std::sync::Arc;
use tracing::info;

use super::ApiResult;
use crate::state::AppState;
use crate::types::RebuildQuery;

/// Rebuild the embedding index from the catalog
#[post("/index/rebuild")]
pub async fn rebuild_index(query: web::Query<RebuildQuery>, state: web::Data<Arc<AppState>>) -> ApiResult {
    info!("Index rebuild requested (force: {})", query.force);

    let report = state.workflow.rebuild_index(query.force, |_, _| {}).await?;
    Ok(HttpResponse::Ok().json(report))
}
