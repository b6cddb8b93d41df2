use actix_web::{post, web, HttpResponse};
use std::sync::Arc;
use tracing::info;

use super::ApiResult;
use crate::state::AppState;
use crate::types::{SyncRequest, SyncResponse};

/// Resolve one book through the providers and store it
#[post("/sync")]
pub async fn sync_book(req: web::Json<SyncRequest>, state: web::Data<Arc<AppState>>) -> ApiResult {
    let outcome = state.workflow.sync(&req).await?;
    Ok(HttpResponse::Ok().json(SyncResponse::from(outcome)))
}

/// Resolve and store a list of books
#[post("/sync/batch")]
pub async fn sync_batch(req: web::Json<Vec<SyncRequest>>, state: web::Data<Arc<AppState>>) -> ApiResult {
    let requests = req.into_inner();
    info!("Batch sync requested: {} records", requests.len());

    let report = state.workflow.sync_batch(requests, |_, _| {}).await;
    Ok(HttpResponse::Ok().json(report))
}
