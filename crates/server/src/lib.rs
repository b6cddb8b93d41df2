//! Book Finder HTTP Server
//!
//! Actix-web REST API over the sync workflow, the catalog and discovery

pub mod routes;
pub mod state;
pub mod types;
pub mod workflow;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use bookfinder_common::{AppConfig, Result};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub use state::AppState;
pub use types::{
    BatchFailure, BatchReport, RebuildReport, SyncOutcome, SyncRequest, YearInput,
};
pub use workflow::{lookup_query, SyncWorkflow};

/// Build state from configuration and serve until shutdown
pub async fn start_server(config: AppConfig) -> Result<()> {
    let bind_address = config.server_bind_address();
    let state = Arc::new(AppState::new(config).await?);
    serve(state, &bind_address).await
}

/// Serve an already-built state
pub async fn serve(state: Arc<AppState>, bind_address: &str) -> Result<()> {
    info!("Starting HTTP server on {}", bind_address);

    let data = web::Data::new(state.clone());
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await?;

    info!("HTTP server stopped");
    state.catalog().close().await;
    Ok(())
}
