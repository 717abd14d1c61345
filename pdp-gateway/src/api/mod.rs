use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::legacy::{
    add_roots_handler, create_proof_set_handler, ping_handler, proof_set_status_handler,
    upload_handler,
};
use crate::service::pdp::{
    bind_flow_handler, full_flow_handler, genome_handler, paper_handler, spectrum_handler,
};
use crate::service::records::{get_data_handler, list_cids_handler, query_data_handler};
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .nest("/api", api_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Workflows
        .route("/pdp", post(full_flow_handler))
        .route("/proofset/upload-and-add-root", post(bind_flow_handler))
        .route("/upload/paper", post(paper_handler))
        .route("/upload/genome", post(genome_handler))
        .route("/upload/spectrum", post(spectrum_handler))
        // Queries
        .route("/cids", get(list_cids_handler))
        .route("/data/{type}", get(query_data_handler))
        .route("/data/{type}/{cid}", get(get_data_handler))
        // Single tool calls
        .route("/ping", post(ping_handler))
        .route("/proof-sets", post(create_proof_set_handler))
        .route("/proof-sets/{id}/status", get(proof_set_status_handler))
        .route("/upload", post(upload_handler))
        .route("/proof-sets/{id}/roots", post(add_roots_handler))
}
