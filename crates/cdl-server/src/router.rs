use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use cdl_ledger::Ledger;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with all CDL endpoints.
pub fn build_router(ledger: Arc<Ledger>) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/documents", post(handler::register_document))
        .route("/v1/documents/:id", get(handler::get_document))
        .route("/v1/documents/:id/revoke", post(handler::revoke_document))
        .route("/v1/documents/:id/verify", get(handler::verify_document))
        .route("/v1/subjects/:subject/documents", get(handler::subject_documents))
        .route("/v1/blocks/seal", post(handler::seal_block))
        .route("/v1/chain", get(handler::list_chain))
        .route("/v1/chain/verify", get(handler::verify_chain))
        .route("/v1/contracts", post(handler::create_contract))
        .route("/v1/contracts/:id", get(handler::get_contract))
        .route("/v1/contracts/:id/evaluate", post(handler::evaluate_contract))
        .route("/v1/contracts/:id/execute", post(handler::execute_contract))
        .route("/v1/stats", get(handler::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}
