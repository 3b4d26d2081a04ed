//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registered_sagas: usize,
    pub active_transactions: usize,
}

/// GET /health: returns service health and orchestrator load.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        registered_sagas: state.orchestrator.registry().len(),
        active_transactions: state.orchestrator.monitor().active_count(),
    })
}
