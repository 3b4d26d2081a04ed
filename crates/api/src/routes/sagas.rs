//! Saga definition listing and execution trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use saga::{SagaContext, SagaExecutionResult};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct SagaDefinitionResponse {
    pub name: String,
    pub steps: Vec<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

/// GET /sagas: list registered saga definitions.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SagaDefinitionResponse>>, ApiError> {
    let registry = state.orchestrator.registry();
    let mut responses = Vec::new();
    for name in registry.names() {
        let definition = registry.get(&name)?;
        responses.push(SagaDefinitionResponse {
            steps: definition
                .step_names()
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_ms: u64::try_from(definition.timeout().as_millis()).unwrap_or(u64::MAX),
            max_retries: definition.max_retries(),
            name,
        });
    }
    Ok(Json(responses))
}

/// POST /sagas/{name}/execute: run a saga with the JSON body as initial context.
///
/// Responds 200 when the saga completed and 422 when a critical step failed
/// and the run was compensated.
#[tracing::instrument(skip(state, context))]
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(context): Json<SagaContext>,
) -> Result<(StatusCode, Json<SagaExecutionResult>), ApiError> {
    let result = state.orchestrator.execute(&name, context).await?;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(result)))
}
