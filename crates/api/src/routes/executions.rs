//! Execution records, audit trails and in-flight transactions.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use common::ExecutionId;
use saga::{SagaExecution, SagaStateStore, SagaStatus, TransactionAuditLog};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ExecutionResponse {
    pub id: String,
    pub saga_name: String,
    pub status: SagaStatus,
    pub current_step: usize,
    pub completed_steps: BTreeSet<usize>,
    pub error_message: Option<String>,
    pub context: serde_json::Value,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl From<SagaExecution> for ExecutionResponse {
    fn from(execution: SagaExecution) -> Self {
        Self {
            id: execution.id().to_string(),
            saga_name: execution.saga_name().to_string(),
            status: execution.status(),
            current_step: execution.current_step(),
            completed_steps: execution.completed_steps().clone(),
            error_message: execution.error_message().map(String::from),
            context: execution.context().to_value(),
            started_at: execution.started_at().to_rfc3339(),
            ended_at: execution.ended_at().map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct ActiveTransactionResponse {
    pub execution_id: String,
    pub saga_name: String,
    pub started_at: String,
    pub age_secs: u64,
    pub steps_recorded: usize,
}

/// GET /executions: list stored executions, newest first.
///
/// Accepts an optional `status` filter (e.g. `?status=COMPENSATED`).
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ExecutionResponse>>, ApiError> {
    let store = state.orchestrator.store();
    let mut executions: Vec<SagaExecution> = match params.status {
        Some(raw) => {
            let status: SagaStatus = raw.parse().map_err(ApiError::BadRequest)?;
            store.find_by_status(status).await?
        }
        None => store.find_all().await?.into_values().collect(),
    };
    executions.sort_by_key(|e| std::cmp::Reverse(e.started_at()));

    Ok(Json(executions.into_iter().map(Into::into).collect()))
}

/// GET /executions/active: transactions the monitor is still tracking.
#[tracing::instrument(skip(state))]
pub async fn active(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveTransactionResponse>> {
    let now = Utc::now();
    let responses = state
        .orchestrator
        .monitor()
        .active_transactions()
        .into_iter()
        .map(|t| ActiveTransactionResponse {
            execution_id: t.execution_id.to_string(),
            age_secs: t.age(now).as_secs(),
            started_at: t.started_at.to_rfc3339(),
            steps_recorded: t.steps.len(),
            saga_name: t.saga_name,
        })
        .collect();
    Json(responses)
}

/// GET /executions/{id}: load one execution record.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let execution_id = parse_execution_id(&id)?;
    let execution = state
        .orchestrator
        .get_execution(execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Execution {id} not found")))?;
    Ok(Json(execution.into()))
}

/// GET /executions/{id}/audit: the audit trail of one execution.
#[tracing::instrument(skip(state))]
pub async fn audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionAuditLog>, ApiError> {
    let execution_id = parse_execution_id(&id)?;
    let log = state
        .orchestrator
        .audit()
        .get_log(execution_id)
        .ok_or_else(|| ApiError::NotFound(format!("No audit log for execution {id}")))?;
    Ok(Json(log))
}

fn parse_execution_id(id: &str) -> Result<ExecutionId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
