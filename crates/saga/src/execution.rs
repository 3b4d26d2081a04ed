//! Execution records and results.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::ExecutionId;
use serde::{Deserialize, Serialize};

use crate::context::SagaContext;
use crate::state::SagaStatus;

/// The persisted record of one saga run.
///
/// Owned by the orchestrator for the duration of a single `execute` call and
/// written to the state store after every transition. `completed_steps` only
/// grows during forward execution; compensation reads it without clearing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaExecution {
    id: ExecutionId,
    saga_name: String,
    initial_context: SagaContext,
    context: SagaContext,
    current_step: usize,
    completed_steps: BTreeSet<usize>,
    status: SagaStatus,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl SagaExecution {
    /// Creates a new record in `Started` status with a fresh execution ID.
    pub fn new(saga_name: impl Into<String>, initial_context: SagaContext) -> Self {
        Self::with_id(ExecutionId::new(), saga_name, initial_context)
    }

    /// Creates a new record in `Started` status with the given ID.
    pub fn with_id(
        id: ExecutionId,
        saga_name: impl Into<String>,
        initial_context: SagaContext,
    ) -> Self {
        Self {
            id,
            saga_name: saga_name.into(),
            context: initial_context.clone(),
            initial_context,
            current_step: 0,
            completed_steps: BTreeSet::new(),
            status: SagaStatus::Started,
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Reassembles a record from stored parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ExecutionId,
        saga_name: String,
        initial_context: SagaContext,
        context: SagaContext,
        current_step: usize,
        completed_steps: BTreeSet<usize>,
        status: SagaStatus,
        error_message: Option<String>,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            saga_name,
            initial_context,
            context,
            current_step,
            completed_steps,
            status,
            error_message,
            started_at,
            ended_at,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    pub fn initial_context(&self) -> &SagaContext {
        &self.initial_context
    }

    pub fn context(&self) -> &SagaContext {
        &self.context
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        &self.completed_steps
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns true once the run has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    // Mutators used by the orchestrator.

    pub(crate) fn context_mut(&mut self) -> &mut SagaContext {
        &mut self.context
    }

    pub(crate) fn set_context(&mut self, context: SagaContext) {
        self.context = context;
    }

    pub(crate) fn begin_step(&mut self, index: usize) {
        self.current_step = index;
        self.transition(SagaStatus::Executing);
    }

    pub(crate) fn mark_step_completed(&mut self, index: usize) {
        self.completed_steps.insert(index);
    }

    pub(crate) fn begin_compensation(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.transition(SagaStatus::Compensating);
    }

    pub(crate) fn finish(&mut self, status: SagaStatus) {
        self.transition(status);
        self.ended_at = Some(Utc::now());
    }

    fn transition(&mut self, next: SagaStatus) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                execution_id = %self.id,
                from = %self.status,
                to = %next,
                "unexpected saga status transition"
            );
        }
        self.status = next;
    }
}

/// The value returned to callers of `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaExecutionResult {
    pub execution_id: ExecutionId,
    pub success: bool,
    pub error_message: Option<String>,
    /// Final context; only present on success.
    pub context: Option<SagaContext>,
}

impl SagaExecutionResult {
    /// A successful result carrying the final context.
    pub fn succeeded(execution_id: ExecutionId, context: SagaContext) -> Self {
        Self {
            execution_id,
            success: true,
            error_message: None,
            context: Some(context),
        }
    }

    /// A failed result carrying the error message.
    pub fn failed(execution_id: ExecutionId, error_message: impl Into<String>) -> Self {
        Self {
            execution_id,
            success: false,
            error_message: Some(error_message.into()),
            context: None,
        }
    }
}
