//! The unit of work a saga is built from.

use async_trait::async_trait;

use crate::context::SagaContext;
use crate::error::StepResult;

/// How the orchestrator reacts when a step's forward action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Criticality {
    /// Failure aborts the saga and compensates completed steps.
    #[default]
    Critical,

    /// Failure is logged and recorded in the context; the saga continues.
    BestEffort,
}

impl Criticality {
    /// Returns the name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::BestEffort => "best_effort",
        }
    }
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named forward action paired with a compensating action.
///
/// Both actions receive the shared context of the run. Compensations must be
/// idempotent and tolerate "nothing to undo": they may be invoked after a
/// forward action that only partially applied its effects. Compensation
/// errors are logged by the orchestrator and never propagated.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Step name, unique within its definition.
    fn name(&self) -> &str;

    /// Performs the forward action.
    async fn execute(&self, ctx: &mut SagaContext) -> StepResult;

    /// Undoes the forward action, best-effort.
    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult;

    /// Sort key within the definition. Steps with equal keys keep
    /// registration order.
    fn order(&self) -> i32 {
        0
    }

    /// Failure policy for the forward action.
    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    /// Whether the orchestrator may run the forward action through the
    /// retry executor using the definition's retry budget and timeout.
    ///
    /// Only opt in when the forward action is idempotent.
    fn retryable(&self) -> bool {
        false
    }
}
