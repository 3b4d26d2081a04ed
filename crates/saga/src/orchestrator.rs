//! Saga orchestrator: runs definitions step by step and compensates on
//! critical failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use common::ExecutionId;
use futures_util::FutureExt;

use crate::audit::{AuditLogger, AuditStatus};
use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::{Result, StepError};
use crate::execution::{SagaExecution, SagaExecutionResult};
use crate::memory::InMemorySagaStateStore;
use crate::monitor::TransactionMonitor;
use crate::registry::SagaRegistry;
use crate::retry::RetryExecutor;
use crate::state::SagaStatus;
use crate::step::{Criticality, SagaStep};
use crate::store::SagaStateStore;

/// Drives saga executions.
///
/// Steps of one execution run strictly one after another on a context owned
/// by that execution. Separate `execute` calls share only the registry, the
/// state store, the monitor and the audit logger, all of which are safe for
/// concurrent use, so the orchestrator can be shared behind an `Arc` and
/// called from many tasks at once.
pub struct SagaOrchestrator {
    registry: SagaRegistry,
    store: Arc<dyn SagaStateStore>,
    monitor: TransactionMonitor,
    audit: AuditLogger,
    retry: RetryExecutor,
}

impl SagaOrchestrator {
    /// Creates a new orchestrator over the given collaborators.
    pub fn new(
        registry: SagaRegistry,
        store: Arc<dyn SagaStateStore>,
        monitor: TransactionMonitor,
        audit: AuditLogger,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            registry,
            store,
            monitor,
            audit,
            retry,
        }
    }

    /// Creates an orchestrator backed by an in-memory state store and the
    /// default monitor, audit logger and retry settings.
    pub fn in_memory() -> Self {
        Self::new(
            SagaRegistry::new(),
            Arc::new(InMemorySagaStateStore::new()),
            TransactionMonitor::default(),
            AuditLogger::default(),
            RetryExecutor::default(),
        )
    }

    /// Registers a saga definition under its name.
    pub fn register_saga(&self, definition: SagaDefinition) -> Result<()> {
        self.registry.register(definition)
    }

    pub fn registry(&self) -> &SagaRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SagaStateStore> {
        &self.store
    }

    pub fn monitor(&self) -> &TransactionMonitor {
        &self.monitor
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Runs the saga registered as `saga_name` with `initial_context`.
    ///
    /// Fails with [`SagaError::SagaNotFound`](crate::SagaError::SagaNotFound)
    /// before anything is recorded if the name is unknown. Every other
    /// outcome is reported through the returned [`SagaExecutionResult`]: a
    /// critical step failure yields `success == false` with the step's error
    /// message after completed steps have been compensated in reverse order.
    #[tracing::instrument(skip(self, initial_context), fields(execution_id = tracing::field::Empty))]
    pub async fn execute(
        &self,
        saga_name: &str,
        initial_context: SagaContext,
    ) -> Result<SagaExecutionResult> {
        let definition = self.registry.get(saga_name)?;

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let mut execution = SagaExecution::new(definition.name(), initial_context);
        let execution_id = execution.id();
        tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

        self.monitor
            .record_transaction_start_at(execution_id, definition.name(), execution.started_at());
        self.audit.log_transaction_start_at(
            execution_id,
            definition.name(),
            execution.initial_context(),
            execution.started_at(),
        );
        self.persist(&execution).await;

        for (index, step) in definition.steps().iter().enumerate() {
            execution.begin_step(index);
            self.persist(&execution).await;
            self.audit.log_step_execution(
                execution_id,
                step.name(),
                AuditStatus::Started,
                "Executing step",
                execution.context(),
            );
            tracing::info!(step = step.name(), index, "saga step started");

            let reason = match self.run_step(&definition, step, &mut execution).await {
                Ok(()) => {
                    execution.mark_step_completed(index);
                    self.persist(&execution).await;
                    self.monitor
                        .record_step_completed(execution_id, step.name(), true, None);
                    self.audit.log_step_execution(
                        execution_id,
                        step.name(),
                        AuditStatus::Success,
                        "Step completed",
                        execution.context(),
                    );
                    tracing::info!(step = step.name(), index, "saga step completed");
                    continue;
                }
                Err(reason) => reason,
            };

            metrics::counter!(
                "saga_step_failures_total",
                "criticality" => step.criticality().as_str()
            )
            .increment(1);
            self.monitor
                .record_step_completed(execution_id, step.name(), false, Some(&reason));
            self.audit.log_step_execution(
                execution_id,
                step.name(),
                AuditStatus::Failure,
                reason.clone(),
                execution.context(),
            );

            match step.criticality() {
                Criticality::BestEffort => {
                    tracing::warn!(
                        step = step.name(),
                        index,
                        error = %reason,
                        "best-effort step failed, continuing"
                    );
                    execution
                        .context_mut()
                        .record_best_effort_failure(step.name(), &reason);
                    self.persist(&execution).await;
                }
                Criticality::Critical => {
                    tracing::warn!(
                        step = step.name(),
                        index,
                        error = %reason,
                        "critical step failed, compensating"
                    );
                    execution.begin_compensation(reason.clone());
                    self.persist(&execution).await;

                    let clean = self.compensate(&definition, &mut execution, index).await;
                    let final_status = if clean {
                        SagaStatus::Compensated
                    } else {
                        SagaStatus::Failed
                    };
                    execution.finish(final_status);
                    self.persist(&execution).await;

                    self.monitor
                        .record_transaction_completed(execution_id, false, Some(&reason));
                    self.audit.log_transaction_end(
                        execution_id,
                        final_status,
                        format!("Saga failed at step {}: {reason}", step.name()),
                    );

                    match final_status {
                        SagaStatus::Compensated => metrics::counter!("saga_compensated").increment(1),
                        _ => metrics::counter!("saga_failed").increment(1),
                    }
                    metrics::histogram!("saga_duration_seconds")
                        .record(saga_start.elapsed().as_secs_f64());
                    tracing::warn!(%execution_id, status = %final_status, error = %reason, "saga failed");

                    return Ok(SagaExecutionResult::failed(execution_id, reason));
                }
            }
        }

        execution.finish(SagaStatus::Completed);
        self.persist(&execution).await;

        self.monitor
            .record_transaction_completed(execution_id, true, None);
        self.audit.log_transaction_end(
            execution_id,
            SagaStatus::Completed,
            "Saga completed successfully",
        );

        metrics::counter!("saga_completed").increment(1);
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        tracing::info!(%execution_id, "saga completed");

        Ok(SagaExecutionResult::succeeded(
            execution_id,
            execution.context().clone(),
        ))
    }

    /// Loads the persisted record of an execution.
    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<Option<SagaExecution>> {
        Ok(self.store.find_by_id(execution_id).await?)
    }

    /// Runs one forward action and returns the failure reason, if any.
    ///
    /// Steps that opt into retries run through the retry executor on a copy
    /// of the context; the copy from the successful attempt replaces the
    /// execution context. Other steps run once, directly on the execution
    /// context.
    async fn run_step(
        &self,
        definition: &SagaDefinition,
        step: &Arc<dyn SagaStep>,
        execution: &mut SagaExecution,
    ) -> std::result::Result<(), String> {
        if !step.retryable() {
            return match AssertUnwindSafe(step.execute(execution.context_mut()))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(panic_reason(step.name(), payload.as_ref())),
            };
        }

        let base = execution.context().clone();
        let outcome = self
            .retry
            .execute_with_retry_timeout(
                step.name(),
                definition.max_retries().saturating_add(1),
                definition.timeout(),
                || {
                    let step = Arc::clone(step);
                    let mut ctx = base.clone();
                    async move {
                        match AssertUnwindSafe(step.execute(&mut ctx)).catch_unwind().await {
                            Ok(Ok(())) => Ok(ctx),
                            Ok(Err(e)) => Err(e),
                            Err(payload) => Err(StepError::fatal(
                                step.name(),
                                panic_reason(step.name(), payload.as_ref()),
                            )),
                        }
                    }
                },
            )
            .await;

        match outcome {
            Ok(ctx) => {
                execution.set_context(ctx);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Compensates completed steps before `failed_index`, last first.
    ///
    /// Every completed step is compensated exactly once even if earlier
    /// compensations fail. Returns false if a compensation panicked.
    async fn compensate(
        &self,
        definition: &SagaDefinition,
        execution: &mut SagaExecution,
        failed_index: usize,
    ) -> bool {
        let execution_id = execution.id();
        let completed = execution.completed_steps().clone();
        let mut clean = true;

        for index in (0..failed_index).rev() {
            if !completed.contains(&index) {
                continue;
            }
            let Some(step) = definition.step(index) else {
                continue;
            };

            tracing::info!(step = step.name(), index, "compensating step");
            let outcome = AssertUnwindSafe(step.compensate(execution.context_mut()))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => {
                    clean = false;
                    Some(panic_reason(step.name(), payload.as_ref()))
                }
            };

            match error {
                None => {
                    self.monitor
                        .record_compensation(execution_id, step.name(), true, None);
                    self.audit.log_compensation(
                        execution_id,
                        step.name(),
                        true,
                        "Compensation completed",
                    );
                }
                Some(reason) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::warn!(step = step.name(), index, error = %reason, "compensation failed");
                    self.monitor
                        .record_compensation(execution_id, step.name(), false, Some(&reason));
                    self.audit
                        .log_compensation(execution_id, step.name(), false, reason);
                }
            }
            self.persist(execution).await;
        }

        clean
    }

    /// Saves the execution; failures are reported but never abort the run.
    async fn persist(&self, execution: &SagaExecution) {
        if let Err(e) = self.store.save(execution).await {
            metrics::counter!("saga_state_persist_failures_total").increment(1);
            tracing::warn!(
                execution_id = %execution.id(),
                status = %execution.status(),
                error = %e,
                "failed to persist saga state"
            );
            self.audit
                .log_error(execution.id(), "persist_state", e.to_string());
        }
    }
}

fn panic_reason(step: &str, payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("Step {step} panicked: {message}")
}
