//! Saga orchestration for multi-step operations across independently
//! failing collaborators.
//!
//! A saga is a named, ordered list of [`SagaStep`]s. Each step has a
//! forward action and a compensating action. The [`SagaOrchestrator`] runs
//! the forward actions in order on a shared [`SagaContext`]; when a
//! critical step fails, the steps that already completed are compensated in
//! reverse order. Best-effort steps may fail without affecting the outcome.
//!
//! Every status transition is written to a [`SagaStateStore`]. A
//! [`TransactionMonitor`] tracks in-flight runs and flags stuck ones, and an
//! [`AuditLogger`] keeps a per-run history.
//!
//! The [`workflows`] module contains two reference sagas, publish-article
//! and publish-comment, built on the collaborator traits in [`services`].

pub mod audit;
pub mod context;
pub mod definition;
pub mod error;
pub mod execution;
pub mod memory;
pub mod monitor;
pub mod orchestrator;
pub mod postgres;
pub mod registry;
pub mod retry;
pub mod services;
pub mod state;
pub mod step;
pub mod store;
pub mod workflows;

pub use audit::{AuditEntry, AuditLogger, AuditSink, AuditStatus, TracingAuditSink, TransactionAuditLog};
pub use context::SagaContext;
pub use definition::{SagaDefinition, SagaDefinitionBuilder};
pub use error::{ContextError, RetryError, SagaError, ServiceError, StepError, StepResult, StoreError};
pub use execution::{SagaExecution, SagaExecutionResult};
pub use memory::InMemorySagaStateStore;
pub use monitor::{Alert, AlertSink, TracingAlertSink, TrackedTransaction, TransactionMonitor};
pub use orchestrator::SagaOrchestrator;
pub use postgres::PostgresSagaStateStore;
pub use registry::SagaRegistry;
pub use retry::{RetryConfig, RetryExecutor};
pub use state::SagaStatus;
pub use step::{Criticality, SagaStep};
pub use store::{SagaStateStore, SagaStateStoreExt, StoreResult};
