//! Append-only, per-transaction audit trail.
//!
//! The state store answers "where is this saga now"; the audit log answers
//! "what happened, in which order". Logs outlive the monitor's in-flight
//! entries and are purged only by [`AuditLogger::cleanup_expired_logs`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::ExecutionId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::context::SagaContext;
use crate::state::SagaStatus;

/// Tracing target used by [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "saga_audit";

/// Operation names recorded by the logger itself.
pub const OP_TRANSACTION_START: &str = "transaction_start";
pub const OP_TRANSACTION_END: &str = "transaction_end";

/// Outcome recorded in an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Started,
    Success,
    Failure,
    Compensated,
    CompensationFailed,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Started => "STARTED",
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
            AuditStatus::Compensated => "COMPENSATED",
            AuditStatus::CompensationFailed => "COMPENSATION_FAILED",
            AuditStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of a transaction's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub operation: String,
    pub status: AuditStatus,
    pub message: String,
    /// Snapshot of relevant context values at the time of the entry.
    pub context: SagaContext,
    pub timestamp: DateTime<Utc>,
}

/// The full history of one saga execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAuditLog {
    pub execution_id: ExecutionId,
    pub saga_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub final_status: Option<SagaStatus>,
    pub entries: Vec<AuditEntry>,
}

impl TransactionAuditLog {
    fn new(execution_id: ExecutionId, saga_type: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_id,
            saga_type: saga_type.to_string(),
            started_at,
            ended_at: None,
            final_status: None,
            entries: Vec::new(),
        }
    }

    /// Returns the entries recorded for `operation`, in order.
    pub fn entries_for(&self, operation: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.operation == operation)
            .collect()
    }
}

/// External destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, execution_id: ExecutionId, saga_type: &str, entry: &AuditEntry);
}

/// Default sink: one line per entry on the [`AUDIT_TARGET`] tracing target.
///
/// Format: `AUDIT|tx=<id>|saga=<name>|op=<operation>|status=<status>|msg=<message>`.
/// Pipes and newlines in the message are escaped so the line stays parseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, execution_id: ExecutionId, saga_type: &str, entry: &AuditEntry) {
        tracing::info!(target: AUDIT_TARGET, "{}", format_audit_line(execution_id, saga_type, entry));
    }
}

/// Renders an entry in the fixed audit line format.
pub fn format_audit_line(execution_id: ExecutionId, saga_type: &str, entry: &AuditEntry) -> String {
    format!(
        "AUDIT|tx={}|saga={}|op={}|status={}|msg={}",
        execution_id,
        escape(saga_type),
        escape(&entry.operation),
        entry.status,
        escape(&entry.message)
    )
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('\n', "\\n")
}

/// Append-only audit logger keyed by execution ID.
///
/// Clones share the same logs and sink.
#[derive(Clone)]
pub struct AuditLogger {
    logs: Arc<DashMap<ExecutionId, TransactionAuditLog>>,
    sink: Arc<dyn AuditSink>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl AuditLogger {
    /// Creates a logger that also forwards every entry to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            logs: Arc::new(DashMap::new()),
            sink,
        }
    }

    /// Opens the log for a new transaction and records its start.
    pub fn log_transaction_start(
        &self,
        execution_id: ExecutionId,
        saga_type: &str,
        initial_context: &SagaContext,
    ) {
        self.log_transaction_start_at(execution_id, saga_type, initial_context, Utc::now());
    }

    /// Opens the log with an explicit start time.
    pub fn log_transaction_start_at(
        &self,
        execution_id: ExecutionId,
        saga_type: &str,
        initial_context: &SagaContext,
        started_at: DateTime<Utc>,
    ) {
        self.logs
            .entry(execution_id)
            .or_insert_with(|| TransactionAuditLog::new(execution_id, saga_type, started_at));
        self.append(
            execution_id,
            OP_TRANSACTION_START,
            AuditStatus::Started,
            format!("Saga {saga_type} started"),
            initial_context.clone(),
        );
    }

    /// Records a forward step outcome.
    pub fn log_step_execution(
        &self,
        execution_id: ExecutionId,
        step: &str,
        status: AuditStatus,
        message: impl Into<String>,
        context: &SagaContext,
    ) {
        self.append(execution_id, step, status, message.into(), context.clone());
    }

    /// Records a compensation outcome.
    pub fn log_compensation(
        &self,
        execution_id: ExecutionId,
        step: &str,
        success: bool,
        message: impl Into<String>,
    ) {
        let status = if success {
            AuditStatus::Compensated
        } else {
            AuditStatus::CompensationFailed
        };
        self.append(
            execution_id,
            &format!("compensate:{step}"),
            status,
            message.into(),
            SagaContext::new(),
        );
    }

    /// Records the final status and closes the log.
    pub fn log_transaction_end(
        &self,
        execution_id: ExecutionId,
        final_status: SagaStatus,
        message: impl Into<String>,
    ) {
        let status = match final_status {
            SagaStatus::Completed => AuditStatus::Success,
            SagaStatus::Compensated => AuditStatus::Compensated,
            _ => AuditStatus::Failure,
        };
        self.append(
            execution_id,
            OP_TRANSACTION_END,
            status,
            message.into(),
            SagaContext::new(),
        );
        if let Some(mut log) = self.logs.get_mut(&execution_id) {
            log.ended_at = Some(Utc::now());
            log.final_status = Some(final_status);
        }
    }

    /// Records an error that is not tied to a step outcome (e.g. persistence).
    pub fn log_error(&self, execution_id: ExecutionId, operation: &str, error: impl Into<String>) {
        self.append(
            execution_id,
            operation,
            AuditStatus::Error,
            error.into(),
            SagaContext::new(),
        );
    }

    /// Returns a copy of the log for `execution_id`.
    pub fn get_log(&self, execution_id: ExecutionId) -> Option<TransactionAuditLog> {
        self.logs.get(&execution_id).map(|l| l.value().clone())
    }

    /// Returns the number of retained logs.
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    /// Purges logs that started more than `retention` ago. Returns how many were removed.
    pub fn cleanup_expired_logs(&self, retention: Duration) -> usize {
        self.cleanup_expired_logs_at(retention, Utc::now())
    }

    /// Like [`cleanup_expired_logs`](Self::cleanup_expired_logs) with an explicit "now".
    pub fn cleanup_expired_logs_at(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let before = self.logs.len();
        self.logs.retain(|_, log| log.started_at >= cutoff);
        let removed = before.saturating_sub(self.logs.len());

        if removed > 0 {
            tracing::info!(removed, "purged expired audit logs");
        }
        removed
    }

    fn append(
        &self,
        execution_id: ExecutionId,
        operation: &str,
        status: AuditStatus,
        message: String,
        context: SagaContext,
    ) {
        let entry = AuditEntry {
            operation: operation.to_string(),
            status,
            message,
            context,
            timestamp: Utc::now(),
        };

        // Entries for unknown transactions get a log opened on the fly.
        let mut log = self.logs.entry(execution_id).or_insert_with(|| {
            TransactionAuditLog::new(execution_id, "unknown", entry.timestamp)
        });
        let saga_type = log.saga_type.clone();
        log.entries.push(entry.clone());
        drop(log);

        metrics::counter!("audit_entries_total").increment(1);
        self.sink.record(execution_id, &saga_type, &entry);
    }
}
