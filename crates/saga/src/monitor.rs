//! In-flight transaction tracking and alerting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::ExecutionId;
use dashmap::DashMap;

/// Something the monitor wants an operator to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// A forward step failed.
    StepFailed {
        execution_id: ExecutionId,
        saga_name: String,
        step: String,
        error: String,
    },
    /// A saga finished unsuccessfully.
    TransactionFailed {
        execution_id: ExecutionId,
        saga_name: String,
        error: String,
    },
    /// A compensating action failed.
    CompensationFailed {
        execution_id: ExecutionId,
        saga_name: String,
        step: String,
        error: String,
    },
    /// A tracked saga exceeded the age threshold without finishing.
    TransactionTimedOut {
        execution_id: ExecutionId,
        saga_name: String,
        started_at: DateTime<Utc>,
        age: Duration,
    },
}

impl Alert {
    /// Short machine-friendly alert kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::StepFailed { .. } => "step_failed",
            Alert::TransactionFailed { .. } => "transaction_failed",
            Alert::CompensationFailed { .. } => "compensation_failed",
            Alert::TransactionTimedOut { .. } => "transaction_timed_out",
        }
    }

    /// The execution this alert is about.
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Alert::StepFailed { execution_id, .. }
            | Alert::TransactionFailed { execution_id, .. }
            | Alert::CompensationFailed { execution_id, .. }
            | Alert::TransactionTimedOut { execution_id, .. } => *execution_id,
        }
    }
}

/// Destination for monitor alerts (pager, chat, metrics, ...).
///
/// Implementations must not block; the monitor calls them inline.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Default sink: logs the alert and counts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: Alert) {
        metrics::counter!("saga_alerts_total", "kind" => alert.kind()).increment(1);
        match &alert {
            Alert::StepFailed {
                execution_id,
                saga_name,
                step,
                error,
            } => {
                tracing::error!(%execution_id, saga = %saga_name, %step, %error, "ALERT: saga step failed");
            }
            Alert::TransactionFailed {
                execution_id,
                saga_name,
                error,
            } => {
                tracing::error!(%execution_id, saga = %saga_name, %error, "ALERT: saga transaction failed");
            }
            Alert::CompensationFailed {
                execution_id,
                saga_name,
                step,
                error,
            } => {
                tracing::error!(%execution_id, saga = %saga_name, %step, %error, "ALERT: compensation failed");
            }
            Alert::TransactionTimedOut {
                execution_id,
                saga_name,
                started_at,
                age,
            } => {
                tracing::error!(
                    %execution_id,
                    saga = %saga_name,
                    %started_at,
                    age_secs = age.as_secs(),
                    "ALERT: saga transaction timed out"
                );
            }
        }
    }
}

/// A step outcome seen by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub step: String,
    pub success: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Lightweight mirror of an in-flight saga.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTransaction {
    pub execution_id: ExecutionId,
    pub saga_name: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepEvent>,
    pub compensations: Vec<StepEvent>,
}

impl TrackedTransaction {
    /// Age of the transaction relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Tracks currently executing sagas and raises alerts.
///
/// Independent of the state store, so monitoring keeps working when
/// persistence is degraded. Entries are transient: they are evicted when the
/// transaction completes or when the timeout sweep gives up on them. Clones
/// share the same in-flight map and sink.
#[derive(Clone)]
pub struct TransactionMonitor {
    active: Arc<DashMap<ExecutionId, TrackedTransaction>>,
    sink: Arc<dyn AlertSink>,
}

impl Default for TransactionMonitor {
    fn default() -> Self {
        Self::new(Arc::new(TracingAlertSink))
    }
}

impl TransactionMonitor {
    /// Creates a monitor that sends alerts to `sink`.
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            sink,
        }
    }

    /// Starts tracking a transaction now.
    pub fn record_transaction_start(&self, execution_id: ExecutionId, saga_name: &str) {
        self.record_transaction_start_at(execution_id, saga_name, Utc::now());
    }

    /// Starts tracking a transaction with an externally recorded start time.
    pub fn record_transaction_start_at(
        &self,
        execution_id: ExecutionId,
        saga_name: &str,
        started_at: DateTime<Utc>,
    ) {
        self.active.insert(
            execution_id,
            TrackedTransaction {
                execution_id,
                saga_name: saga_name.to_string(),
                started_at,
                steps: Vec::new(),
                compensations: Vec::new(),
            },
        );
        self.update_gauge();
        tracing::debug!(%execution_id, saga = %saga_name, "tracking transaction");
    }

    /// Records a step outcome; alerts on failure.
    pub fn record_step_completed(
        &self,
        execution_id: ExecutionId,
        step: &str,
        success: bool,
        error: Option<&str>,
    ) {
        let saga_name = self.push_event(execution_id, step, success, error, false);
        if !success {
            self.sink.alert(Alert::StepFailed {
                execution_id,
                saga_name: saga_name.unwrap_or_default(),
                step: step.to_string(),
                error: error.unwrap_or("unknown error").to_string(),
            });
        }
    }

    /// Records a compensation outcome; alerts on failure.
    pub fn record_compensation(
        &self,
        execution_id: ExecutionId,
        step: &str,
        success: bool,
        error: Option<&str>,
    ) {
        let saga_name = self.push_event(execution_id, step, success, error, true);
        if !success {
            self.sink.alert(Alert::CompensationFailed {
                execution_id,
                saga_name: saga_name.unwrap_or_default(),
                step: step.to_string(),
                error: error.unwrap_or("unknown error").to_string(),
            });
        }
    }

    /// Records the final outcome and stops tracking the transaction.
    ///
    /// Alerts when the transaction did not succeed.
    pub fn record_transaction_completed(
        &self,
        execution_id: ExecutionId,
        success: bool,
        error: Option<&str>,
    ) {
        let removed = self.active.remove(&execution_id).map(|(_, t)| t);
        self.update_gauge();

        if !success {
            self.sink.alert(Alert::TransactionFailed {
                execution_id,
                saga_name: removed.map(|t| t.saga_name).unwrap_or_default(),
                error: error.unwrap_or("unknown error").to_string(),
            });
        }
    }

    /// Evicts and alerts on every tracked transaction older than `max_age`.
    ///
    /// Meant to be called periodically. Stuck transactions are reported, not
    /// unwound. Returns the evicted execution IDs.
    pub fn check_timeout_transactions(&self, max_age: Duration) -> Vec<ExecutionId> {
        self.check_timeout_transactions_at(max_age, Utc::now())
    }

    /// Like [`check_timeout_transactions`](Self::check_timeout_transactions)
    /// with an explicit notion of "now".
    pub fn check_timeout_transactions_at(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ExecutionId> {
        let expired: Vec<ExecutionId> = self
            .active
            .iter()
            .filter(|entry| entry.value().age(now) > max_age)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for execution_id in expired {
            // Re-check under the shard lock; the transaction may have finished meanwhile.
            if let Some((_, tracked)) = self
                .active
                .remove_if(&execution_id, |_, t| t.age(now) > max_age)
            {
                let age = tracked.age(now);
                self.sink.alert(Alert::TransactionTimedOut {
                    execution_id,
                    saga_name: tracked.saga_name,
                    started_at: tracked.started_at,
                    age,
                });
                evicted.push(execution_id);
            }
        }

        if !evicted.is_empty() {
            tracing::warn!(count = evicted.len(), "evicted timed-out transactions");
            self.update_gauge();
        }
        evicted
    }

    /// Returns a snapshot of one tracked transaction.
    pub fn get(&self, execution_id: ExecutionId) -> Option<TrackedTransaction> {
        self.active.get(&execution_id).map(|t| t.value().clone())
    }

    /// Returns a snapshot of every tracked transaction, oldest first.
    pub fn active_transactions(&self) -> Vec<TrackedTransaction> {
        let mut all: Vec<TrackedTransaction> =
            self.active.iter().map(|t| t.value().clone()).collect();
        all.sort_by_key(|t| t.started_at);
        all
    }

    /// Returns the number of tracked transactions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn push_event(
        &self,
        execution_id: ExecutionId,
        step: &str,
        success: bool,
        error: Option<&str>,
        compensation: bool,
    ) -> Option<String> {
        let mut tracked = self.active.get_mut(&execution_id)?;
        let event = StepEvent {
            step: step.to_string(),
            success,
            error: error.map(str::to_string),
            at: Utc::now(),
        };
        if compensation {
            tracked.compensations.push(event);
        } else {
            tracked.steps.push(event);
        }
        Some(tracked.saga_name.clone())
    }

    fn update_gauge(&self) {
        metrics::gauge!("saga_active_transactions").set(self.active.len() as f64);
    }
}
