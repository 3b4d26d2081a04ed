//! Periodic sweep for stuck transactions, expired audit logs and old
//! execution records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::ExecutionId;
use saga::{SagaOrchestrator, SagaStateStore};
use tokio::time::MissedTickBehavior;

use crate::config::Config;

/// Thresholds for one maintenance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSettings {
    /// Age after which an unfinished transaction is reported and evicted.
    pub stuck_threshold: Duration,
    /// How long audit logs are kept.
    pub audit_retention: Duration,
    /// How long finished execution records are kept; `None` keeps them.
    pub execution_retention: Option<Duration>,
}

impl From<&Config> for MaintenanceSettings {
    fn from(config: &Config) -> Self {
        Self {
            stuck_threshold: config.stuck_threshold,
            audit_retention: config.audit_retention,
            execution_retention: config.execution_retention,
        }
    }
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Transactions evicted by the monitor's timeout sweep.
    pub timed_out: Vec<ExecutionId>,
    /// Number of audit logs removed by the retention purge.
    pub purged_audit_logs: usize,
    /// Number of finished execution records removed from the state store.
    pub purged_executions: usize,
}

/// Runs a single maintenance pass.
///
/// A failing state store purge is logged and reported as zero removals; the
/// other sweeps still run.
pub async fn run_once(
    orchestrator: &SagaOrchestrator,
    settings: &MaintenanceSettings,
) -> MaintenanceReport {
    let timed_out = orchestrator
        .monitor()
        .check_timeout_transactions(settings.stuck_threshold);
    let purged_audit_logs = orchestrator
        .audit()
        .cleanup_expired_logs(settings.audit_retention);

    let purged_executions = match settings.execution_retention {
        Some(retention) => {
            let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
            let cutoff = Utc::now()
                .checked_sub_signed(retention)
                .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
            match orchestrator.store().purge_finished_before(cutoff).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to purge finished executions");
                    0
                }
            }
        }
        None => 0,
    };

    metrics::counter!("saga_maintenance_runs_total").increment(1);
    metrics::counter!("saga_timeouts_detected_total").increment(timed_out.len() as u64);
    metrics::counter!("audit_logs_purged_total").increment(purged_audit_logs as u64);
    metrics::counter!("saga_executions_purged_total").increment(purged_executions as u64);

    if !timed_out.is_empty() || purged_audit_logs > 0 || purged_executions > 0 {
        tracing::info!(
            timed_out = timed_out.len(),
            purged_audit_logs,
            purged_executions,
            "maintenance pass finished"
        );
    }

    MaintenanceReport {
        timed_out,
        purged_audit_logs,
        purged_executions,
    }
}

/// Runs [`run_once`] every `interval` until the task is aborted.
pub async fn run_loop(
    orchestrator: Arc<SagaOrchestrator>,
    interval: Duration,
    settings: MaintenanceSettings,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    tracing::info!(interval_secs = interval.as_secs(), "maintenance loop started");
    loop {
        ticker.tick().await;
        run_once(&orchestrator, &settings).await;
    }
}
