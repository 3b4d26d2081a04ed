//! Integration tests for the saga orchestrator.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::ExecutionId;
use saga::{
    Alert, AlertSink, AuditLogger, AuditStatus, InMemorySagaStateStore, RetryExecutor,
    SagaContext, SagaDefinition, SagaError, SagaExecution, SagaOrchestrator, SagaRegistry,
    SagaStateStore, SagaStateStoreExt, SagaStatus, SagaStep, StepError, StepResult,
    TransactionMonitor,
};

type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingSink {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// A step that logs every call and can be told to fail.
struct ScriptedStep {
    name: String,
    order: i32,
    calls: CallLog,
    fail_execute: bool,
    fail_compensate: bool,
}

impl ScriptedStep {
    fn new(name: &str, calls: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            order: 0,
            calls: calls.clone(),
            fail_execute: false,
            fail_compensate: false,
        }
    }

    fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn failing(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    fn failing_compensation(mut self) -> Self {
        self.fail_compensate = true;
        self
    }
}

#[async_trait]
impl SagaStep for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        self.calls
            .lock()
            .unwrap()
            .push(format!("execute:{}", self.name));
        if self.fail_execute {
            return Err(StepError::failed(
                &self.name,
                format!("{} rejected the request", self.name),
            ));
        }
        ctx.insert(&format!("{}_done", self.name), true);
        Ok(())
    }

    async fn compensate(&self, _ctx: &mut SagaContext) -> StepResult {
        self.calls
            .lock()
            .unwrap()
            .push(format!("compensate:{}", self.name));
        if self.fail_compensate {
            return Err(StepError::failed(&self.name, "rollback endpoint unreachable"));
        }
        Ok(())
    }
}

struct TestHarness {
    orchestrator: Arc<SagaOrchestrator>,
    store: Arc<InMemorySagaStateStore>,
    alerts: Arc<RecordingSink>,
    calls: CallLog,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(InMemorySagaStateStore::new());
        let alerts = Arc::new(RecordingSink::default());
        let orchestrator = SagaOrchestrator::new(
            SagaRegistry::new(),
            store.clone(),
            TransactionMonitor::new(alerts.clone()),
            AuditLogger::default(),
            RetryExecutor::default(),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            store,
            alerts,
            calls: CallLog::default(),
        }
    }

    fn register(&self, name: &str, steps: Vec<ScriptedStep>) {
        let mut builder = SagaDefinition::builder(name);
        for step in steps {
            builder = builder.step(step);
        }
        self.orchestrator
            .register_saga(builder.build().unwrap())
            .unwrap();
    }

    fn step(&self, name: &str) -> ScriptedStep {
        ScriptedStep::new(name, &self.calls)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn status_of(&self, id: ExecutionId) -> SagaStatus {
        self.store.find_by_id(id).await.unwrap().unwrap().status()
    }
}

#[tokio::test]
async fn test_successful_saga_runs_steps_in_declared_order() {
    let h = TestHarness::new();
    h.register(
        "three-steps",
        vec![h.step("reserve"), h.step("charge"), h.step("ship")],
    );

    let result = h
        .orchestrator
        .execute("three-steps", SagaContext::new())
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.error_message.is_none());
    assert_eq!(
        h.calls(),
        vec!["execute:reserve", "execute:charge", "execute:ship"]
    );

    let execution = h.store.find_by_id(result.execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status(), SagaStatus::Completed);
    assert_eq!(execution.completed_steps(), &BTreeSet::from([0, 1, 2]));
    assert!(execution.ended_at().is_some());

    let ctx = result.context.unwrap();
    for key in ["reserve_done", "charge_done", "ship_done"] {
        assert_eq!(ctx.get::<bool>(key), Some(true), "{key}");
    }
}

#[tokio::test]
async fn test_order_key_sorts_steps_stably() {
    let h = TestHarness::new();
    h.register(
        "ordered",
        vec![
            h.step("third").with_order(3),
            h.step("first").with_order(1),
            h.step("second_a").with_order(2),
            h.step("second_b").with_order(2),
        ],
    );

    h.orchestrator
        .execute("ordered", SagaContext::new())
        .await
        .unwrap();

    assert_eq!(
        h.calls(),
        vec![
            "execute:first",
            "execute:second_a",
            "execute:second_b",
            "execute:third"
        ]
    );
}

#[tokio::test]
async fn test_middle_step_failure_compensates_only_earlier_steps() {
    let h = TestHarness::new();
    h.register(
        "fails-in-middle",
        vec![h.step("reserve"), h.step("charge").failing(), h.step("ship")],
    );

    let result = h
        .orchestrator
        .execute("fails-in-middle", SagaContext::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.error_message.as_deref(),
        Some("charge rejected the request")
    );
    assert!(result.context.is_none());
    assert_eq!(
        h.calls(),
        vec!["execute:reserve", "execute:charge", "compensate:reserve"]
    );
    assert_eq!(h.status_of(result.execution_id).await, SagaStatus::Compensated);
}

#[tokio::test]
async fn test_compensations_run_in_strictly_descending_order() {
    let h = TestHarness::new();
    h.register(
        "long",
        vec![
            h.step("s1"),
            h.step("s2"),
            h.step("s3"),
            h.step("s4"),
            h.step("s5").failing(),
        ],
    );

    h.orchestrator
        .execute("long", SagaContext::new())
        .await
        .unwrap();

    let compensations: Vec<String> = h
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("compensate:"))
        .collect();
    assert_eq!(
        compensations,
        vec![
            "compensate:s4",
            "compensate:s3",
            "compensate:s2",
            "compensate:s1"
        ]
    );
}

#[tokio::test]
async fn test_first_step_failure_compensates_nothing() {
    let h = TestHarness::new();
    h.register("fails-first", vec![h.step("a").failing(), h.step("b")]);

    let result = h
        .orchestrator
        .execute("fails-first", SagaContext::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(h.calls(), vec!["execute:a"]);
    assert_eq!(h.status_of(result.execution_id).await, SagaStatus::Compensated);
}

#[tokio::test]
async fn test_failing_compensation_does_not_abort_walk() {
    let h = TestHarness::new();
    h.register(
        "flaky-rollback",
        vec![
            h.step("a"),
            h.step("b").failing_compensation(),
            h.step("c"),
            h.step("d").failing(),
        ],
    );

    let result = h
        .orchestrator
        .execute("flaky-rollback", SagaContext::new())
        .await
        .unwrap();

    assert_eq!(
        h.calls()[4..],
        ["compensate:c", "compensate:b", "compensate:a"]
    );
    assert_eq!(h.status_of(result.execution_id).await, SagaStatus::Compensated);

    let compensation_alerts: Vec<Alert> = h
        .alerts
        .alerts()
        .into_iter()
        .filter(|a| matches!(a, Alert::CompensationFailed { .. }))
        .collect();
    assert_eq!(compensation_alerts.len(), 1);
    assert!(matches!(
        &compensation_alerts[0],
        Alert::CompensationFailed { step, .. } if step == "b"
    ));
}

#[tokio::test]
async fn test_unknown_saga_invokes_no_steps() {
    let h = TestHarness::new();
    h.register("known", vec![h.step("a")]);

    let err = h
        .orchestrator
        .execute("nonexistent", SagaContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::SagaNotFound(_)));
    assert!(h.calls().is_empty());
    assert!(h.store.is_empty());
    assert_eq!(h.orchestrator.monitor().active_count(), 0);
}

#[tokio::test]
async fn test_failure_raises_step_and_transaction_alerts() {
    let h = TestHarness::new();
    h.register("alerting", vec![h.step("a"), h.step("b").failing()]);

    let result = h
        .orchestrator
        .execute("alerting", SagaContext::new())
        .await
        .unwrap();

    let kinds: Vec<&str> = h.alerts.alerts().iter().map(Alert::kind).collect();
    assert_eq!(kinds, vec!["step_failed", "transaction_failed"]);
    assert!(
        h.alerts
            .alerts()
            .iter()
            .all(|a| a.execution_id() == result.execution_id)
    );
    assert_eq!(h.orchestrator.monitor().active_count(), 0);
}

#[tokio::test]
async fn test_audit_log_records_full_history() {
    let h = TestHarness::new();
    h.register("audited", vec![h.step("a"), h.step("b").failing()]);

    let result = h
        .orchestrator
        .execute("audited", SagaContext::new().with("request_id", "r-42"))
        .await
        .unwrap();

    let log = h.orchestrator.audit().get_log(result.execution_id).unwrap();
    assert_eq!(log.saga_type, "audited");
    assert_eq!(log.final_status, Some(SagaStatus::Compensated));
    assert!(log.ended_at.is_some());

    let operations: Vec<(&str, AuditStatus)> = log
        .entries
        .iter()
        .map(|e| (e.operation.as_str(), e.status))
        .collect();
    assert_eq!(
        operations,
        vec![
            ("transaction_start", AuditStatus::Started),
            ("a", AuditStatus::Started),
            ("a", AuditStatus::Success),
            ("b", AuditStatus::Started),
            ("b", AuditStatus::Failure),
            ("compensate:a", AuditStatus::Compensated),
            ("transaction_end", AuditStatus::Compensated),
        ]
    );
    assert_eq!(
        log.entries[0].context.get::<String>("request_id").as_deref(),
        Some("r-42")
    );
}

#[tokio::test]
async fn test_registering_same_name_twice_fails() {
    let h = TestHarness::new();
    h.register("dup", vec![h.step("a")]);

    let err = h
        .orchestrator
        .register_saga(SagaDefinition::builder("dup").step(h.step("b")).build().unwrap())
        .unwrap_err();
    assert!(matches!(err, SagaError::DuplicateSaga(_)));
}

/// Step that echoes the caller's request into keys only that run should see.
struct EchoStep {
    name: &'static str,
}

#[async_trait]
impl SagaStep for EchoStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let request: u32 = ctx.require("request")?;
        let mut seen: Vec<u32> = ctx.get("seen").unwrap_or_default();
        seen.push(request);
        ctx.insert("seen", seen);
        tokio::task::yield_now().await;
        ctx.insert(&format!("{}_{request}", self.name), request);
        if request % 5 == 0 {
            return Err(StepError::failed(self.name, format!("request {request} rejected")));
        }
        Ok(())
    }

    async fn compensate(&self, _ctx: &mut SagaContext) -> StepResult {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_are_isolated() {
    let h = TestHarness::new();
    h.orchestrator
        .register_saga(
            SagaDefinition::builder("echo")
                .step(EchoStep { name: "first" })
                .step(EchoStep { name: "second" })
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut handles = Vec::new();
    for request in 1..=40u32 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let ctx = SagaContext::new().with("request", request);
            (request, orchestrator.execute("echo", ctx).await.unwrap())
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let (request, result) = handle.await.unwrap();
        assert!(ids.insert(result.execution_id));

        let execution = h.store.find_by_id(result.execution_id).await.unwrap().unwrap();
        assert_eq!(
            execution.initial_context().get::<u32>("request"),
            Some(request)
        );

        if request % 5 == 0 {
            assert!(!result.success);
            assert_eq!(execution.status(), SagaStatus::Compensated);
            assert_eq!(execution.completed_steps(), &BTreeSet::new());
        } else {
            assert!(result.success);
            let ctx = result.context.unwrap();
            assert_eq!(ctx.get::<Vec<u32>>("seen"), Some(vec![request, request]));
            // Three keys from the steps plus the input.
            assert_eq!(ctx.len(), 4);
            assert_eq!(execution.completed_steps(), &BTreeSet::from([0, 1]));
        }
    }

    assert_eq!(ids.len(), 40);
    assert_eq!(h.store.len(), 40);
    assert!(h.store.find_unfinished().await.unwrap().is_empty());
    assert_eq!(h.orchestrator.monitor().active_count(), 0);
}

#[test]
fn test_stuck_transaction_is_evicted_with_single_alert() {
    let alerts = Arc::new(RecordingSink::default());
    let monitor = TransactionMonitor::new(alerts.clone());

    let stuck = ExecutionId::new();
    let fresh = ExecutionId::new();
    let now = Utc::now();
    monitor.record_transaction_start_at(stuck, "publish-article", now - chrono::Duration::minutes(45));
    monitor.record_transaction_start_at(fresh, "publish-article", now - chrono::Duration::minutes(5));

    let evicted = monitor.check_timeout_transactions_at(Duration::from_secs(30 * 60), now);

    assert_eq!(evicted, vec![stuck]);
    assert!(monitor.get(stuck).is_none());
    assert!(monitor.get(fresh).is_some());

    let fired = alerts.alerts();
    assert_eq!(fired.len(), 1);
    assert!(matches!(
        &fired[0],
        Alert::TransactionTimedOut { execution_id, age, .. }
            if *execution_id == stuck && *age >= Duration::from_secs(45 * 60)
    ));

    // A second sweep finds nothing left to report.
    assert!(monitor.check_timeout_transactions_at(Duration::from_secs(30 * 60), now).is_empty());
    assert_eq!(alerts.alerts().len(), 1);
}

/// Captures what an outside observer polling the store sees while a step
/// or compensation is running.
struct ObservingStep {
    name: String,
    store: Arc<InMemorySagaStateStore>,
    seen: Arc<Mutex<Vec<(String, SagaExecution)>>>,
    fail: bool,
}

impl ObservingStep {
    async fn snapshot(&self, phase: &str) {
        let mut unfinished = self.store.find_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1, "exactly one run in flight");
        self.seen
            .lock()
            .unwrap()
            .push((format!("{phase}:{}", self.name), unfinished.remove(0)));
    }
}

#[async_trait]
impl SagaStep for ObservingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut SagaContext) -> StepResult {
        self.snapshot("execute").await;
        if self.fail {
            return Err(StepError::failed(&self.name, "downstream refused"));
        }
        Ok(())
    }

    async fn compensate(&self, _ctx: &mut SagaContext) -> StepResult {
        self.snapshot("compensate").await;
        Ok(())
    }
}

#[tokio::test]
async fn test_store_reflects_each_transition_before_the_next_step_runs() {
    let h = TestHarness::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let step = |name: &str, fail: bool| ObservingStep {
        name: name.to_string(),
        store: h.store.clone(),
        seen: seen.clone(),
        fail,
    };
    h.orchestrator
        .register_saga(
            SagaDefinition::builder("observed")
                .step(step("a", false))
                .step(step("b", false))
                .step(step("c", true))
                .build()
                .unwrap(),
        )
        .unwrap();

    let result = h
        .orchestrator
        .execute("observed", SagaContext::new())
        .await
        .unwrap();
    assert!(!result.success);

    let seen = seen.lock().unwrap().clone();
    let labels: Vec<&str> = seen.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["execute:a", "execute:b", "execute:c", "compensate:b", "compensate:a"]
    );

    for (index, (label, record)) in seen.iter().take(3).enumerate() {
        assert_eq!(record.id(), result.execution_id, "{label}");
        assert_eq!(record.status(), SagaStatus::Executing, "{label}");
        assert_eq!(record.current_step(), index, "{label}");
        assert_eq!(
            record.completed_steps(),
            &(0..index).collect::<BTreeSet<_>>(),
            "{label}"
        );
        assert!(record.error_message().is_none(), "{label}");
    }

    for (label, record) in seen.iter().skip(3) {
        assert_eq!(record.status(), SagaStatus::Compensating, "{label}");
        assert_eq!(record.error_message(), Some("downstream refused"), "{label}");
        assert_eq!(record.completed_steps(), &BTreeSet::from([0, 1]), "{label}");
    }

    assert_eq!(h.status_of(result.execution_id).await, SagaStatus::Compensated);
}
