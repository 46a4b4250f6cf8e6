//! End-to-end runs through the pipeline with in-memory collaborators

use pretty_assertions::assert_eq;
use relgate_audit::{summarize, MemoryAuditLog};
use relgate_core::{
    ActionOutcome, ApprovalSignal, AttemptPhase, AuditConfig, AuditReceipt, AuditRecord, AuditSink,
    ContextMode, Decision, EscalationConfig, ExecutionMode, EvidenceRetriever, GateState,
    IncidentId, PersistenceFailure, PipelineConfig, ReasonCode, RelGateError, ReliabilityMetricsProvider, Severity,
    SignalKind, Stage, StageStatus, Stance, StressConfig, WorkflowOutcome,
};
use relgate_pipeline::{
    abort_pair, AbortHandle, AbortSignal, Collaborators, EscalationOutcome, EvidenceDocument,
    InMemoryEvidenceIndex, InMemoryPolicyTable, LearnOutcome, LoggingActionTrigger, Pipeline,
    PolicyRule, RiskLevel, ScriptedNotifier, ScriptedReasoner, StaticMetricsProvider,
    LEARNED_SOURCE,
};
use relgate_test_utils::{incident, plan_json, FlakyAuditSink, StalledMetrics, SERVICE};
use std::sync::Arc;
use std::time::Duration;

const ACTION: &str = "1. Restart checkout pods 2. Verify error rate";

const CONTRADICTED_CLAIMS: [&str; 3] = [
    "connection pool exhaustion",
    "recent deploy regression",
    "cache eviction storm",
];

const COVERED_CLAIMS: [&str; 5] = [
    "connection pool exhaustion",
    "pod restart clears saturation",
    "saturation after restart",
    "vendor outage elsewhere",
    "dns flapping",
];

fn doc(id: &str, text: &str, stance: Stance) -> EvidenceDocument {
    EvidenceDocument {
        doc_id: id.to_string(),
        service: SERVICE.to_string(),
        title: String::new(),
        text: text.to_string(),
        authority: "runbooks".to_string(),
        stance,
    }
}

fn evidence() -> Arc<InMemoryEvidenceIndex> {
    Arc::new(InMemoryEvidenceIndex::with_documents([
        doc("rb-pool", "connection pool exhaustion observed", Stance::Supports),
        doc("rb-restart", "pod restart clears saturation", Stance::Supports),
        doc("pm-deploy", "deploy unchanged since monday", Stance::Contradicts),
        doc("pm-cache", "cache ratio stable", Stance::Contradicts),
    ]))
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_escalation(EscalationConfig {
            wait_budget_ms: 300,
            poll_interval_ms: 50,
            notify_timeout_ms: 1000,
        })
        .with_audit(AuditConfig {
            post_write_retries: 2,
            retry_backoff_ms: 1,
        })
}

struct Harness {
    index: Arc<InMemoryEvidenceIndex>,
    notifier: Arc<ScriptedNotifier>,
    trigger: Arc<LoggingActionTrigger>,
    log: Arc<MemoryAuditLog>,
    reasoner: ScriptedReasoner,
    policy: InMemoryPolicyTable,
    metrics: Vec<Arc<dyn ReliabilityMetricsProvider>>,
    audit: Option<Arc<dyn AuditSink>>,
    config: PipelineConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            index: evidence(),
            notifier: Arc::new(ScriptedNotifier::new(Vec::new())),
            trigger: Arc::new(LoggingActionTrigger::new()),
            log: Arc::new(MemoryAuditLog::new()),
            reasoner: ScriptedReasoner::new(),
            policy: InMemoryPolicyTable::default(),
            metrics: vec![Arc::new(StaticMetricsProvider::new("static", 0.1, 0.2, 5.0))],
            audit: None,
            config: config(),
        }
    }

    fn plan(mut self, id: &str, claims: &[&str], confidence: f64) -> Self {
        self.reasoner = self.reasoner.with_plan(id, plan_json(ACTION, claims, confidence));
        self
    }

    fn replies(mut self, replies: Vec<Option<ApprovalSignal>>) -> Self {
        self.notifier = Arc::new(ScriptedNotifier::new(replies));
        self
    }

    fn pipeline(self) -> (Pipeline, Fixture) {
        let fixture = Fixture {
            index: self.index.clone(),
            notifier: self.notifier.clone(),
            trigger: self.trigger.clone(),
            log: self.log.clone(),
        };
        let log: Arc<dyn AuditSink> = self.log.clone();
        let audit = self.audit.unwrap_or(log);
        let pipeline = Pipeline::new(
            self.config,
            Collaborators {
                reasoner: Arc::new(self.reasoner),
                evidence: self.index.clone(),
                policy: Arc::new(self.policy),
                metrics: self.metrics,
                notifier: self.notifier,
                trigger: self.trigger,
                indexer: self.index,
                audit,
            },
        )
        .unwrap();
        (pipeline, fixture)
    }
}

struct Fixture {
    index: Arc<InMemoryEvidenceIndex>,
    notifier: Arc<ScriptedNotifier>,
    trigger: Arc<LoggingActionTrigger>,
    log: Arc<MemoryAuditLog>,
}

fn signal(kind: SignalKind, approver: &str) -> Option<ApprovalSignal> {
    Some(ApprovalSignal {
        kind,
        approver: approver.to_string(),
    })
}

fn stages(records: &[AuditRecord]) -> Vec<(Stage, StageStatus)> {
    records
        .iter()
        .filter_map(|r| match r {
            AuditRecord::StageTransition(t) => Some((t.stage, t.status)),
            _ => None,
        })
        .collect()
}

fn workflow(records: &[AuditRecord]) -> Vec<(WorkflowOutcome, Option<String>)> {
    records
        .iter()
        .filter_map(|r| match r {
            AuditRecord::Workflow(w) => Some((w.outcome, w.approver.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn high_severity_with_two_contradictions_escalates_and_times_out() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-1", &CONTRADICTED_CLAIMS, 80.0)
        .pipeline();

    let report = pipeline
        .run(incident("INC-1", Severity::High), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(report.gate.decision, Decision::BlockAndEscalate);
    assert_eq!(report.gate.reasons, vec![ReasonCode::ExcessContradiction]);
    assert!(!report.gate.requires_override);
    assert!(report.gate.confidence_delta < 0.0);
    assert_eq!(report.stress.contradicted_count(), 2);
    assert_eq!(report.risk_level, RiskLevel::High);
    assert_eq!(report.final_state, GateState::Escalated);
    assert!(matches!(
        report.escalation,
        Some(EscalationOutcome::TimedOut { rejected_approvals: 0, .. })
    ));
    assert!(report.execution.is_none());
    assert!(fx.trigger.executed().is_empty());

    let posted = fx.notifier.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].risk_level, "high");
    assert_eq!(posted[0].contradicted_claims, 2);
    assert_eq!(posted[0].steps, vec!["Restart checkout pods", "Verify error rate"]);

    let records = fx.log.records();
    assert!(stages(&records).contains(&(Stage::Escalate, StageStatus::TimedOut)));
    assert_eq!(workflow(&records), vec![(WorkflowOutcome::Triggered, None)]);
}

#[tokio::test]
async fn medium_severity_with_sixty_percent_coverage_executes() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-2", &COVERED_CLAIMS, 70.0)
        .pipeline();

    let report = pipeline
        .run(incident("INC-2", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();

    assert!((report.stress.evidence_coverage - 0.6).abs() < 1e-12);
    assert_eq!(report.gate.decision, Decision::Execute);
    assert_eq!(report.gate.reasons, vec![ReasonCode::ChecksPassed]);
    assert_eq!(report.gate.confidence_delta, 0.0);
    assert_eq!(report.final_state, GateState::Completed);

    let execution = report.execution.unwrap();
    assert_eq!(execution.mode, ExecutionMode::Full);
    assert_eq!(execution.outcome, ActionOutcome::Succeeded);
    assert_eq!(execution.steps.len(), 2);
    assert_eq!(fx.trigger.executed().len(), 1);
    assert!(matches!(report.learn, Some(LearnOutcome::Indexed { .. })));
    assert!(fx.notifier.posted().is_empty());
}

#[tokio::test]
async fn single_contradiction_runs_first_step_guarded() {
    let (pipeline, fx) = Harness::new()
        .plan(
            "INC-3",
            &["connection pool exhaustion", "recent deploy regression"],
            75.0,
        )
        .pipeline();

    let report = pipeline
        .run(incident("INC-3", Severity::Low), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(report.gate.decision, Decision::PartialExecute);
    assert_eq!(report.gate.reasons, vec![ReasonCode::SingleContradiction]);
    let execution = report.execution.unwrap();
    assert_eq!(execution.mode, ExecutionMode::Guarded);
    assert_eq!(execution.steps, vec!["Restart checkout pods"]);
    assert_eq!(fx.trigger.executed()[0].steps, vec!["Restart checkout pods"]);
}

#[tokio::test]
async fn critical_rejects_approve_then_accepts_force_override() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-4", &["connection pool exhaustion"], 90.0)
        .replies(vec![
            signal(SignalKind::Approve, "alice"),
            None,
            signal(SignalKind::ForceOverride, "bob"),
        ])
        .pipeline();

    let report = pipeline
        .run(incident("INC-4", Severity::Critical), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(report.gate.reasons, vec![ReasonCode::CriticalRequiresOverride]);
    assert!(report.gate.requires_override);
    assert_eq!(
        report.escalation,
        Some(EscalationOutcome::Released {
            signal: SignalKind::ForceOverride,
            approver: "bob".to_string(),
            request_id: "req-INC-4-1".to_string(),
            rejected_approvals: 1,
        })
    );
    let execution = report.execution.unwrap();
    assert_eq!(execution.mode, ExecutionMode::Override);
    assert_eq!(execution.approver.as_deref(), Some("bob"));
    assert_eq!(report.final_state, GateState::Completed);

    let records = fx.log.records();
    assert_eq!(
        workflow(&records),
        vec![
            (WorkflowOutcome::Triggered, None),
            (WorkflowOutcome::Rejected, Some("alice".to_string())),
            (WorkflowOutcome::Overridden, Some("bob".to_string())),
        ]
    );

    // the override is on record before the action is attempted
    let overridden = records
        .iter()
        .position(|r| matches!(r, AuditRecord::Workflow(w) if w.outcome == WorkflowOutcome::Overridden))
        .unwrap();
    let attempted = records
        .iter()
        .position(|r| matches!(r, AuditRecord::ActionExecution(a) if a.phase == AttemptPhase::Attempted))
        .unwrap();
    assert!(overridden < attempted);
}

#[tokio::test]
async fn non_critical_block_released_by_approve() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-5", &CONTRADICTED_CLAIMS, 80.0)
        .replies(vec![signal(SignalKind::Approve, "carol")])
        .pipeline();

    let report = pipeline
        .run(incident("INC-5", Severity::High), &AbortSignal::never())
        .await
        .unwrap();

    assert!(report.escalation.as_ref().unwrap().is_released());
    assert_eq!(report.final_state, GateState::Completed);
    assert_eq!(fx.trigger.executed()[0].mode, ExecutionMode::Override);
    assert!(workflow(&fx.log.records()).contains(&(WorkflowOutcome::Approved, Some("carol".to_string()))));
}

#[tokio::test]
async fn policy_conflict_blocks_clean_plan() {
    let mut harness = Harness::new().plan("INC-6", &COVERED_CLAIMS, 95.0);
    harness.policy = InMemoryPolicyTable::new(vec![PolicyRule {
        policy_id: "change-freeze".to_string(),
        service: "*".to_string(),
        blocked_actions: vec!["restart checkout pods".to_string()],
        severities: vec![],
        description: "no restarts during freeze".to_string(),
    }]);
    let (pipeline, _fx) = harness.pipeline();

    let report = pipeline
        .run(incident("INC-6", Severity::Low), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(report.gate.reasons, vec![ReasonCode::PolicyConflict]);
    assert_eq!(report.stress.policy_conflicts[0].policy_id, "change-freeze");
    assert_eq!(report.final_state, GateState::Escalated);
}

#[tokio::test]
async fn audit_trail_covers_every_stage_and_verifies() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-7", &COVERED_CLAIMS, 70.0)
        .pipeline();
    let report = pipeline
        .run(incident("INC-7", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();

    let records = fx.log.records_for(&IncidentId::new("INC-7"));
    assert!(records.iter().all(|r| r.run_id() == report.run_id));
    assert_eq!(
        stages(&records),
        vec![
            (Stage::Plan, StageStatus::Completed),
            (Stage::Stress, StageStatus::Completed),
            (Stage::Compress, StageStatus::Completed),
            (Stage::Gate, StageStatus::Completed),
            (Stage::Execute, StageStatus::Completed),
            (Stage::Learn, StageStatus::Completed),
        ]
    );

    let decisions: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            AuditRecord::Decision(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].gate, report.gate);

    let attempts: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            AuditRecord::ActionExecution(a) => Some(a),
            _ => None,
        })
        .collect();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].phase, AttemptPhase::Attempted);
    assert_eq!(attempts[1].phase, AttemptPhase::Completed);
    assert_eq!(attempts[0].attempt_id, attempts[1].attempt_id);
    assert_eq!(attempts[1].outcome, Some(ActionOutcome::Succeeded));

    // 5 claim searches, policy, metrics, reasoner x2, trigger, indexer
    let tools = records
        .iter()
        .filter(|r| matches!(r, AuditRecord::ToolInvocation(_)))
        .count();
    assert_eq!(tools, 11);

    fx.log.verify().unwrap();
    let kpi = summarize(&records);
    assert_eq!(kpi.runs, 1);
    assert_eq!(kpi.executed, 1);
}

#[tokio::test]
async fn revised_position_is_audited_without_changing_the_decision() {
    let mut harness = Harness::new().plan("INC-17", &COVERED_CLAIMS, 70.0);
    harness.reasoner = harness.reasoner.with_hints(
        "INC-17",
        serde_json::json!({"position_after_stress": "scale out checkout instead"}),
    );
    let (pipeline, fx) = harness.pipeline();

    let report = pipeline
        .run(incident("INC-17", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(report.gate.decision, Decision::Execute);
    assert_eq!(report.gate.reasons, vec![ReasonCode::ChecksPassed]);
    assert!(report.adaptability.disagreement_detected);
    // 1 * 0.6 integration * (1 - 0) * (1 - 0.2)
    assert!((report.adaptability.adaptability_score - 0.48).abs() < 1e-12);

    let records = fx.log.records();
    let decision = records
        .iter()
        .find_map(|r| match r {
            AuditRecord::Decision(d) => Some(d),
            _ => None,
        })
        .unwrap();
    assert_eq!(decision.model_id, "default");
    assert!(decision.disagreement_detected);
    assert_eq!(decision.adaptability_score, report.adaptability.adaptability_score);

    let kpi = summarize(&records);
    assert_eq!(kpi.disagreement_rate, 1.0);
    assert_eq!(kpi.by_model["default"].runs, 1);
}

#[tokio::test]
async fn pre_attempt_write_failure_blocks_execution() {
    let mut harness = Harness::new().plan("INC-8", &COVERED_CLAIMS, 70.0);
    let flaky = Arc::new(FlakyAuditSink::new(harness.log.clone()).failing_attempts());
    harness.audit = Some(flaky.clone() as Arc<dyn AuditSink>);
    let (pipeline, fx) = harness.pipeline();

    let err = pipeline
        .run(incident("INC-8", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, RelGateError::Persistence(_)));
    assert!(err.blocks_execution());
    assert!(fx.trigger.executed().is_empty());
    assert_eq!(flaky.refused().len(), 1);
}

#[tokio::test]
async fn post_attempt_write_failure_raises_alert_but_outcome_stands() {
    let mut harness = Harness::new().plan("INC-9", &COVERED_CLAIMS, 70.0);
    let flaky = Arc::new(FlakyAuditSink::new(harness.log.clone()).failing_completions());
    harness.audit = Some(flaky.clone() as Arc<dyn AuditSink>);
    let (pipeline, fx) = harness.pipeline();

    let report = pipeline
        .run(incident("INC-9", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();

    assert_eq!(fx.trigger.executed().len(), 1);
    let execution = report.execution.unwrap();
    assert_eq!(execution.outcome, ActionOutcome::Succeeded);
    assert!(execution.alert.is_some());
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].record_kind, "action_execution");
    // first try plus two retries
    assert_eq!(flaky.refused().len(), 3);
    assert_eq!(report.final_state, GateState::Completed);
}

#[tokio::test]
async fn abort_during_wait_leaves_incident_escalated() {
    let mut harness = Harness::new().plan("INC-10", &CONTRADICTED_CLAIMS, 80.0);
    harness.config = harness.config.with_escalation(EscalationConfig {
        wait_budget_ms: 60_000,
        poll_interval_ms: 1_000,
        notify_timeout_ms: 1_000,
    });
    let (pipeline, fx) = harness.pipeline();
    let (handle, abort) = abort_pair();

    let aborter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    });
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        pipeline.run(incident("INC-10", Severity::High), &abort),
    )
    .await
    .unwrap()
    .unwrap();
    aborter.await.unwrap();

    assert!(matches!(report.escalation, Some(EscalationOutcome::Aborted { .. })));
    assert_eq!(report.final_state, GateState::Escalated);
    assert!(fx.trigger.executed().is_empty());
    assert!(stages(&fx.log.records()).contains(&(Stage::Escalate, StageStatus::Aborted)));
}

#[tokio::test]
async fn abort_before_plan_stops_the_run() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-11", &COVERED_CLAIMS, 70.0)
        .pipeline();
    let (handle, abort) = abort_pair();
    handle.abort();

    let err = pipeline
        .run(incident("INC-11", Severity::Low), &abort)
        .await
        .unwrap_err();
    assert!(matches!(err, RelGateError::Aborted));
    assert_eq!(stages(&fx.log.records()), vec![(Stage::Plan, StageStatus::Aborted)]);
}

/// Forwards records and pulls the abort handle once a decision is written
struct AbortOnDecision {
    inner: Arc<dyn AuditSink>,
    handle: AbortHandle,
}

#[async_trait::async_trait]
impl AuditSink for AbortOnDecision {
    async fn append(&self, record: AuditRecord) -> Result<AuditReceipt, PersistenceFailure> {
        let decided = matches!(record, AuditRecord::Decision(_));
        let receipt = self.inner.append(record).await?;
        if decided {
            self.handle.abort();
        }
        Ok(receipt)
    }
}

#[tokio::test]
async fn abort_after_execute_decision_still_leaves_a_workflow_event() {
    let mut harness = Harness::new().plan("INC-16", &COVERED_CLAIMS, 70.0);
    let (handle, abort) = abort_pair();
    harness.audit = Some(Arc::new(AbortOnDecision {
        inner: harness.log.clone(),
        handle,
    }) as Arc<dyn AuditSink>);
    let (pipeline, fx) = harness.pipeline();

    let err = pipeline
        .run(incident("INC-16", Severity::Medium), &abort)
        .await
        .unwrap_err();

    assert!(matches!(err, RelGateError::Aborted));
    assert!(fx.trigger.executed().is_empty());
    let records = fx.log.records();
    let decisions = records
        .iter()
        .filter(|r| matches!(r, AuditRecord::Decision(_)))
        .count();
    assert_eq!(decisions, 1);
    assert_eq!(workflow(&records), vec![(WorkflowOutcome::Skipped, None)]);
    assert!(stages(&records).contains(&(Stage::Execute, StageStatus::Aborted)));
}

#[tokio::test]
async fn malformed_plan_is_rejected_before_stress() {
    let mut harness = Harness::new();
    harness.reasoner = harness.reasoner.with_plan(
        "INC-12",
        serde_json::json!({"proposed_action": "restart", "key_claims": [], "confidence_initial": 50}),
    );
    let (pipeline, fx) = harness.pipeline();

    let err = pipeline
        .run(incident("INC-12", Severity::Low), &AbortSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RelGateError::Validation(ref v) if v.field == "plan.key_claims"));
    assert_eq!(stages(&fx.log.records()), vec![(Stage::Plan, StageStatus::Failed)]);
}

#[tokio::test]
async fn fenced_reasoner_reply_is_salvaged() {
    let mut harness = Harness::new();
    let body = plan_json(ACTION, &COVERED_CLAIMS, 70.0);
    harness.reasoner = harness.reasoner.with_plan(
        "INC-13",
        serde_json::Value::String(format!("Here is the plan:\n```json\n{body}\n```")),
    );
    let (pipeline, _fx) = harness.pipeline();

    let report = pipeline
        .run(incident("INC-13", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();
    assert_eq!(report.plan.claims().len(), 5);
}

#[tokio::test]
async fn unavailable_metrics_fall_back_conservatively() {
    let mut harness = Harness::new().plan("INC-14", &COVERED_CLAIMS, 70.0);
    harness.metrics = vec![Arc::new(StalledMetrics)];
    harness.config = harness.config.with_stress(StressConfig {
        metrics_timeout_ms: 20,
        ..StressConfig::default()
    });
    let (pipeline, _fx) = harness.pipeline();

    let report = pipeline
        .run(incident("INC-14", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();
    assert_eq!(report.signals_source, "fallback");
    assert_eq!(report.compress.mode, ContextMode::FullContext);
    assert_eq!(report.stress.confidence_post_stress, 45.0);
}

#[tokio::test]
async fn learned_runbook_is_searchable_by_later_runs() {
    let (pipeline, fx) = Harness::new()
        .plan("INC-15", &COVERED_CLAIMS, 70.0)
        .pipeline();
    let report = pipeline
        .run(incident("INC-15", Severity::Medium), &AbortSignal::never())
        .await
        .unwrap();

    let Some(LearnOutcome::Indexed { doc_id }) = report.learn else {
        panic!("expected an indexed runbook, got {:?}", report.learn);
    };
    let learned = fx.index.get(&doc_id).unwrap();
    assert_eq!(learned.authority, LEARNED_SOURCE);
    assert_eq!(learned.stance, Stance::Supports);

    let hits = fx.index.search("Restart checkout pods", SERVICE, 5).await.unwrap();
    assert!(hits.iter().any(|h| h.doc_id == doc_id));
}

#[tokio::test]
async fn run_many_keeps_input_order() {
    let (pipeline, _fx) = Harness::new()
        .plan("INC-20", &COVERED_CLAIMS, 70.0)
        .plan("INC-21", &CONTRADICTED_CLAIMS, 80.0)
        .plan("INC-22", &COVERED_CLAIMS, 60.0)
        .pipeline();

    let results = pipeline
        .run_many(
            vec![
                incident("INC-20", Severity::Medium),
                incident("INC-21", Severity::High),
                incident("INC-22", Severity::Low),
            ],
            &AbortSignal::never(),
        )
        .await;

    let ids: Vec<_> = results
        .iter()
        .map(|r| r.as_ref().unwrap().incident_id.to_string())
        .collect();
    assert_eq!(ids, vec!["INC-20", "INC-21", "INC-22"]);
    assert_eq!(
        results[1].as_ref().unwrap().final_state,
        GateState::Escalated
    );
}
