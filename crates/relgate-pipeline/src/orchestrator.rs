//! Pipeline orchestrator
//!
//! Runs one incident through Plan, Stress, Compress, Gate and then either
//! Execute or Escalate, finishing with Learn. Stages within a run are
//! strictly sequential; separate incidents run as independent pipeline
//! instances that share only the collaborators and the audit sink.

use crate::abort::AbortSignal;
use crate::dispatcher::ExecutionDispatcher;
use crate::escalation::{BlockedDecision, Escalator};
use crate::learn::Learner;
use crate::recorder::RunRecorder;
use crate::report::{
    EscalationOutcome, ExecutionReport, LearnOutcome, OperationalAlert, RiskLevel, RunReport,
};
use futures::stream::{self, StreamExt};
use relgate_core::{
    assess_adaptability, extract_json_object, ActionTrigger, AuditSink, ClaimVerifier,
    CollaboratorError, ContextCompressor, DecisionRecord, EvidenceRetriever, ExecutionMode,
    GateState, GateTracker, Incident, NotificationChannel, PipelineConfig, PlanOutput,
    PlanReasoner, PolicyChecker, RankedMetricsProviders, RelGateError, RelGateResult,
    ReliabilityMetricsProvider, RunId, RunbookIndexer, SafetyGate, Stage, StageStatus,
    StageTransition, StressOutput, ToolCall, VerificationHints, WorkflowEvent, WorkflowOutcome,
};
use serde_json::Value;
use std::sync::Arc;

/// External capabilities the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Plan proposal and verification hints
    pub reasoner: Arc<dyn PlanReasoner>,
    /// Runbook and postmortem search
    pub evidence: Arc<dyn EvidenceRetriever>,
    /// Governance rules
    pub policy: Arc<dyn PolicyChecker>,
    /// Reliability signal providers, highest priority first
    pub metrics: Vec<Arc<dyn ReliabilityMetricsProvider>>,
    /// Approval requests
    pub notifier: Arc<dyn NotificationChannel>,
    /// Remediation actions
    pub trigger: Arc<dyn ActionTrigger>,
    /// Learned runbooks
    pub indexer: Arc<dyn RunbookIndexer>,
    /// Append-only audit trail
    pub audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("metrics", &self.metrics.len())
            .finish_non_exhaustive()
    }
}

/// The Reliability Gate pipeline
pub struct Pipeline {
    config: PipelineConfig,
    reasoner: Arc<dyn PlanReasoner>,
    audit: Arc<dyn AuditSink>,
    metrics: RankedMetricsProviders,
    verifier: ClaimVerifier,
    compressor: ContextCompressor,
    gate: SafetyGate,
    escalator: Escalator,
    dispatcher: ExecutionDispatcher,
    learner: Learner,
}

impl Pipeline {
    /// Create new pipeline
    ///
    /// # Errors
    /// `RelGateError::Config` if the configuration is out of range.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> RelGateResult<Self> {
        config.validate()?;
        let Collaborators {
            reasoner,
            evidence,
            policy,
            metrics,
            notifier,
            trigger,
            indexer,
            audit,
        } = collaborators;

        Ok(Self {
            metrics: RankedMetricsProviders::new(
                metrics,
                config.stress.metrics_timeout(),
                &config.scoring,
            ),
            verifier: ClaimVerifier::new(evidence, policy, config.stress, config.scoring),
            compressor: ContextCompressor::new(config.scoring),
            gate: SafetyGate::new(config.gate),
            escalator: Escalator::new(notifier, config.escalation),
            dispatcher: ExecutionDispatcher::new(
                trigger,
                config.runtime.trigger_timeout(),
                config.audit,
            ),
            learner: Learner::new(indexer, config.runtime.learn_timeout()),
            reasoner,
            audit,
            config,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run incidents concurrently, at most `runtime.max_concurrent_runs` at a time
    ///
    /// Results come back in input order.
    pub async fn run_many(
        &self,
        incidents: Vec<Incident>,
        abort: &AbortSignal,
    ) -> Vec<RelGateResult<RunReport>> {
        stream::iter(incidents)
            .map(|incident| self.run(incident, abort))
            .buffered(self.config.runtime.max_concurrent_runs.max(1))
            .collect()
            .await
    }

    /// Run one incident through the pipeline
    ///
    /// # Errors
    /// - `Collaborator`/`CollaboratorTimeout` if the reasoner produced no plan
    /// - `Validation` if the plan failed boundary validation
    /// - `GateViolation` if the gate broke its contract; nothing is executed
    /// - `Persistence` if an audit record required before an action was not written
    /// - `Aborted` if the operator aborted before a decision was reached
    pub async fn run(&self, incident: Incident, abort: &AbortSignal) -> RelGateResult<RunReport> {
        let run_id = RunId::new();
        let recorder = RunRecorder::new(self.audit.clone(), run_id, incident.id().clone());
        tracing::info!(
            run_id = %run_id,
            incident_id = %incident.id(),
            severity = incident.severity().as_str(),
            "pipeline run started"
        );

        // Plan
        self.check_abort(&recorder, Stage::Plan, abort).await?;
        let plan = self.plan(&recorder, &incident).await?;

        // Stress
        self.check_abort(&recorder, Stage::Stress, abort).await?;
        let hints = self.hints(&recorder, &incident, &plan).await?;
        let resolution = self.metrics.resolve(&self.config.runtime.model_id).await;
        recorder.tool_calls(resolution.calls).await?;
        let signals = resolution.signals;
        let report = self.verifier.verify(&incident, &plan, &hints, &signals).await;
        recorder.tool_calls(report.calls).await?;
        let stress = report.output;
        recorder
            .stage(
                Stage::Stress,
                StageStatus::Completed,
                None,
                format!(
                    "{} claims, {} contradicted, coverage {:.2}, confidence {:.1}",
                    stress.claim_results.len(),
                    stress.contradicted_count(),
                    stress.evidence_coverage,
                    stress.confidence_post_stress
                ),
            )
            .await?;

        // Compress
        self.check_abort(&recorder, Stage::Compress, abort).await?;
        let compress = self.compressor.compress_run(&signals, &stress);
        recorder
            .stage(
                Stage::Compress,
                StageStatus::Completed,
                None,
                format!("{} (magnitude {:.3})", compress.mode.as_str(), compress.magnitude),
            )
            .await?;

        // Gate
        self.check_abort(&recorder, Stage::Gate, abort).await?;
        let gate = match self.gate.evaluate(&plan, &stress, incident.severity()) {
            Ok(gate) => gate,
            Err(violation) => {
                tracing::error!(incident_id = %incident.id(), error = %violation, "gate violation, failing closed");
                if let Err(e) = recorder
                    .stage(Stage::Gate, StageStatus::Failed, None, violation.to_string())
                    .await
                {
                    tracing::error!(incident_id = %incident.id(), error = %e, "gate failure not recorded");
                }
                return Err(violation.into());
            }
        };
        let mut tracker = GateTracker::new();
        let decided = GateState::from(gate.decision);
        tracker.advance(decided)?;
        let adaptability = assess_adaptability(&plan, &stress, hints.position_after_stress());
        recorder
            .record(
                DecisionRecord::new(run_id, &incident, &plan, &stress, &compress, gate.clone())
                    .assessed(self.config.runtime.model_id.clone(), adaptability),
            )
            .await?;
        recorder
            .stage(
                Stage::Gate,
                StageStatus::Completed,
                Some(decided),
                gate.reason_texts().join("; "),
            )
            .await?;
        tracing::info!(
            incident_id = %incident.id(),
            decision = gate.decision.as_str(),
            reasons = ?gate.reasons,
            confidence_delta = gate.confidence_delta,
            requires_override = gate.requires_override,
            disagreement = adaptability.disagreement_detected,
            adaptability_score = adaptability.adaptability_score,
            "gate decision"
        );

        let mut run = RunReport {
            run_id,
            incident_id: incident.id().clone(),
            risk_level: RiskLevel::assess(&gate, &stress),
            adaptability,
            signals_source: signals.source.clone(),
            final_state: decided,
            execution: None,
            escalation: None,
            learn: None,
            alerts: Vec::new(),
            plan,
            stress,
            compress,
            gate,
        };

        if run.gate.decision.is_block() {
            self.escalate(&recorder, &incident, &mut tracker, &mut run, abort)
                .await?;
        } else {
            if abort.is_aborted() {
                // a committed decision must end with a workflow event or an execution record
                recorder
                    .record(
                        WorkflowEvent::new(
                            run_id,
                            incident.id().clone(),
                            run.gate.decision,
                            WorkflowOutcome::Skipped,
                        )
                        .with_details("operator abort before execution"),
                    )
                    .await?;
                self.record_abort(&recorder, Stage::Execute).await;
                return Err(RelGateError::Aborted);
            }
            let mode = if decided == GateState::PartialExecute {
                ExecutionMode::Guarded
            } else {
                ExecutionMode::Full
            };
            self.execute(&recorder, &incident, &mut tracker, &mut run, mode, None)
                .await?;
        }

        run.final_state = tracker.current();
        tracing::info!(
            run_id = %run_id,
            incident_id = %incident.id(),
            final_state = run.final_state.as_str(),
            alerts = run.alerts.len(),
            "pipeline run finished"
        );
        Ok(run)
    }

    async fn check_abort(
        &self,
        recorder: &RunRecorder,
        stage: Stage,
        abort: &AbortSignal,
    ) -> RelGateResult<()> {
        if abort.is_aborted() {
            self.record_abort(recorder, stage).await;
            return Err(RelGateError::Aborted);
        }
        Ok(())
    }

    async fn record_abort(&self, recorder: &RunRecorder, stage: Stage) {
        tracing::warn!(incident_id = %recorder.incident_id(), stage = stage.as_str(), "run aborted by operator");
        if let Err(e) = recorder
            .stage(stage, StageStatus::Aborted, None, "operator abort")
            .await
        {
            tracing::warn!(incident_id = %recorder.incident_id(), error = %e, "abort not recorded");
        }
    }

    async fn plan(&self, recorder: &RunRecorder, incident: &Incident) -> RelGateResult<PlanOutput> {
        let timeout = self.config.runtime.reasoner_timeout();
        let proposed = tokio::time::timeout(timeout, self.reasoner.propose(incident))
            .await
            .map_err(|_| CollaboratorError::timeout("reasoner", timeout))
            .and_then(|r| r);

        let raw = match proposed {
            Ok(raw) => {
                recorder
                    .tool_calls([ToolCall::ok("reasoner", "propose", "plan received")])
                    .await?;
                raw
            }
            Err(e) => {
                tracing::error!(incident_id = %incident.id(), error = %e, "reasoner produced no plan");
                recorder
                    .tool_calls([ToolCall::failed("reasoner", "propose", &e)])
                    .await?;
                recorder
                    .stage(Stage::Plan, StageStatus::Failed, None, e.to_string())
                    .await?;
                return Err(e.into());
            }
        };

        let parsed = match &raw {
            Value::String(text) => extract_json_object(text)
                .and_then(|value| PlanOutput::from_reasoner_value(incident, &value)),
            value => PlanOutput::from_reasoner_value(incident, value),
        };
        match parsed {
            Ok(plan) => {
                recorder
                    .stage(
                        Stage::Plan,
                        StageStatus::Completed,
                        None,
                        format!(
                            "{} claims, confidence {:.1}",
                            plan.claims().len(),
                            plan.confidence_initial()
                        ),
                    )
                    .await?;
                Ok(plan)
            }
            Err(e) => {
                tracing::error!(incident_id = %incident.id(), error = %e, "plan rejected at boundary");
                recorder
                    .stage(Stage::Plan, StageStatus::Failed, None, e.to_string())
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Verification hints; any failure degrades to no hints
    async fn hints(
        &self,
        recorder: &RunRecorder,
        incident: &Incident,
        plan: &PlanOutput,
    ) -> RelGateResult<VerificationHints> {
        let timeout = self.config.runtime.reasoner_timeout();
        let reply = tokio::time::timeout(timeout, self.reasoner.verify(plan, incident))
            .await
            .map_err(|_| CollaboratorError::timeout("reasoner", timeout))
            .and_then(|r| r);

        let raw = match reply {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(incident_id = %incident.id(), error = %e, "verification hints unavailable");
                recorder
                    .tool_calls([ToolCall::failed("reasoner", "verify", &e)])
                    .await?;
                return Ok(VerificationHints::empty());
            }
        };
        let parsed = match &raw {
            Value::String(text) => extract_json_object(text)
                .and_then(|value| VerificationHints::from_reasoner_value(&value, plan.claims().len())),
            value => VerificationHints::from_reasoner_value(value, plan.claims().len()),
        };
        match parsed {
            Ok(hints) => {
                recorder
                    .tool_calls([ToolCall::ok("reasoner", "verify", "hints received")])
                    .await?;
                Ok(hints)
            }
            Err(e) => {
                tracing::warn!(incident_id = %incident.id(), error = %e, "verification hints rejected");
                let e = CollaboratorError::malformed("reasoner", e.to_string());
                recorder
                    .tool_calls([ToolCall::failed("reasoner", "verify", &e)])
                    .await?;
                Ok(VerificationHints::empty())
            }
        }
    }

    async fn escalate(
        &self,
        recorder: &RunRecorder,
        incident: &Incident,
        tracker: &mut GateTracker,
        run: &mut RunReport,
        abort: &AbortSignal,
    ) -> RelGateResult<()> {
        tracker.advance(GateState::Escalated)?;
        let outcome = self
            .escalator
            .escalate(
                recorder,
                BlockedDecision {
                    incident,
                    plan: &run.plan,
                    stress: &run.stress,
                    gate: &run.gate,
                },
                abort,
            )
            .await?;

        let approver = match &outcome {
            EscalationOutcome::Released { approver, .. } => Some(approver.clone()),
            EscalationOutcome::NotificationFailed { message } => {
                recorder
                    .stage(
                        Stage::Escalate,
                        StageStatus::Failed,
                        Some(GateState::Escalated),
                        message.clone(),
                    )
                    .await?;
                None
            }
            EscalationOutcome::TimedOut { .. } | EscalationOutcome::Aborted { .. } => None,
        };
        run.escalation = Some(outcome);

        if let Some(approver) = approver {
            recorder
                .stage(
                    Stage::Escalate,
                    StageStatus::Completed,
                    Some(GateState::Escalated),
                    format!("released by {approver}"),
                )
                .await?;
            self.execute(
                recorder,
                incident,
                tracker,
                run,
                ExecutionMode::Override,
                Some(approver),
            )
            .await?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        recorder: &RunRecorder,
        incident: &Incident,
        tracker: &mut GateTracker,
        run: &mut RunReport,
        mode: ExecutionMode,
        approver: Option<String>,
    ) -> RelGateResult<()> {
        let execution = self
            .dispatcher
            .dispatch(recorder, incident, &run.plan, &run.gate, mode, approver)
            .await?;
        tracker.advance(GateState::Completed)?;
        if let Some(alert) = &execution.alert {
            run.alerts.push(alert.clone());
        }

        if let Err(e) = recorder
            .record_with_retry(
                StageTransition::new(
                    recorder.run_id(),
                    incident.id().clone(),
                    Stage::Execute,
                    StageStatus::Completed,
                )
                .in_state(GateState::Completed)
                .with_details(format!(
                    "{} mode: {:?}",
                    execution.mode.as_str(),
                    execution.outcome
                )),
                &self.config.audit,
            )
            .await
        {
            tracing::error!(
                incident_id = %incident.id(),
                error = %e,
                "OPERATIONAL ALERT: execute stage record lost"
            );
            run.alerts.push(OperationalAlert {
                incident_id: incident.id().clone(),
                record_kind: e.record_kind.clone(),
                message: e.message,
            });
        }

        run.learn = Some(
            self.learn(recorder, incident, &run.plan, &run.stress, &execution)
                .await,
        );
        run.execution = Some(execution);
        Ok(())
    }

    /// Learn never fails the run
    async fn learn(
        &self,
        recorder: &RunRecorder,
        incident: &Incident,
        plan: &PlanOutput,
        stress: &StressOutput,
        execution: &ExecutionReport,
    ) -> LearnOutcome {
        let (outcome, call) = self.learner.learn(incident, plan, stress, execution).await;
        let (status, details) = match &outcome {
            LearnOutcome::Indexed { doc_id } => (StageStatus::Completed, doc_id.clone()),
            LearnOutcome::Skipped { reason } => (StageStatus::Skipped, reason.clone()),
            LearnOutcome::Failed { message } => (StageStatus::Failed, message.clone()),
        };
        let written = async {
            if let Some(call) = call {
                recorder.tool_calls([call]).await?;
            }
            recorder.stage(Stage::Learn, status, None, details).await
        };
        if let Err(e) = written.await {
            tracing::warn!(incident_id = %incident.id(), error = %e, "learn stage record not written");
        }
        outcome
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("metrics_providers", &self.metrics.len())
            .finish_non_exhaustive()
    }
}
