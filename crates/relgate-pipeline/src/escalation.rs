//! Escalation sub-protocol
//!
//! Posts a structured approval request, then waits a bounded time for a
//! human signal. The wait is cancellable and never auto-resolves.
//!
//! Signal handling:
//! - `FORCE_OVERRIDE` always releases the block
//! - `APPROVE` releases non-critical blocks only; on a critical incident it
//!   is rejected, the rejection is audited and the wait continues
//!
//! Every accepted signal is audited with the approver before anything runs.

use crate::abort::AbortSignal;
use crate::recorder::RunRecorder;
use crate::report::{EscalationOutcome, RiskLevel};
use relgate_core::{
    split_steps, ApprovalSignal, ApprovalSummary, CollaboratorError, EscalationConfig,
    GateOutput, GateState, Incident, NotificationChannel, PersistenceFailure, PlanOutput,
    SignalKind, Stage, StageStatus, StressOutput, ToolCall, WorkflowEvent, WorkflowOutcome,
};
use std::sync::Arc;
use tokio::time::Instant;

/// Steps included in an approval request
const SUMMARY_STEPS: usize = 3;

/// Build the approval request for a blocked decision
#[must_use]
pub fn approval_summary(
    incident: &Incident,
    plan: &PlanOutput,
    stress: &StressOutput,
    gate: &GateOutput,
) -> ApprovalSummary {
    let mut steps = split_steps(plan.proposed_action());
    steps.truncate(SUMMARY_STEPS);
    ApprovalSummary {
        incident_id: incident.id().clone(),
        service: incident.service().to_string(),
        severity: incident.severity(),
        decision: gate.decision.as_str().to_string(),
        reasons: gate.reason_texts().into_iter().map(str::to_string).collect(),
        confidence_initial: plan.confidence_initial(),
        confidence_post_stress: stress.confidence_post_stress,
        confidence_delta: gate.confidence_delta,
        supported_claims: stress.supported_count(),
        contradicted_claims: stress.contradicted_count(),
        policy_conflicts: stress.policy_conflicts.len(),
        risk_level: RiskLevel::assess(gate, stress).as_str().to_string(),
        proposed_action: plan.proposed_action().to_string(),
        steps,
        requires_override: gate.requires_override,
    }
}

/// Everything the escalator needs about the blocked decision
#[derive(Debug, Clone, Copy)]
pub struct BlockedDecision<'a> {
    /// Incident
    pub incident: &'a Incident,
    /// Plan
    pub plan: &'a PlanOutput,
    /// Stress result
    pub stress: &'a StressOutput,
    /// Gate decision (a block)
    pub gate: &'a GateOutput,
}

enum Poll {
    Signal(Option<ApprovalSignal>),
    Failed(CollaboratorError),
    Aborted,
}

/// Drives the approval wait
#[derive(Clone)]
pub struct Escalator {
    notifier: Arc<dyn NotificationChannel>,
    config: EscalationConfig,
}

impl Escalator {
    /// Create new escalator
    #[must_use]
    pub fn new(notifier: Arc<dyn NotificationChannel>, config: EscalationConfig) -> Self {
        Self { notifier, config }
    }

    /// Post the request and wait for a signal
    ///
    /// # Errors
    /// `PersistenceFailure` if a workflow event could not be written. An
    /// accepted signal whose event was not acknowledged does not release the
    /// block.
    pub async fn escalate(
        &self,
        recorder: &RunRecorder,
        blocked: BlockedDecision<'_>,
        abort: &AbortSignal,
    ) -> Result<EscalationOutcome, PersistenceFailure> {
        let decision = blocked.gate.decision;
        let event = |outcome| {
            WorkflowEvent::new(
                recorder.run_id(),
                recorder.incident_id().clone(),
                decision,
                outcome,
            )
        };

        let summary = approval_summary(blocked.incident, blocked.plan, blocked.stress, blocked.gate);
        let posted = tokio::time::timeout(
            self.config.notify_timeout(),
            self.notifier.post_approval_request(&summary),
        )
        .await
        .map_err(|_| CollaboratorError::timeout("notification", self.config.notify_timeout()))
        .and_then(|r| r);

        let request_id = match posted {
            Ok(request_id) => {
                recorder
                    .tool_calls([ToolCall::ok("notification", "post_approval_request", request_id.clone())])
                    .await?;
                recorder
                    .record(event(WorkflowOutcome::Triggered).for_request(request_id.clone()))
                    .await?;
                request_id
            }
            Err(e) => {
                tracing::error!(incident_id = %blocked.incident.id(), error = %e, "approval request not posted");
                recorder
                    .tool_calls([ToolCall::failed("notification", "post_approval_request", &e)])
                    .await?;
                recorder
                    .record(event(WorkflowOutcome::Failed).with_details(e.to_string()))
                    .await?;
                return Ok(EscalationOutcome::NotificationFailed {
                    message: e.to_string(),
                });
            }
        };
        tracing::info!(
            incident_id = %blocked.incident.id(),
            request_id = %request_id,
            requires_override = blocked.gate.requires_override,
            "awaiting human decision"
        );

        let critical = blocked.incident.severity().is_critical();
        let deadline = Instant::now() + self.config.wait_budget();
        let mut rejected_approvals = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let budget = remaining.min(self.config.poll_interval());

            let poll = tokio::select! {
                biased;
                () = abort.aborted() => Poll::Aborted,
                res = tokio::time::timeout(budget, self.notifier.poll_for_signal(&request_id, budget)) => {
                    match res {
                        Ok(Ok(signal)) => Poll::Signal(signal),
                        Ok(Err(e)) => Poll::Failed(e),
                        Err(_) => Poll::Signal(None),
                    }
                }
            };

            match poll {
                Poll::Aborted => {
                    tracing::warn!(incident_id = %blocked.incident.id(), "approval wait aborted by operator");
                    recorder
                        .stage(
                            Stage::Escalate,
                            StageStatus::Aborted,
                            Some(GateState::Escalated),
                            format!("request {request_id}"),
                        )
                        .await?;
                    return Ok(EscalationOutcome::Aborted {
                        request_id: Some(request_id),
                    });
                }
                Poll::Signal(None) => {}
                Poll::Failed(e) => {
                    tracing::warn!(incident_id = %blocked.incident.id(), error = %e, "approval poll failed");
                    recorder
                        .tool_calls([ToolCall::failed("notification", "poll_for_signal", &e)])
                        .await?;
                    // back off for the rest of this poll window
                    tokio::select! {
                        biased;
                        () = abort.aborted() => {}
                        () = tokio::time::sleep(budget) => {}
                    }
                }
                Poll::Signal(Some(signal)) => {
                    if critical && signal.kind == SignalKind::Approve {
                        rejected_approvals += 1;
                        tracing::warn!(
                            incident_id = %blocked.incident.id(),
                            approver = %signal.approver,
                            "APPROVE rejected: critical incident requires FORCE_OVERRIDE"
                        );
                        recorder
                            .record(
                                event(WorkflowOutcome::Rejected)
                                    .by(signal.approver.clone())
                                    .for_request(request_id.clone())
                                    .with_details("critical severity requires FORCE_OVERRIDE"),
                            )
                            .await?;
                        continue;
                    }

                    let outcome = match signal.kind {
                        SignalKind::Approve => WorkflowOutcome::Approved,
                        SignalKind::ForceOverride => WorkflowOutcome::Overridden,
                    };
                    recorder
                        .record(
                            event(outcome)
                                .by(signal.approver.clone())
                                .for_request(request_id.clone()),
                        )
                        .await?;
                    tracing::info!(
                        incident_id = %blocked.incident.id(),
                        approver = %signal.approver,
                        outcome = outcome.as_str(),
                        "block released by human"
                    );
                    return Ok(EscalationOutcome::Released {
                        signal: signal.kind,
                        approver: signal.approver,
                        request_id,
                        rejected_approvals,
                    });
                }
            }
        }

        tracing::warn!(incident_id = %blocked.incident.id(), request_id = %request_id, "approval wait timed out, incident stays escalated");
        recorder
            .stage(
                Stage::Escalate,
                StageStatus::TimedOut,
                Some(GateState::Escalated),
                format!("request {request_id}: no accepted signal"),
            )
            .await?;
        Ok(EscalationOutcome::TimedOut {
            request_id,
            rejected_approvals,
        })
    }
}

impl std::fmt::Debug for Escalator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Escalator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
