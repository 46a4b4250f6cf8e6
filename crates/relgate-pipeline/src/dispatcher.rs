//! Execution dispatcher
//!
//! One trigger call per decision, bracketed by two audit records:
//! - `attempted` is written first; if it is not acknowledged nothing runs
//! - `completed` is written after the call, retried with backoff, and raised
//!   as an operational alert if it still fails
//!
//! A failed trigger call is recorded as `failed` and never retried.

use crate::recorder::RunRecorder;
use crate::report::{ExecutionReport, OperationalAlert};
use relgate_core::{
    split_steps, ActionExecutionRecord, ActionOutcome, ActionPayload, ActionTrigger, AuditConfig,
    CollaboratorError, ExecutionMode, GateOutput, Incident, PersistenceFailure, PlanOutput,
    ToolCall,
};
use std::sync::Arc;
use std::time::Duration;

/// Dispatches released actions to the trigger
#[derive(Clone)]
pub struct ExecutionDispatcher {
    trigger: Arc<dyn ActionTrigger>,
    trigger_timeout: Duration,
    audit: AuditConfig,
}

impl ExecutionDispatcher {
    /// Create new dispatcher
    #[must_use]
    pub fn new(trigger: Arc<dyn ActionTrigger>, trigger_timeout: Duration, audit: AuditConfig) -> Self {
        Self {
            trigger,
            trigger_timeout,
            audit,
        }
    }

    /// Run the action once
    ///
    /// `Guarded` mode hands only the first step to the trigger.
    ///
    /// # Errors
    /// `PersistenceFailure` if the pre-attempt record was not acknowledged;
    /// the trigger is not called in that case.
    pub async fn dispatch(
        &self,
        recorder: &RunRecorder,
        incident: &Incident,
        plan: &PlanOutput,
        gate: &GateOutput,
        mode: ExecutionMode,
        approver: Option<String>,
    ) -> Result<ExecutionReport, PersistenceFailure> {
        let mut steps = split_steps(plan.proposed_action());
        if mode == ExecutionMode::Guarded {
            steps.truncate(1);
        }

        let attempt = ActionExecutionRecord::attempt(
            recorder.run_id(),
            incident.id().clone(),
            gate,
            mode,
            approver.clone(),
        );
        recorder.record(attempt.clone()).await?;

        let payload = ActionPayload {
            incident_id: incident.id().clone(),
            service: incident.service().to_string(),
            action: plan.proposed_action().to_string(),
            steps: steps.clone(),
            mode,
        };
        tracing::info!(
            incident_id = %incident.id(),
            mode = mode.as_str(),
            steps = steps.len(),
            "dispatching action"
        );
        let result = tokio::time::timeout(self.trigger_timeout, self.trigger.execute(&payload))
            .await
            .map_err(|_| CollaboratorError::timeout("action_trigger", self.trigger_timeout))
            .and_then(|r| r);

        let (outcome, details, call) = match result {
            Ok(r) if r.success => (
                ActionOutcome::Succeeded,
                r.details.clone(),
                ToolCall::ok("action_trigger", "execute", r.details),
            ),
            Ok(r) => (
                ActionOutcome::Failed,
                r.details.clone(),
                ToolCall::ok("action_trigger", "execute", format!("reported failure: {}", r.details)),
            ),
            Err(e) => {
                tracing::warn!(incident_id = %incident.id(), error = %e, "action trigger failed");
                (ActionOutcome::Failed, e.to_string(), ToolCall::failed("action_trigger", "execute", &e))
            }
        };

        let mut alert = None;
        let completed = attempt.completed(outcome, details.clone());
        if let Err(e) = recorder.record_with_retry(completed, &self.audit).await {
            tracing::error!(
                incident_id = %incident.id(),
                attempt_id = %attempt.attempt_id,
                error = %e,
                "OPERATIONAL ALERT: completion record lost, action outcome stands"
            );
            alert = Some(OperationalAlert {
                incident_id: incident.id().clone(),
                record_kind: e.record_kind.clone(),
                message: e.message,
            });
        } else if let Err(e) = recorder.tool_calls([call]).await {
            tracing::warn!(incident_id = %incident.id(), error = %e, "trigger tool record not written");
        }

        Ok(ExecutionReport {
            attempt_id: attempt.attempt_id,
            mode,
            steps,
            outcome,
            details,
            approver,
            alert,
        })
    }
}

impl std::fmt::Debug for ExecutionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionDispatcher")
            .field("trigger_timeout", &self.trigger_timeout)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}
