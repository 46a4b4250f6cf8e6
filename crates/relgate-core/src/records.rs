//! Persisted audit record shapes
//!
//! Every record is written once and never mutated. The two phases of an
//! execution attempt are two separate records sharing an `attempt_id`.

use crate::scoring::Adaptability;
use crate::state_machine::GateState;
use crate::types::{
    CompressOutput, ContextMode, Decision, ExecutionMode, GateOutput, Incident, IncidentId,
    PlanOutput, ReasonCode, RunId, Severity, StressOutput,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Plan intake
    Plan,
    /// Claim verification
    Stress,
    /// Context-mode selection
    Compress,
    /// Decision
    Gate,
    /// Action dispatch
    Execute,
    /// Human approval detour
    Escalate,
    /// Runbook feedback
    Learn,
}

impl Stage {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Stress => "stress",
            Stage::Compress => "compress",
            Stage::Gate => "gate",
            Stage::Execute => "execute",
            Stage::Escalate => "escalate",
            Stage::Learn => "learn",
        }
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed
    Completed,
    /// Stage failed
    Failed,
    /// Stage ran out of budget
    TimedOut,
    /// Operator aborted the run
    Aborted,
    /// Stage did not apply to this run
    Skipped,
}

/// A stage finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Stage that finished
    pub stage: Stage,
    /// How it finished
    pub status: StageStatus,
    /// Gate state after the stage, once a decision exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_state: Option<GateState>,
    /// Free-form detail
    #[serde(default)]
    pub details: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

impl StageTransition {
    /// Create new transition record stamped now
    #[must_use]
    pub fn new(run_id: RunId, incident_id: IncidentId, stage: Stage, status: StageStatus) -> Self {
        Self {
            run_id,
            incident_id,
            stage,
            status,
            gate_state: None,
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// With gate state
    #[must_use]
    pub fn in_state(mut self, state: GateState) -> Self {
        self.gate_state = Some(state);
        self
    }

    /// With detail text
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Result of one collaborator call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Call succeeded
    Ok,
    /// Call failed
    Error,
    /// Call exceeded its budget
    Timeout,
}

/// One collaborator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Collaborator name
    pub collaborator: String,
    /// Operation invoked
    pub operation: String,
    /// Outcome
    pub status: ToolStatus,
    /// Free-form detail
    #[serde(default)]
    pub details: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

/// A collaborator call observed outside of a run context
///
/// Stages that do not own the audit sink report their calls this way; the
/// orchestrator stamps them into `ToolInvocation` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Collaborator name
    pub collaborator: &'static str,
    /// Operation invoked
    pub operation: &'static str,
    /// Outcome
    pub status: ToolStatus,
    /// Free-form detail
    pub details: String,
}

impl ToolCall {
    /// Successful call
    #[must_use]
    pub fn ok(collaborator: &'static str, operation: &'static str, details: impl Into<String>) -> Self {
        Self {
            collaborator,
            operation,
            status: ToolStatus::Ok,
            details: details.into(),
        }
    }

    /// Failed call; timeouts are told apart by the error
    #[must_use]
    pub fn failed(
        collaborator: &'static str,
        operation: &'static str,
        error: &crate::error::CollaboratorError,
    ) -> Self {
        Self {
            collaborator,
            operation,
            status: if error.is_timeout() {
                ToolStatus::Timeout
            } else {
                ToolStatus::Error
            },
            details: error.to_string(),
        }
    }

    /// Stamp with run context
    #[must_use]
    pub fn into_record(self, run_id: RunId, incident_id: IncidentId) -> ToolInvocation {
        ToolInvocation {
            run_id,
            incident_id,
            collaborator: self.collaborator.to_string(),
            operation: self.operation.to_string(),
            status: self.status,
            details: self.details,
            timestamp: Utc::now(),
        }
    }
}

/// Gate decision with the inputs that drove it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Incident severity
    pub severity: Severity,
    /// Selected evidence context
    pub context_mode: ContextMode,
    /// Plan confidence
    pub confidence_initial: f64,
    /// Confidence after Stress
    pub confidence_post_stress: f64,
    /// Evidence coverage after Stress
    pub evidence_coverage: f64,
    /// Contradicted claims
    pub contradicted_claims: usize,
    /// Policy conflicts
    pub policy_conflicts: usize,
    /// The decision
    pub gate: GateOutput,
    /// Model whose signals drove Stress
    #[serde(default)]
    pub model_id: String,
    /// Planner/verifier disagreement; audit only
    #[serde(default)]
    pub disagreement_detected: bool,
    /// Plan adaptability score; audit only
    #[serde(default)]
    pub adaptability_score: f64,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    /// Capture the decision and the run state it was made on
    #[must_use]
    pub fn new(
        run_id: RunId,
        incident: &Incident,
        plan: &PlanOutput,
        stress: &StressOutput,
        compress: &CompressOutput,
        gate: GateOutput,
    ) -> Self {
        Self {
            run_id,
            incident_id: incident.id().clone(),
            severity: incident.severity(),
            context_mode: compress.mode,
            confidence_initial: plan.confidence_initial(),
            confidence_post_stress: stress.confidence_post_stress,
            evidence_coverage: stress.evidence_coverage,
            contradicted_claims: stress.contradicted_count(),
            policy_conflicts: stress.policy_conflicts.len(),
            gate,
            model_id: String::new(),
            disagreement_detected: false,
            adaptability_score: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Attach the model identifier and the adaptability assessment
    #[must_use]
    pub fn assessed(mut self, model_id: impl Into<String>, adaptability: Adaptability) -> Self {
        self.model_id = model_id.into();
        self.disagreement_detected = adaptability.disagreement_detected;
        self.adaptability_score = adaptability.adaptability_score;
        self
    }
}

/// Phase of an execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    /// Written before the trigger is called
    Attempted,
    /// Written after the trigger returned
    Completed,
}

/// Outcome of an execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Trigger reported success
    Succeeded,
    /// Trigger reported failure, errored or timed out
    Failed,
}

/// Persisted execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecutionRecord {
    /// Shared by the attempted/completed pair
    pub attempt_id: Ulid,
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Gate decision being executed
    pub decision: Decision,
    /// Dispatch mode
    pub execution_mode: ExecutionMode,
    /// Gate reasons
    pub reasons: Vec<ReasonCode>,
    /// Gate confidence delta
    pub confidence_delta: f64,
    /// Attempted or completed
    pub phase: AttemptPhase,
    /// Outcome, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    /// Human who released the action, for override executions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Trigger detail
    #[serde(default)]
    pub details: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

impl ActionExecutionRecord {
    /// Pre-call record
    #[must_use]
    pub fn attempt(
        run_id: RunId,
        incident_id: IncidentId,
        gate: &GateOutput,
        execution_mode: ExecutionMode,
        approver: Option<String>,
    ) -> Self {
        Self {
            attempt_id: Ulid::new(),
            run_id,
            incident_id,
            decision: gate.decision,
            execution_mode,
            reasons: gate.reasons.clone(),
            confidence_delta: gate.confidence_delta,
            phase: AttemptPhase::Attempted,
            outcome: None,
            approver,
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Post-call record for the same attempt
    #[must_use]
    pub fn completed(&self, outcome: ActionOutcome, details: impl Into<String>) -> Self {
        Self {
            phase: AttemptPhase::Completed,
            outcome: Some(outcome),
            details: details.into(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// Outcome of a notification or human decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// Approval request posted
    Triggered,
    /// Nothing to notify
    Skipped,
    /// Notification could not be posted
    Failed,
    /// Human approved a non-critical block
    Approved,
    /// Human forced an override
    Overridden,
    /// Human signal refused (APPROVE on a critical incident)
    Rejected,
}

impl WorkflowOutcome {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowOutcome::Triggered => "triggered",
            WorkflowOutcome::Skipped => "skipped",
            WorkflowOutcome::Failed => "failed",
            WorkflowOutcome::Approved => "approved",
            WorkflowOutcome::Overridden => "overridden",
            WorkflowOutcome::Rejected => "rejected",
        }
    }
}

/// Persisted notification/override event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Event ID
    pub event_id: Ulid,
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Gate decision the event belongs to
    pub decision: Decision,
    /// Outcome
    pub outcome: WorkflowOutcome,
    /// Human behind the signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Notification request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Free-form detail
    #[serde(default)]
    pub details: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Create new event stamped now
    #[must_use]
    pub fn new(
        run_id: RunId,
        incident_id: IncidentId,
        decision: Decision,
        outcome: WorkflowOutcome,
    ) -> Self {
        Self {
            event_id: Ulid::new(),
            run_id,
            incident_id,
            decision,
            outcome,
            approver: None,
            request_id: None,
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// With approver
    #[must_use]
    pub fn by(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }

    /// With request ID
    #[must_use]
    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// With detail text
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Anything appended to the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    /// Stage finished
    StageTransition(StageTransition),
    /// Collaborator call
    ToolInvocation(ToolInvocation),
    /// Gate decision
    Decision(DecisionRecord),
    /// Execution attempt phase
    ActionExecution(ActionExecutionRecord),
    /// Notification / human decision
    Workflow(WorkflowEvent),
}

impl AuditRecord {
    /// Record kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::StageTransition(_) => "stage_transition",
            AuditRecord::ToolInvocation(_) => "tool_invocation",
            AuditRecord::Decision(_) => "decision",
            AuditRecord::ActionExecution(_) => "action_execution",
            AuditRecord::Workflow(_) => "workflow",
        }
    }

    /// Incident the record belongs to
    #[must_use]
    pub fn incident_id(&self) -> &IncidentId {
        match self {
            AuditRecord::StageTransition(r) => &r.incident_id,
            AuditRecord::ToolInvocation(r) => &r.incident_id,
            AuditRecord::Decision(r) => &r.incident_id,
            AuditRecord::ActionExecution(r) => &r.incident_id,
            AuditRecord::Workflow(r) => &r.incident_id,
        }
    }

    /// Run the record belongs to
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            AuditRecord::StageTransition(r) => r.run_id,
            AuditRecord::ToolInvocation(r) => r.run_id,
            AuditRecord::Decision(r) => r.run_id,
            AuditRecord::ActionExecution(r) => r.run_id,
            AuditRecord::Workflow(r) => r.run_id,
        }
    }

    /// Record time
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditRecord::StageTransition(r) => r.timestamp,
            AuditRecord::ToolInvocation(r) => r.timestamp,
            AuditRecord::Decision(r) => r.timestamp,
            AuditRecord::ActionExecution(r) => r.timestamp,
            AuditRecord::Workflow(r) => r.timestamp,
        }
    }
}

impl From<StageTransition> for AuditRecord {
    fn from(r: StageTransition) -> Self {
        AuditRecord::StageTransition(r)
    }
}

impl From<ToolInvocation> for AuditRecord {
    fn from(r: ToolInvocation) -> Self {
        AuditRecord::ToolInvocation(r)
    }
}

impl From<DecisionRecord> for AuditRecord {
    fn from(r: DecisionRecord) -> Self {
        AuditRecord::Decision(r)
    }
}

impl From<ActionExecutionRecord> for AuditRecord {
    fn from(r: ActionExecutionRecord) -> Self {
        AuditRecord::ActionExecution(r)
    }
}

impl From<WorkflowEvent> for AuditRecord {
    fn from(r: WorkflowEvent) -> Self {
        AuditRecord::Workflow(r)
    }
}

/// Acknowledgement of a durable append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    /// Position in the log
    pub seq: u64,
    /// Entry hash
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> GateOutput {
        GateOutput {
            decision: Decision::Execute,
            reasons: vec![ReasonCode::ChecksPassed],
            confidence_delta: -4.5,
            requires_override: false,
        }
    }

    #[test]
    fn completed_record_shares_attempt_id() {
        let attempt = ActionExecutionRecord::attempt(
            RunId::new(),
            IncidentId::new("INC-7"),
            &gate(),
            ExecutionMode::Full,
            None,
        );
        let done = attempt.completed(ActionOutcome::Succeeded, "ok");
        assert_eq!(done.attempt_id, attempt.attempt_id);
        assert_eq!(attempt.phase, AttemptPhase::Attempted);
        assert_eq!(done.phase, AttemptPhase::Completed);
        assert_eq!(done.outcome, Some(ActionOutcome::Succeeded));
        assert!(attempt.outcome.is_none());
    }

    #[test]
    fn audit_record_is_tagged_by_kind() {
        let event = WorkflowEvent::new(
            RunId::new(),
            IncidentId::new("INC-8"),
            Decision::BlockAndEscalate,
            WorkflowOutcome::Rejected,
        )
        .by("oncall@example.com");
        let record = AuditRecord::from(event);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "workflow");
        assert_eq!(json["outcome"], "rejected");
        let back: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.incident_id().as_str(), "INC-8");
    }
}
