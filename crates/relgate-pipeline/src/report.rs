//! Run report

use relgate_core::{
    ActionOutcome, Adaptability, CompressOutput, ExecutionMode, GateOutput, GateState, IncidentId,
    PlanOutput, RunId, SignalKind, StressOutput,
};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Coarse risk label attached to approval requests and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Blocked decision
    High,
    /// Contradictions present or a large confidence drop
    Medium,
    /// Nothing notable
    Controlled,
}

impl RiskLevel {
    /// Confidence drop at or beyond which risk is at least medium
    pub const MEDIUM_DROP: f64 = 30.0;

    /// Classify a decision
    #[must_use]
    pub fn assess(gate: &GateOutput, stress: &StressOutput) -> Self {
        if gate.decision.is_block() {
            RiskLevel::High
        } else if stress.contradicted_count() > 0 || gate.confidence_delta <= -Self::MEDIUM_DROP {
            RiskLevel::Medium
        } else {
            RiskLevel::Controlled
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Controlled => "controlled",
        }
    }
}

/// Post-attempt audit write failed after retries; the action still stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalAlert {
    /// Incident
    pub incident_id: IncidentId,
    /// Record kind that could not be written
    pub record_kind: String,
    /// Last failure
    pub message: String,
}

/// What the dispatcher did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Attempt ID shared by the attempted/completed records
    pub attempt_id: Ulid,
    /// Dispatch mode
    pub mode: ExecutionMode,
    /// Steps handed to the trigger
    pub steps: Vec<String>,
    /// Outcome
    pub outcome: ActionOutcome,
    /// Trigger detail
    pub details: String,
    /// Human who released the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Completion record could not be written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<OperationalAlert>,
}

/// How the approval wait ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// A human released the block
    Released {
        /// Accepted signal
        signal: SignalKind,
        /// Human identity
        approver: String,
        /// Approval request
        request_id: String,
        /// APPROVE signals refused before the release
        rejected_approvals: usize,
    },
    /// No accepted signal within the budget; incident stays escalated
    TimedOut {
        /// Approval request
        request_id: String,
        /// APPROVE signals refused during the wait
        rejected_approvals: usize,
    },
    /// Operator aborted the wait; incident stays escalated
    Aborted {
        /// Approval request, if it was posted
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// The approval request could not be posted; incident stays escalated
    NotificationFailed {
        /// Failure detail
        message: String,
    },
}

impl EscalationOutcome {
    /// Check if the block was released
    #[must_use]
    pub fn is_released(&self) -> bool {
        matches!(self, EscalationOutcome::Released { .. })
    }
}

/// Learn-stage result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LearnOutcome {
    /// Runbook indexed
    Indexed {
        /// Document ID
        doc_id: String,
    },
    /// Nothing to learn
    Skipped {
        /// Why
        reason: String,
    },
    /// Indexer failed; the decision is unaffected
    Failed {
        /// Failure detail
        message: String,
    },
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run
    pub run_id: RunId,
    /// Incident
    pub incident_id: IncidentId,
    /// Validated plan
    pub plan: PlanOutput,
    /// Stress result
    pub stress: StressOutput,
    /// Context mode
    pub compress: CompressOutput,
    /// Gate decision
    pub gate: GateOutput,
    /// Risk label
    pub risk_level: RiskLevel,
    /// Planner/verifier disagreement and adaptability
    pub adaptability: Adaptability,
    /// Metrics provider that supplied the signals
    pub signals_source: String,
    /// Final gate state
    pub final_state: GateState,
    /// Dispatcher result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    /// Approval wait result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationOutcome>,
    /// Learn result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn: Option<LearnOutcome>,
    /// Audit writes that failed after the action
    #[serde(default)]
    pub alerts: Vec<OperationalAlert>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::{Decision, ReasonCode};

    fn stress(contradicted: bool) -> StressOutput {
        use relgate_core::{Claim, ClaimResult, ClaimStatus};
        StressOutput {
            incident_id: IncidentId::new("INC-1"),
            claim_results: vec![ClaimResult {
                claim_index: 0,
                claim: Claim::new("c"),
                status: if contradicted {
                    ClaimStatus::Contradicted
                } else {
                    ClaimStatus::Supported
                },
                supporting_doc_count: 1,
                contradicting_doc_count: usize::from(contradicted),
                fabricated_authority: false,
                lookup_failed: false,
            }],
            policy_conflicts: vec![],
            fabricated_authority_rejected: false,
            confidence_post_stress: 50.0,
            evidence_coverage: 1.0,
            documents_retrieved: 1,
        }
    }

    fn gate(decision: Decision, delta: f64) -> GateOutput {
        GateOutput {
            decision,
            reasons: vec![ReasonCode::ChecksPassed],
            confidence_delta: delta,
            requires_override: false,
        }
    }

    #[test]
    fn risk_levels() {
        assert_eq!(
            RiskLevel::assess(&gate(Decision::BlockAndEscalate, 0.0), &stress(false)),
            RiskLevel::High
        );
        assert_eq!(
            RiskLevel::assess(&gate(Decision::PartialExecute, -9.0), &stress(true)),
            RiskLevel::Medium
        );
        assert_eq!(
            RiskLevel::assess(&gate(Decision::Execute, -30.0), &stress(false)),
            RiskLevel::Medium
        );
        assert_eq!(
            RiskLevel::assess(&gate(Decision::Execute, -29.9), &stress(false)),
            RiskLevel::Controlled
        );
    }
}
