//! Collaborator contracts
//!
//! Every external capability the pipeline consumes sits behind one of these
//! traits and is held as `Arc<dyn Trait>`. Implementations must be safe to
//! call concurrently from independent incident runs.

use crate::error::{CollaboratorError, PersistenceFailure};
use crate::records::{AuditReceipt, AuditRecord};
use crate::types::{
    ExecutionMode, Incident, IncidentId, PlanOutput, PolicyConflict, Severity,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result alias for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// How a document relates to the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    /// Backs the claim
    Supports,
    /// Refutes the claim
    Contradicts,
    /// Related but not conclusive
    #[default]
    Neutral,
}

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    /// Stable document ID
    pub doc_id: String,
    /// Matched text
    pub text: String,
    /// Retrieval score
    pub score: f64,
    /// Source the document came from
    #[serde(default)]
    pub authority: String,
    /// Relation to the query
    #[serde(default)]
    pub stance: Stance,
}

/// Evidence / runbook retrieval
#[async_trait::async_trait]
pub trait EvidenceRetriever: Send + Sync {
    /// Ranked hits for `query` within `service`; empty when nothing matches
    async fn search(
        &self,
        query: &str,
        service: &str,
        top_k: usize,
    ) -> CollaboratorResult<Vec<EvidenceHit>>;

    /// Check if `authority` names a source present in the index
    async fn resolve_authority(&self, authority: &str) -> CollaboratorResult<bool>;
}

/// Policy check
#[async_trait::async_trait]
pub trait PolicyChecker: Send + Sync {
    /// Conflicts for the action; empty means allowed
    async fn check_conflicts(
        &self,
        service: &str,
        action: &str,
        severity: Severity,
    ) -> CollaboratorResult<Vec<PolicyConflict>>;
}

/// Plan / verification reasoner
///
/// Output is untrusted JSON and must pass boundary validation before use.
#[async_trait::async_trait]
pub trait PlanReasoner: Send + Sync {
    /// Raw plan for the incident
    async fn propose(&self, incident: &Incident) -> CollaboratorResult<serde_json::Value>;

    /// Raw verification hints for the plan
    async fn verify(
        &self,
        plan: &PlanOutput,
        incident: &Incident,
    ) -> CollaboratorResult<serde_json::Value>;
}

/// Reliability signals for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilitySignals {
    /// Fabrication / robustness risk in `[0, 1]`
    pub fabrication_signal: f64,
    /// Claim divergence in `[0, 1]`
    pub divergence_signal: f64,
    /// Evidence volume the model typically needs
    pub evidence_volume: f64,
    /// Provider that answered, or `fallback`
    pub source: String,
}

/// Reliability metrics source
#[async_trait::async_trait]
pub trait ReliabilityMetricsProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Signals for `model_id`
    async fn signals(&self, model_id: &str) -> CollaboratorResult<ReliabilitySignals>;
}

/// Kind of human signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// Approve a non-critical block
    Approve,
    /// Force execution regardless of the block
    ForceOverride,
}

impl SignalKind {
    /// Parse a free-text reply; `force_override` wins over `approve`
    #[must_use]
    pub fn parse_reply(text: &str) -> Option<Self> {
        let lowered = text.to_ascii_lowercase();
        if lowered.contains("force_override") || lowered.contains("force override") {
            Some(SignalKind::ForceOverride)
        } else if lowered.contains("approve") {
            Some(SignalKind::Approve)
        } else {
            None
        }
    }
}

/// A human reply to an approval request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSignal {
    /// Signal
    pub kind: SignalKind,
    /// Identity of the human
    pub approver: String,
}

/// Structured approval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    /// Incident
    pub incident_id: IncidentId,
    /// Service
    pub service: String,
    /// Severity
    pub severity: Severity,
    /// Decision wire name
    pub decision: String,
    /// Human-readable reasons
    pub reasons: Vec<String>,
    /// Plan confidence
    pub confidence_initial: f64,
    /// Confidence after Stress
    pub confidence_post_stress: f64,
    /// `post - initial`
    pub confidence_delta: f64,
    /// Supported claims
    pub supported_claims: usize,
    /// Contradicted claims
    pub contradicted_claims: usize,
    /// Policy conflicts
    pub policy_conflicts: usize,
    /// `high`, `medium` or `controlled`
    pub risk_level: String,
    /// Proposed action
    pub proposed_action: String,
    /// First action steps
    pub steps: Vec<String>,
    /// Only `FORCE_OVERRIDE` is accepted
    pub requires_override: bool,
}

/// Notification channel
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Post an approval request; returns its request ID
    async fn post_approval_request(&self, summary: &ApprovalSummary) -> CollaboratorResult<String>;

    /// Wait up to `budget` for a signal on `request_id`
    async fn poll_for_signal(
        &self,
        request_id: &str,
        budget: Duration,
    ) -> CollaboratorResult<Option<ApprovalSignal>>;
}

/// What the action trigger is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Incident
    pub incident_id: IncidentId,
    /// Service
    pub service: String,
    /// Full proposed action
    pub action: String,
    /// Steps to run; one step in guarded mode
    pub steps: Vec<String>,
    /// Dispatch mode
    pub mode: ExecutionMode,
}

/// Trigger response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Trigger reported success
    pub success: bool,
    /// Trigger detail
    pub details: String,
}

/// Action trigger
#[async_trait::async_trait]
pub trait ActionTrigger: Send + Sync {
    /// Run the action once
    async fn execute(&self, payload: &ActionPayload) -> CollaboratorResult<ActionResult>;
}

/// A resolution offered back to the runbook corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunbookCandidate {
    /// Title
    pub title: String,
    /// Service
    pub service: String,
    /// Action that resolved the incident
    pub recommended_action: String,
    /// Resolution summary
    pub body: String,
    /// Origin tag
    pub source: String,
    /// Confidence after Stress
    pub final_confidence: f64,
    /// Outcome text
    pub outcome: String,
}

/// Runbook indexing
#[async_trait::async_trait]
pub trait RunbookIndexer: Send + Sync {
    /// Index a learned runbook; returns its document ID
    async fn index_runbook(&self, candidate: &RunbookCandidate) -> CollaboratorResult<String>;
}

/// Durable append-only audit log
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record; `Ok` means durably acknowledged
    async fn append(&self, record: AuditRecord) -> Result<AuditReceipt, PersistenceFailure>;
}
