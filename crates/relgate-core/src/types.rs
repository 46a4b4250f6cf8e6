//! Core types for the Reliability Gate
//!
//! Defines the data model shared by every stage:
//! - Incidents and their severity
//! - Plan output and its claims
//! - Stress, compress and gate outputs

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Externally assigned incident identifier (e.g. `INC-1042`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub String);

impl IncidentId {
    /// Create new incident ID
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Unique pipeline run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incident severity; drives gate strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low impact
    Low,
    /// Medium impact
    Medium,
    /// High impact
    High,
    /// Critical impact; always requires a human override
    Critical,
}

impl Severity {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Check if this severity is an unconditional human-in-the-loop gate
    #[inline]
    #[must_use]
    pub fn is_critical(self) -> bool {
        self == Severity::Critical
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ValidationError::new(
                "incident.severity",
                format!("unknown severity '{other}'"),
            )),
        }
    }
}

/// A production anomaly under remediation
///
/// Fields are private: an incident is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    id: IncidentId,
    service: String,
    severity: Severity,
    summary: String,
    #[serde(default)]
    symptoms: String,
}

impl Incident {
    /// Create new incident
    #[must_use]
    pub fn new(
        id: impl Into<IncidentId>,
        service: impl Into<String>,
        severity: Severity,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            severity,
            summary: summary.into(),
            symptoms: String::new(),
        }
    }

    /// With symptom text
    #[must_use]
    pub fn with_symptoms(mut self, symptoms: impl Into<String>) -> Self {
        self.symptoms = symptoms.into();
        self
    }

    /// Incident ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> &IncidentId {
        &self.id
    }

    /// Affected service
    #[inline]
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Severity
    #[inline]
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// One-line summary
    #[inline]
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Symptom text
    #[inline]
    #[must_use]
    pub fn symptoms(&self) -> &str {
        &self.symptoms
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An atomic factual assertion backing the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Assertion text
    pub text: String,
    /// Source the planner cites for this claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_authority: Option<String>,
}

impl Claim {
    /// Create new claim without a citation
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cited_authority: None,
        }
    }

    /// With cited authority
    #[inline]
    #[must_use]
    pub fn citing(mut self, authority: impl Into<String>) -> Self {
        self.cited_authority = Some(authority.into());
        self
    }
}

/// Proposed remediation
///
/// `confidence_initial` is set once at construction and read-only downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlanOutput")]
pub struct PlanOutput {
    incident_id: IncidentId,
    proposed_action: String,
    rationale: String,
    claims: Vec<Claim>,
    confidence_initial: f64,
}

/// Persisted plan shape, validated into `PlanOutput`
#[derive(Deserialize)]
struct RawPlanOutput {
    incident_id: IncidentId,
    proposed_action: String,
    #[serde(default)]
    rationale: String,
    claims: Vec<Claim>,
    confidence_initial: f64,
}

impl TryFrom<RawPlanOutput> for PlanOutput {
    type Error = ValidationError;

    fn try_from(raw: RawPlanOutput) -> Result<Self, Self::Error> {
        Self::new(
            raw.incident_id,
            raw.proposed_action,
            raw.rationale,
            raw.claims,
            raw.confidence_initial,
        )
    }
}

impl PlanOutput {
    /// Create a validated plan
    ///
    /// # Errors
    /// `ValidationError` if the action is blank, there are no claims, a claim
    /// is blank, or confidence is outside `[0, 100]`.
    pub fn new(
        incident_id: IncidentId,
        proposed_action: impl Into<String>,
        rationale: impl Into<String>,
        claims: Vec<Claim>,
        confidence_initial: f64,
    ) -> Result<Self, ValidationError> {
        let proposed_action = proposed_action.into();
        if proposed_action.trim().is_empty() {
            return Err(ValidationError::new("plan.proposed_action", "must not be empty"));
        }
        if claims.is_empty() {
            return Err(ValidationError::new("plan.key_claims", "must not be empty"));
        }
        if let Some(idx) = claims.iter().position(|c| c.text.trim().is_empty()) {
            return Err(ValidationError::new(
                format!("plan.key_claims[{idx}]"),
                "claim text must not be empty",
            ));
        }
        if !confidence_initial.is_finite() || !(0.0..=100.0).contains(&confidence_initial) {
            return Err(ValidationError::new(
                "plan.confidence_initial",
                format!("{confidence_initial} is outside [0, 100]"),
            ));
        }
        Ok(Self {
            incident_id,
            proposed_action,
            rationale: rationale.into(),
            claims,
            confidence_initial,
        })
    }

    /// Incident the plan remediates
    #[inline]
    #[must_use]
    pub fn incident_id(&self) -> &IncidentId {
        &self.incident_id
    }

    /// Proposed action text
    #[inline]
    #[must_use]
    pub fn proposed_action(&self) -> &str {
        &self.proposed_action
    }

    /// Planner rationale
    #[inline]
    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Ordered claims
    #[inline]
    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Initial confidence in `[0, 100]`
    #[inline]
    #[must_use]
    pub fn confidence_initial(&self) -> f64 {
        self.confidence_initial
    }
}

/// Verification status of one claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// At least one supporting document and no contradicting ones
    Supported,
    /// At least one contradicting document (sticky)
    Contradicted,
    /// Nothing found, or the lookup failed
    Unsupported,
}

impl ClaimStatus {
    /// Classify from document counts
    ///
    /// Contradiction is sticky: any contradicting document wins over any
    /// volume of support.
    #[inline]
    #[must_use]
    pub fn classify(supporting: usize, contradicting: usize) -> Self {
        if contradicting > 0 {
            ClaimStatus::Contradicted
        } else if supporting > 0 {
            ClaimStatus::Supported
        } else {
            ClaimStatus::Unsupported
        }
    }
}

/// Verification outcome for one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    /// Position of the claim in the plan
    pub claim_index: usize,
    /// The claim itself
    pub claim: Claim,
    /// Exactly one status per claim
    pub status: ClaimStatus,
    /// Distinct supporting documents
    pub supporting_doc_count: usize,
    /// Distinct contradicting documents
    pub contradicting_doc_count: usize,
    /// Cited authority did not resolve in the evidence index
    pub fabricated_authority: bool,
    /// Evidence lookup failed and the claim was downgraded
    pub lookup_failed: bool,
}

/// A policy that forbids the proposed action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyConflict {
    /// Policy identifier
    pub policy_id: String,
    /// Human-readable description
    pub description: String,
}

impl PolicyConflict {
    /// Create new conflict descriptor
    #[inline]
    #[must_use]
    pub fn new(policy_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            description: description.into(),
        }
    }
}

/// Aggregated verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressOutput {
    /// Incident under verification
    pub incident_id: IncidentId,
    /// One result per claim, in plan order
    pub claim_results: Vec<ClaimResult>,
    /// Policy conflicts for (service, action, severity)
    pub policy_conflicts: Vec<PolicyConflict>,
    /// At least one claim cited an authority that does not exist
    pub fabricated_authority_rejected: bool,
    /// Confidence after adjustment and contradiction penalty, in `[0, 100]`
    pub confidence_post_stress: f64,
    /// Fraction of claims with at least one supporting document
    pub evidence_coverage: f64,
    /// Distinct documents retrieved across all claims
    pub documents_retrieved: usize,
}

impl StressOutput {
    /// Number of contradicted claims
    #[must_use]
    pub fn contradicted_count(&self) -> usize {
        self.count_status(ClaimStatus::Contradicted)
    }

    /// Number of supported claims
    #[must_use]
    pub fn supported_count(&self) -> usize {
        self.count_status(ClaimStatus::Supported)
    }

    /// Supporting documents summed over all claims
    #[must_use]
    pub fn total_supporting_docs(&self) -> usize {
        self.claim_results.iter().map(|r| r.supporting_doc_count).sum()
    }

    /// Contradicting documents summed over all claims
    #[must_use]
    pub fn total_contradicting_docs(&self) -> usize {
        self.claim_results
            .iter()
            .map(|r| r.contradicting_doc_count)
            .sum()
    }

    fn count_status(&self, status: ClaimStatus) -> usize {
        self.claim_results
            .iter()
            .filter(|r| r.status == status)
            .count()
    }
}

/// Fraction of claims with at least one supporting document
///
/// An empty claim set has zero coverage.
#[must_use]
pub fn evidence_coverage(results: &[ClaimResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let covered = results.iter().filter(|r| r.supporting_doc_count > 0).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = covered as f64 / results.len() as f64;
    ratio
}

/// Evidence context forwarded downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Forward all evidence
    FullContext,
    /// Forward a compressed digest
    CompressedContext,
}

impl ContextMode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContextMode::FullContext => "full_context",
            ContextMode::CompressedContext => "compressed_context",
        }
    }
}

/// Context-mode decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressOutput {
    /// Selected mode
    pub mode: ContextMode,
    /// Context-discipline magnitude the mode was derived from
    pub magnitude: f64,
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Run the proposed action
    Execute,
    /// Run only the first step of the proposed action under guardrails
    PartialExecute,
    /// Do nothing; ask a human
    BlockAndEscalate,
}

impl Decision {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Execute => "execute",
            Decision::PartialExecute => "partial_execute",
            Decision::BlockAndEscalate => "block_and_escalate",
        }
    }

    /// Check if the decision blocks the action
    #[inline]
    #[must_use]
    pub fn is_block(self) -> bool {
        self == Decision::BlockAndEscalate
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason attached to a gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// A policy forbids the action
    PolicyConflict,
    /// Too many contradicted claims
    ExcessContradiction,
    /// Low coverage and no supporting documents at all
    InsufficientEvidence,
    /// Critical severity always needs a human override
    CriticalRequiresOverride,
    /// Exactly one contradicted claim
    SingleContradiction,
    /// A claim cited an authority that does not exist
    FabricatedAuthority,
    /// Every check passed
    ChecksPassed,
}

impl ReasonCode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::PolicyConflict => "policy_conflict",
            ReasonCode::ExcessContradiction => "excess_contradiction",
            ReasonCode::InsufficientEvidence => "insufficient_evidence",
            ReasonCode::CriticalRequiresOverride => "critical_requires_override",
            ReasonCode::SingleContradiction => "single_contradiction",
            ReasonCode::FabricatedAuthority => "fabricated_authority",
            ReasonCode::ChecksPassed => "checks_passed",
        }
    }

    /// Human-readable explanation
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            ReasonCode::PolicyConflict => "Proposed action conflicts with an active policy",
            ReasonCode::ExcessContradiction => "Multiple claims are contradicted by evidence",
            ReasonCode::InsufficientEvidence => {
                "Insufficient evidence coverage for safe auto-remediation"
            }
            ReasonCode::CriticalRequiresOverride => {
                "Critical severity requires an explicit human override"
            }
            ReasonCode::SingleContradiction => {
                "One claim is contradicted; executing first step with guardrails"
            }
            ReasonCode::FabricatedAuthority => {
                "A cited authority does not exist; executing first step with guardrails"
            }
            ReasonCode::ChecksPassed => "Validated against evidence and policy; safety checks passed",
        }
    }

    /// Check if this reason blocks execution
    #[inline]
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            ReasonCode::PolicyConflict
                | ReasonCode::ExcessContradiction
                | ReasonCode::InsufficientEvidence
                | ReasonCode::CriticalRequiresOverride
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final gate decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutput {
    /// Decision
    pub decision: Decision,
    /// Ordered machine-readable reasons
    pub reasons: Vec<ReasonCode>,
    /// `confidence_post_stress - confidence_initial`
    pub confidence_delta: f64,
    /// Only a `FORCE_OVERRIDE` signal may release this decision
    pub requires_override: bool,
}

impl GateOutput {
    /// Human-readable reasons, in order
    #[must_use]
    pub fn reason_texts(&self) -> Vec<&'static str> {
        self.reasons.iter().map(|r| r.describe()).collect()
    }
}

/// How an action is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Whole action after an `execute` decision
    Full,
    /// First step only after a `partial_execute` decision
    Guarded,
    /// Whole action after a human released a block
    Override,
}

impl ExecutionMode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Full => "full",
            ExecutionMode::Guarded => "guarded",
            ExecutionMode::Override => "override",
        }
    }
}
