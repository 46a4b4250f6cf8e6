//! Reliability Gate Core
//!
//! Deterministic, auditable execute/escalate decisions for AI-proposed
//! remediation actions:
//! - Scoring functions for confidence, contradiction and context discipline
//! - Claim verification against evidence and policy (Stress)
//! - Context-mode selection (Compress)
//! - The safety gate and its state machine
//! - Collaborator contracts and persisted record shapes
//!
//! # Example
//!
//! ```rust,ignore
//! use relgate_core::prelude::*;
//!
//! let gate = SafetyGate::new(GateConfig::default());
//! let output = gate.evaluate(&plan, &stress, incident.severity())?;
//! if output.decision.is_block() {
//!     // escalate
//! }
//! ```

pub mod collaborators;
pub mod compress;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod records;
pub mod schema;
pub mod scoring;
pub mod state_machine;
pub mod steps;
pub mod types;
pub mod verifier;

pub use collaborators::{
    ActionPayload, ActionResult, ActionTrigger, ApprovalSignal, ApprovalSummary, AuditSink,
    CollaboratorResult, EvidenceHit, EvidenceRetriever, NotificationChannel, PlanReasoner,
    PolicyChecker, ReliabilityMetricsProvider, ReliabilitySignals, RunbookCandidate,
    RunbookIndexer, SignalKind, Stance,
};
pub use compress::ContextCompressor;
pub use config::{
    AuditConfig, EscalationConfig, GateConfig, PipelineConfig, RuntimeConfig, ScoringConfig,
    StressConfig,
};
pub use error::{
    CollaboratorError, GateViolation, PersistenceFailure, RelGateError, RelGateResult,
    ValidationError,
};
pub use gate::SafetyGate;
pub use metrics::{MetricsResolution, RankedMetricsProviders};
pub use records::{
    ActionExecutionRecord, ActionOutcome, AttemptPhase, AuditReceipt, AuditRecord,
    DecisionRecord, Stage, StageStatus, StageTransition, ToolCall, ToolInvocation, ToolStatus,
    WorkflowEvent, WorkflowOutcome,
};
pub use schema::{extract_json_object, VerificationHints};
pub use scoring::{assess_adaptability, Adaptability};
pub use state_machine::{GateState, GateTracker};
pub use steps::split_steps;
pub use types::{
    Claim, ClaimResult, ClaimStatus, CompressOutput, ContextMode, Decision, ExecutionMode,
    GateOutput, Incident, IncidentId, PlanOutput, PolicyConflict, ReasonCode, RunId, Severity,
    StressOutput,
};
pub use verifier::{ClaimVerifier, StressReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the Reliability Gate core
    pub use crate::{
        Claim, ClaimVerifier, ContextCompressor, Decision, GateConfig, GateOutput, Incident,
        PipelineConfig, PlanOutput, ReasonCode, RelGateError, RelGateResult, SafetyGate, Severity,
        StressOutput,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
