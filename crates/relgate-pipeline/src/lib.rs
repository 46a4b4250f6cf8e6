//! Reliability Gate Pipeline
//!
//! Orchestrates one incident at a time through
//! Plan → Stress → Compress → Gate → Execute/Escalate → Learn, writing an
//! audit record at every stage boundary and around every action.
//!
//! # Example
//!
//! ```rust,ignore
//! use relgate_pipeline::{abort_pair, Collaborators, Pipeline};
//!
//! let pipeline = Pipeline::new(config, collaborators)?;
//! let (handle, abort) = abort_pair();
//! let report = pipeline.run(incident, &abort).await?;
//! println!("{} -> {}", report.gate.decision, report.final_state);
//! ```

pub mod abort;
pub mod dispatcher;
pub mod escalation;
pub mod learn;
pub mod memory;
pub mod orchestrator;
pub mod recorder;
pub mod report;
pub mod simulator;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use dispatcher::ExecutionDispatcher;
pub use escalation::{approval_summary, BlockedDecision, Escalator};
pub use learn::{runbook_candidate, Learner, LEARNED_SOURCE};
pub use memory::{
    EvidenceDocument, InMemoryEvidenceIndex, InMemoryPolicyTable, LoggingActionTrigger,
    PolicyRule, ScriptedNotifier, ScriptedReasoner, StaticMetricsProvider,
};
pub use orchestrator::{Collaborators, Pipeline};
pub use recorder::RunRecorder;
pub use report::{
    EscalationOutcome, ExecutionReport, LearnOutcome, OperationalAlert, RiskLevel, RunReport,
};
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
