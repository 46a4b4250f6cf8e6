//! KPI summary over an audit trail

use relgate_core::{
    ActionOutcome, AttemptPhase, AuditRecord, Decision, WorkflowOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Triage minutes saved by a run that executed without a human
pub const MINUTES_SAVED_AUTO: f64 = 12.0;
/// Triage minutes saved by an escalation that arrives pre-packaged
pub const MINUTES_SAVED_ESCALATED: f64 = 4.0;

/// Label for decisions recorded without a model identifier
const UNKNOWN_MODEL: &str = "unknown";

/// Per-model gate metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelKpi {
    /// Runs that reached the gate
    pub runs: usize,
    /// Mean adaptability score
    pub avg_adaptability: f64,
    /// Blocks over runs
    pub escalation_rate: f64,
}

/// Aggregate gate metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    /// Runs that reached the gate
    pub runs: usize,
    /// `execute` decisions
    pub executed: usize,
    /// `partial_execute` decisions
    pub partially_executed: usize,
    /// `block_and_escalate` decisions
    pub escalated: usize,
    /// Blocks over runs
    pub escalation_rate: f64,
    /// Non-blocking decisions over runs
    pub auto_execute_rate: f64,
    /// Mean `confidence_delta`
    pub avg_confidence_delta: f64,
    /// Mean evidence coverage
    pub avg_evidence_coverage: f64,
    /// Mean adaptability score
    pub avg_adaptability: f64,
    /// Runs with planner/verifier disagreement over runs
    pub disagreement_rate: f64,
    /// Rough triage time saved, averaged over runs
    pub estimated_minutes_saved_per_run: f64,
    /// Breakdown per model identifier
    pub by_model: BTreeMap<String, ModelKpi>,
    /// Runs per context mode
    pub by_context_mode: BTreeMap<String, usize>,
    /// Runs per severity
    pub by_severity: BTreeMap<String, usize>,
    /// Runs per first reason code
    pub by_reason: BTreeMap<String, usize>,
    /// Completed action attempts that succeeded
    pub actions_succeeded: usize,
    /// Completed action attempts that failed
    pub actions_failed: usize,
    /// Attempts with no completion record
    pub actions_incomplete: usize,
    /// Human releases (approved or overridden)
    pub human_releases: usize,
    /// Rejected approvals
    pub rejected_approvals: usize,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Summarize records in append order
#[must_use]
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> KpiSummary {
    let mut summary = KpiSummary::default();
    let mut delta_sum = 0.0;
    let mut coverage_sum = 0.0;
    let mut adaptability_sum = 0.0;
    let mut minutes_sum = 0.0;
    let mut disagreements = 0usize;
    // runs, escalations, adaptability sum
    let mut models: BTreeMap<String, (usize, usize, f64)> = BTreeMap::new();
    let mut attempted = 0usize;
    let mut completed = 0usize;

    for record in records {
        match record {
            AuditRecord::Decision(d) => {
                summary.runs += 1;
                match d.gate.decision {
                    Decision::Execute => summary.executed += 1,
                    Decision::PartialExecute => summary.partially_executed += 1,
                    Decision::BlockAndEscalate => summary.escalated += 1,
                }
                let blocked = d.gate.decision.is_block();
                delta_sum += d.gate.confidence_delta;
                coverage_sum += d.evidence_coverage;
                adaptability_sum += d.adaptability_score;
                minutes_sum += if blocked {
                    MINUTES_SAVED_ESCALATED
                } else {
                    MINUTES_SAVED_AUTO
                };
                if d.disagreement_detected {
                    disagreements += 1;
                }
                let model = if d.model_id.is_empty() {
                    UNKNOWN_MODEL
                } else {
                    d.model_id.as_str()
                };
                let entry = models.entry(model.to_string()).or_default();
                entry.0 += 1;
                entry.1 += usize::from(blocked);
                entry.2 += d.adaptability_score;
                *summary
                    .by_context_mode
                    .entry(d.context_mode.as_str().to_string())
                    .or_default() += 1;
                *summary
                    .by_severity
                    .entry(d.severity.as_str().to_string())
                    .or_default() += 1;
                if let Some(reason) = d.gate.reasons.first() {
                    *summary.by_reason.entry(reason.as_str().to_string()).or_default() += 1;
                }
            }
            AuditRecord::ActionExecution(a) => match a.phase {
                AttemptPhase::Attempted => attempted += 1,
                AttemptPhase::Completed => {
                    completed += 1;
                    match a.outcome {
                        Some(ActionOutcome::Succeeded) => summary.actions_succeeded += 1,
                        Some(ActionOutcome::Failed) | None => summary.actions_failed += 1,
                    }
                }
            },
            AuditRecord::Workflow(w) => match w.outcome {
                WorkflowOutcome::Approved | WorkflowOutcome::Overridden => {
                    summary.human_releases += 1;
                }
                WorkflowOutcome::Rejected => summary.rejected_approvals += 1,
                _ => {}
            },
            AuditRecord::StageTransition(_) | AuditRecord::ToolInvocation(_) => {}
        }
    }

    summary.actions_incomplete = attempted.saturating_sub(completed);
    summary.escalation_rate = ratio(summary.escalated, summary.runs);
    summary.auto_execute_rate = ratio(summary.executed + summary.partially_executed, summary.runs);
    if summary.runs > 0 {
        #[allow(clippy::cast_precision_loss)]
        let runs = summary.runs as f64;
        summary.avg_confidence_delta = delta_sum / runs;
        summary.avg_evidence_coverage = coverage_sum / runs;
        summary.avg_adaptability = adaptability_sum / runs;
        summary.estimated_minutes_saved_per_run = minutes_sum / runs;
    }
    summary.disagreement_rate = ratio(disagreements, summary.runs);
    summary.by_model = models
        .into_iter()
        .map(|(model, (runs, escalated, adaptability))| {
            #[allow(clippy::cast_precision_loss)]
            let avg_adaptability = adaptability / runs as f64;
            let kpi = ModelKpi {
                runs,
                avg_adaptability,
                escalation_rate: ratio(escalated, runs),
            };
            (model, kpi)
        })
        .collect();
    summary
}

impl fmt::Display for KpiSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "runs:                  {}", self.runs)?;
        writeln!(
            f,
            "decisions:             execute={} partial_execute={} block_and_escalate={}",
            self.executed, self.partially_executed, self.escalated
        )?;
        writeln!(f, "escalation rate:       {:.1}%", self.escalation_rate * 100.0)?;
        writeln!(f, "auto-execute rate:     {:.1}%", self.auto_execute_rate * 100.0)?;
        writeln!(f, "avg confidence delta:  {:+.2}", self.avg_confidence_delta)?;
        writeln!(f, "avg evidence coverage: {:.2}", self.avg_evidence_coverage)?;
        writeln!(f, "avg adaptability:      {:.4}", self.avg_adaptability)?;
        writeln!(f, "disagreement rate:     {:.1}%", self.disagreement_rate * 100.0)?;
        writeln!(
            f,
            "minutes saved per run: {:.2}",
            self.estimated_minutes_saved_per_run
        )?;
        writeln!(
            f,
            "actions:               succeeded={} failed={} incomplete={}",
            self.actions_succeeded, self.actions_failed, self.actions_incomplete
        )?;
        writeln!(
            f,
            "human decisions:       released={} rejected={}",
            self.human_releases, self.rejected_approvals
        )?;
        for (model, kpi) in &self.by_model {
            writeln!(
                f,
                "model {model}: runs={} avg_adaptability={:.4} escalation={:.1}%",
                kpi.runs,
                kpi.avg_adaptability,
                kpi.escalation_rate * 100.0
            )?;
        }
        for (mode, count) in &self.by_context_mode {
            writeln!(f, "context {mode}: {count}")?;
        }
        for (severity, count) in &self.by_severity {
            writeln!(f, "severity {severity}: {count}")?;
        }
        for (reason, count) in &self.by_reason {
            writeln!(f, "reason {reason}: {count}")?;
        }
        Ok(())
    }
}
