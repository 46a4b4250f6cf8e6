//! Learn stage
//!
//! Successful resolutions are offered back to the runbook corpus. Runs after
//! the decision and execution are committed; a failure here is logged and
//! never touches them.

use crate::report::{ExecutionReport, LearnOutcome};
use relgate_core::{
    ActionOutcome, CollaboratorError, ExecutionMode, Incident, PlanOutput, RunbookCandidate,
    RunbookIndexer, StressOutput, ToolCall,
};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

/// Origin tag on learned runbooks
pub const LEARNED_SOURCE: &str = "agent_learning";

/// Build the runbook candidate for a finished execution
#[must_use]
pub fn runbook_candidate(
    incident: &Incident,
    plan: &PlanOutput,
    stress: &StressOutput,
    execution: &ExecutionReport,
) -> RunbookCandidate {
    let recommended_action = if execution.mode == ExecutionMode::Guarded {
        execution.steps.join(" ; ")
    } else {
        plan.proposed_action().to_string()
    };
    let mut body = String::new();
    let _ = writeln!(
        body,
        "Incident {} on {} ({}): {}",
        incident.id(),
        incident.service(),
        incident.severity(),
        incident.summary()
    );
    if !incident.symptoms().is_empty() {
        let _ = writeln!(body, "Symptoms: {}", incident.symptoms());
    }
    if !plan.rationale().is_empty() {
        let _ = writeln!(body, "Rationale: {}", plan.rationale());
    }
    let _ = writeln!(
        body,
        "Action ({}): {recommended_action}\nOutcome: {}\nConfidence: {:.1} -> {:.1}",
        execution.mode.as_str(),
        execution.details,
        plan.confidence_initial(),
        stress.confidence_post_stress
    );

    RunbookCandidate {
        title: format!("Resolved: {}", incident.summary()),
        service: incident.service().to_string(),
        recommended_action,
        body,
        source: LEARNED_SOURCE.to_string(),
        final_confidence: stress.confidence_post_stress,
        outcome: execution.details.clone(),
    }
}

/// Feeds resolutions to the runbook indexer
#[derive(Clone)]
pub struct Learner {
    indexer: Arc<dyn RunbookIndexer>,
    timeout: Duration,
}

impl Learner {
    /// Create new learner
    #[must_use]
    pub fn new(indexer: Arc<dyn RunbookIndexer>, timeout: Duration) -> Self {
        Self { indexer, timeout }
    }

    /// Index the resolution if the action succeeded
    pub async fn learn(
        &self,
        incident: &Incident,
        plan: &PlanOutput,
        stress: &StressOutput,
        execution: &ExecutionReport,
    ) -> (LearnOutcome, Option<ToolCall>) {
        if execution.outcome != ActionOutcome::Succeeded {
            return (
                LearnOutcome::Skipped {
                    reason: "action did not succeed".to_string(),
                },
                None,
            );
        }

        let candidate = runbook_candidate(incident, plan, stress, execution);
        let indexed = tokio::time::timeout(self.timeout, self.indexer.index_runbook(&candidate))
            .await
            .map_err(|_| CollaboratorError::timeout("runbook_indexer", self.timeout))
            .and_then(|r| r);

        match indexed {
            Ok(doc_id) => {
                tracing::info!(incident_id = %incident.id(), doc_id = %doc_id, "learned runbook indexed");
                let call = ToolCall::ok("runbook_indexer", "index_runbook", doc_id.clone());
                (LearnOutcome::Indexed { doc_id }, Some(call))
            }
            Err(e) => {
                tracing::warn!(incident_id = %incident.id(), error = %e, "learn stage failed, decision unaffected");
                let call = ToolCall::failed("runbook_indexer", "index_runbook", &e);
                (
                    LearnOutcome::Failed {
                        message: e.to_string(),
                    },
                    Some(call),
                )
            }
        }
    }
}

impl std::fmt::Debug for Learner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Learner")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::Severity;
    use relgate_test_utils::{incident, plan};
    use ulid::Ulid;

    fn execution(mode: ExecutionMode, steps: &[&str]) -> ExecutionReport {
        ExecutionReport {
            attempt_id: Ulid::new(),
            mode,
            steps: steps.iter().map(|s| (*s).to_string()).collect(),
            outcome: ActionOutcome::Succeeded,
            details: "trigger accepted".to_string(),
            approver: None,
            alert: None,
        }
    }

    fn stress(incident: &Incident, confidence: f64) -> StressOutput {
        StressOutput {
            incident_id: incident.id().clone(),
            claim_results: Vec::new(),
            policy_conflicts: Vec::new(),
            fabricated_authority_rejected: false,
            confidence_post_stress: confidence,
            evidence_coverage: 1.0,
            documents_retrieved: 0,
        }
    }

    #[test]
    fn candidate_body_lists_each_section_on_its_own_line() {
        let incident = incident("INC-40", Severity::Medium);
        let plan = plan(&incident, &["pool saturated"], 80.0);
        let candidate = runbook_candidate(
            &incident,
            &plan,
            &stress(&incident, 72.5),
            &execution(ExecutionMode::Full, &["restart"]),
        );

        let lines: Vec<_> = candidate.body.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Incident INC-40 on checkout (medium): INC-40: elevated 5xx on checkout",
                "Symptoms: p99 latency above 2s; connection pool saturation",
                "Rationale: matches previous incidents",
                "Action (full): 1. Restart checkout pods 2. Verify error rate",
                "Outcome: trigger accepted",
                "Confidence: 80.0 -> 72.5",
            ]
        );
        assert!(candidate.body.ends_with('\n'));
        assert_eq!(candidate.source, LEARNED_SOURCE);
    }

    #[test]
    fn guarded_candidate_records_only_dispatched_steps() {
        let incident = Incident::new("INC-41", "checkout", Severity::Low, "slow checkout");
        let plan = plan(&incident, &["pool saturated"], 60.0);
        let candidate = runbook_candidate(
            &incident,
            &plan,
            &stress(&incident, 45.0),
            &execution(ExecutionMode::Guarded, &["1. Restart checkout pods"]),
        );

        assert_eq!(candidate.recommended_action, "1. Restart checkout pods");
        assert!(!candidate.body.contains("Symptoms:"));
        assert!(candidate.body.contains("Action (guarded): 1. Restart checkout pods\n"));
    }
}
