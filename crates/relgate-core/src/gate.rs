//! Safety gate
//!
//! A pure function of (plan, stress, severity). Rules are evaluated in fixed
//! priority order and the first match wins:
//!
//! 1. policy conflict
//! 2. contradicted claims at or above the block count
//! 3. coverage below threshold with zero supporting documents
//! 4. critical severity (override required)
//! 5. advisory: single contradiction or fabricated authority (partial execute)
//! 6. execute
//!
//! Every output is checked against the gate's own contract before it is
//! returned; a breach is a `GateViolation` and nothing may execute.

use crate::config::GateConfig;
use crate::error::GateViolation;
use crate::types::{Decision, GateOutput, PlanOutput, ReasonCode, Severity, StressOutput};

/// Deterministic execute/escalate decision function
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyGate {
    config: GateConfig,
}

impl SafetyGate {
    /// Create new gate
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Gate thresholds
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide
    ///
    /// # Errors
    /// `GateViolation` if the inputs belong to different incidents or the
    /// decision breaks the gate contract.
    pub fn evaluate(
        &self,
        plan: &PlanOutput,
        stress: &StressOutput,
        severity: Severity,
    ) -> Result<GateOutput, GateViolation> {
        if plan.incident_id() != &stress.incident_id {
            return Err(GateViolation(format!(
                "plan for {} evaluated against stress output for {}",
                plan.incident_id(),
                stress.incident_id
            )));
        }

        let confidence_delta = stress.confidence_post_stress - plan.confidence_initial();
        let (decision, reasons) = self.decide(stress, severity);
        let output = GateOutput {
            decision,
            requires_override: severity.is_critical(),
            reasons,
            confidence_delta,
        };
        check_invariants(&output, plan, stress, severity)?;
        Ok(output)
    }

    fn decide(&self, stress: &StressOutput, severity: Severity) -> (Decision, Vec<ReasonCode>) {
        let block = |reason| (Decision::BlockAndEscalate, vec![reason]);
        let contradicted = stress.contradicted_count();

        if !stress.policy_conflicts.is_empty() {
            return block(ReasonCode::PolicyConflict);
        }
        if contradicted >= self.config.contradiction_block_count {
            return block(ReasonCode::ExcessContradiction);
        }
        if stress.evidence_coverage < self.config.coverage_threshold
            && stress.total_supporting_docs() == 0
        {
            return block(ReasonCode::InsufficientEvidence);
        }
        if severity.is_critical() {
            return block(ReasonCode::CriticalRequiresOverride);
        }

        if self.config.partial_execute_on_advisory {
            let mut advisories = Vec::new();
            if contradicted == 1 {
                advisories.push(ReasonCode::SingleContradiction);
            }
            if stress.fabricated_authority_rejected {
                advisories.push(ReasonCode::FabricatedAuthority);
            }
            if !advisories.is_empty() {
                return (Decision::PartialExecute, advisories);
            }
        }
        (Decision::Execute, vec![ReasonCode::ChecksPassed])
    }
}

fn check_invariants(
    output: &GateOutput,
    plan: &PlanOutput,
    stress: &StressOutput,
    severity: Severity,
) -> Result<(), GateViolation> {
    if output.reasons.is_empty() {
        return Err(GateViolation("decision carries no reasons".to_string()));
    }
    let blocking = output.reasons.iter().any(|r| r.is_blocking());
    if blocking != output.decision.is_block() {
        return Err(GateViolation(format!(
            "decision {} inconsistent with reasons {:?}",
            output.decision, output.reasons
        )));
    }
    if !stress.policy_conflicts.is_empty() && !output.decision.is_block() {
        return Err(GateViolation("policy conflict did not block".to_string()));
    }
    if severity.is_critical() && !output.decision.is_block() {
        return Err(GateViolation("critical incident did not block".to_string()));
    }
    if output.requires_override && !output.decision.is_block() {
        return Err(GateViolation("override required on a non-blocking decision".to_string()));
    }
    if output.requires_override != severity.is_critical() {
        return Err(GateViolation(format!(
            "requires_override {} on a {severity} incident",
            output.requires_override
        )));
    }
    if output.confidence_delta.is_nan()
        || output.confidence_delta.to_bits()
            != (stress.confidence_post_stress - plan.confidence_initial()).to_bits()
    {
        return Err(GateViolation(format!(
            "confidence delta {} does not match post - initial",
            output.confidence_delta
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Claim, ClaimResult, ClaimStatus, IncidentId, PolicyConflict};
    use pretty_assertions::assert_eq;

    fn plan(confidence: f64, claims: usize) -> PlanOutput {
        PlanOutput::new(
            IncidentId::new("INC-1"),
            "1. Restart pods 2. Verify latency",
            "rationale",
            (0..claims).map(|i| Claim::new(format!("claim {i}"))).collect(),
            confidence,
        )
        .unwrap()
    }

    fn claim(idx: usize, supporting: usize, contradicting: usize) -> ClaimResult {
        ClaimResult {
            claim_index: idx,
            claim: Claim::new(format!("claim {idx}")),
            status: ClaimStatus::classify(supporting, contradicting),
            supporting_doc_count: supporting,
            contradicting_doc_count: contradicting,
            fabricated_authority: false,
            lookup_failed: false,
        }
    }

    fn stress(results: Vec<ClaimResult>, confidence: f64) -> StressOutput {
        StressOutput {
            incident_id: IncidentId::new("INC-1"),
            evidence_coverage: crate::types::evidence_coverage(&results),
            claim_results: results,
            policy_conflicts: vec![],
            fabricated_authority_rejected: false,
            confidence_post_stress: confidence,
            documents_retrieved: 0,
        }
    }

    #[test]
    fn high_severity_two_contradictions_blocks() {
        let p = plan(90.0, 3);
        let s = stress(vec![claim(0, 2, 1), claim(1, 0, 1), claim(2, 1, 0)], 54.0);
        let out = SafetyGate::default().evaluate(&p, &s, Severity::High).unwrap();
        assert_eq!(out.decision, Decision::BlockAndEscalate);
        assert_eq!(out.reasons, vec![ReasonCode::ExcessContradiction]);
        assert!(out.confidence_delta < 0.0);
        assert!(!out.requires_override);
    }

    #[test]
    fn medium_severity_clean_plan_executes() {
        let p = plan(70.0, 5);
        let s = stress(
            vec![claim(0, 1, 0), claim(1, 2, 0), claim(2, 1, 0), claim(3, 0, 0), claim(4, 0, 0)],
            70.0,
        );
        assert!((s.evidence_coverage - 0.6).abs() < 1e-12);
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Medium).unwrap();
        assert_eq!(out.decision, Decision::Execute);
        assert_eq!(out.reasons, vec![ReasonCode::ChecksPassed]);
        assert_eq!(out.confidence_delta, 0.0);
    }

    #[test]
    fn zero_support_low_coverage_is_insufficient() {
        let p = plan(60.0, 3);
        let s = stress(vec![claim(0, 0, 0), claim(1, 0, 0), claim(2, 0, 0)], 60.0);
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Low).unwrap();
        assert_eq!(out.reasons, vec![ReasonCode::InsufficientEvidence]);
    }

    #[test]
    fn one_third_coverage_with_zero_support_docs_is_insufficient() {
        let p = plan(60.0, 3);
        let mut s = stress(vec![claim(0, 1, 0), claim(1, 0, 0), claim(2, 0, 0)], 60.0);
        assert!((s.evidence_coverage - 1.0 / 3.0).abs() < 1e-12);
        // coverage 0.333 passes rule 3 while any supporting document exists
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Low).unwrap();
        assert_eq!(out.decision, Decision::Execute);

        s.claim_results[0].supporting_doc_count = 0;
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Low).unwrap();
        assert_eq!(out.reasons, vec![ReasonCode::InsufficientEvidence]);
    }

    #[test]
    fn policy_dominates_everything() {
        let p = plan(100.0, 1);
        let mut s = stress(vec![claim(0, 10, 0)], 100.0);
        s.policy_conflicts.push(PolicyConflict::new("no-restart-peak", "freeze"));
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Critical).unwrap();
        assert_eq!(out.reasons, vec![ReasonCode::PolicyConflict]);
        // critical still needs an override even when another rule blocked first
        assert!(out.requires_override);
    }

    #[test]
    fn critical_requires_override_when_clean() {
        let p = plan(95.0, 1);
        let s = stress(vec![claim(0, 3, 0)], 95.0);
        let out = SafetyGate::default().evaluate(&p, &s, Severity::Critical).unwrap();
        assert_eq!(out.decision, Decision::BlockAndEscalate);
        assert_eq!(out.reasons, vec![ReasonCode::CriticalRequiresOverride]);
        assert!(out.requires_override);
    }

    #[test]
    fn single_contradiction_partially_executes() {
        let p = plan(80.0, 2);
        let mut s = stress(vec![claim(0, 2, 0), claim(1, 1, 1)], 62.0);
        s.fabricated_authority_rejected = true;
        let out = SafetyGate::default().evaluate(&p, &s, Severity::High).unwrap();
        assert_eq!(out.decision, Decision::PartialExecute);
        assert_eq!(
            out.reasons,
            vec![ReasonCode::SingleContradiction, ReasonCode::FabricatedAuthority]
        );
    }

    #[test]
    fn advisory_switch_off_executes() {
        let gate = SafetyGate::new(GateConfig {
            partial_execute_on_advisory: false,
            ..GateConfig::default()
        });
        let p = plan(80.0, 2);
        let s = stress(vec![claim(0, 2, 0), claim(1, 1, 1)], 62.0);
        assert_eq!(gate.evaluate(&p, &s, Severity::High).unwrap().decision, Decision::Execute);
    }

    #[test]
    fn mismatched_incident_is_violation() {
        let p = plan(80.0, 1);
        let mut s = stress(vec![claim(0, 1, 0)], 80.0);
        s.incident_id = IncidentId::new("INC-2");
        assert!(SafetyGate::default().evaluate(&p, &s, Severity::Low).is_err());
    }

    #[test]
    fn nan_confidence_is_violation() {
        let p = plan(80.0, 1);
        let s = stress(vec![claim(0, 1, 0)], f64::NAN);
        assert!(SafetyGate::default().evaluate(&p, &s, Severity::Low).is_err());
    }
}
