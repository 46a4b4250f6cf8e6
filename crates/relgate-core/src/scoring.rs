//! Scoring functions
//!
//! Pure, side-effect free. Non-finite signals are read as the worst case.

use crate::config::ScoringConfig;
use crate::types::{ClaimResult, PlanOutput, StressOutput};
use serde::{Deserialize, Serialize};

/// Confidence drop that counts as planner/verifier disagreement
pub const DISAGREEMENT_DROP: f64 = 1.0;
/// Confidence drop that counts as the plan having adapted
pub const ADAPTATION_DROP: f64 = 2.0;
/// Rigidity charged when the action survives verification unchanged
const UNCHANGED_RIGIDITY: f64 = 0.7;
/// Error rate charged to a plan that passed boundary validation
const VALIDATED_PLAN_ERROR: f64 = 0.2;

/// Adjust plan confidence for fabrication risk
///
/// A fabrication signal above the risk threshold forces a fixed drop,
/// independent of the initial value. Result is clamped to `[0, 100]`.
#[must_use]
pub fn adjust_confidence(initial: f64, fabrication_signal: f64, params: &ScoringConfig) -> f64 {
    let initial = if initial.is_finite() { initial } else { 0.0 };
    let risky =
        !fabrication_signal.is_finite() || fabrication_signal > params.fabrication_risk_threshold;
    let adjusted = if risky {
        initial - params.fabrication_penalty
    } else {
        initial
    };
    clamp_confidence(adjusted)
}

/// Penalty for contradicted claims
///
/// Grows linearly with the count; divergence in `[0, 1]` scales it by up to 2x.
#[must_use]
pub fn contradiction_penalty(
    contradiction_count: usize,
    divergence_signal: f64,
    params: &ScoringConfig,
) -> f64 {
    let divergence = if divergence_signal.is_finite() {
        divergence_signal.clamp(0.0, 1.0)
    } else {
        1.0
    };
    #[allow(clippy::cast_precision_loss)]
    let count = contradiction_count as f64;
    (params.per_contradiction_penalty * count * (1.0 + divergence)).max(0.0)
}

/// Context-discipline magnitude in `[0, 1]`
///
/// `1 - exp(-volume / scale)`; unknown volume counts as unbounded.
#[must_use]
pub fn context_magnitude(evidence_volume: f64, params: &ScoringConfig) -> f64 {
    let volume = if evidence_volume.is_nan() {
        f64::INFINITY
    } else {
        evidence_volume.max(0.0)
    };
    1.0 - (-volume / params.context_volume_scale).exp()
}

/// Post-stress confidence
#[must_use]
pub fn post_stress_confidence(
    initial: f64,
    fabrication_signal: f64,
    contradiction_count: usize,
    divergence_signal: f64,
    params: &ScoringConfig,
) -> f64 {
    let adjusted = adjust_confidence(initial, fabrication_signal, params);
    clamp_confidence(adjusted - contradiction_penalty(contradiction_count, divergence_signal, params))
}

/// Share of claims that retrieval found anything for, either way
#[must_use]
pub fn integration_quality(results: &[ClaimResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let integrated = results
        .iter()
        .filter(|r| r.supporting_doc_count > 0 || r.contradicting_doc_count > 0)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let quality = integrated as f64 / results.len() as f64;
    quality
}

/// How the plan held up against verification
///
/// Recorded for audit and trend analysis; the gate never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Adaptability {
    /// The verifier moved off the planner's action or cut confidence by at least one point
    pub disagreement_detected: bool,
    /// `act * integration * (1 - rigidity) * (1 - error)`, in `[0, 1]`
    pub adaptability_score: f64,
}

/// Score planner/verifier disagreement and plan adaptability
///
/// `revised_position` is the action the reasoner restated after
/// verification, if any.
#[must_use]
pub fn assess_adaptability(
    plan: &PlanOutput,
    stress: &StressOutput,
    revised_position: Option<&str>,
) -> Adaptability {
    let drop = plan.confidence_initial() - stress.confidence_post_stress;
    let position_changed =
        revised_position.is_some_and(|p| p.trim() != plan.proposed_action().trim());

    let act = if position_changed || drop >= ADAPTATION_DROP {
        1.0
    } else {
        0.0
    };
    let rigidity = if position_changed { 0.0 } else { UNCHANGED_RIGIDITY };
    let score = act
        * integration_quality(&stress.claim_results)
        * (1.0 - rigidity)
        * (1.0 - VALIDATED_PLAN_ERROR);

    Adaptability {
        disagreement_detected: position_changed || drop >= DISAGREEMENT_DROP,
        adaptability_score: score,
    }
}

#[inline]
fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Claim, ClaimStatus, IncidentId};

    fn params() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn low_fabrication_keeps_confidence() {
        assert_eq!(adjust_confidence(80.0, 0.1, &params()), 80.0);
    }

    #[test]
    fn high_fabrication_forces_fixed_drop() {
        assert_eq!(adjust_confidence(95.0, 0.9, &params()), 70.0);
        assert_eq!(adjust_confidence(40.0, 0.6, &params()), 15.0);
        assert_eq!(adjust_confidence(10.0, 0.9, &params()), 0.0);
    }

    #[test]
    fn nan_fabrication_is_risky() {
        assert_eq!(adjust_confidence(80.0, f64::NAN, &params()), 55.0);
    }

    #[test]
    fn penalty_monotonic_in_count() {
        let p = params();
        let mut last = -1.0;
        for count in 0..6 {
            let penalty = contradiction_penalty(count, 0.3, &p);
            assert!(penalty > last);
            last = penalty;
        }
        assert_eq!(contradiction_penalty(0, 1.0, &p), 0.0);
    }

    #[test]
    fn divergence_scales_penalty() {
        let p = params();
        assert_eq!(contradiction_penalty(2, 0.0, &p), 18.0);
        assert_eq!(contradiction_penalty(2, 1.0, &p), 36.0);
        assert_eq!(contradiction_penalty(2, 7.0, &p), 36.0);
        assert_eq!(contradiction_penalty(2, -3.0, &p), 18.0);
    }

    #[test]
    fn magnitude_is_monotonic_and_bounded() {
        let p = params();
        assert_eq!(context_magnitude(0.0, &p), 0.0);
        assert!(context_magnitude(5.0, &p) < context_magnitude(6.0, &p));
        assert_eq!(context_magnitude(f64::INFINITY, &p), 1.0);
        assert_eq!(context_magnitude(f64::NAN, &p), 1.0);
    }

    fn stressed(confidence_post_stress: f64, counts: &[(usize, usize)]) -> (PlanOutput, StressOutput) {
        let id = IncidentId::new("INC-1");
        let claims: Vec<Claim> = (0..counts.len()).map(|i| Claim::new(format!("claim {i}"))).collect();
        let plan = PlanOutput::new(id.clone(), "restart pods", "", claims.clone(), 80.0).unwrap();
        let claim_results = counts
            .iter()
            .zip(claims)
            .enumerate()
            .map(|(claim_index, (&(supporting, contradicting), claim))| ClaimResult {
                claim_index,
                claim,
                status: ClaimStatus::classify(supporting, contradicting),
                supporting_doc_count: supporting,
                contradicting_doc_count: contradicting,
                fabricated_authority: false,
                lookup_failed: false,
            })
            .collect();
        let stress = StressOutput {
            incident_id: id,
            claim_results,
            policy_conflicts: Vec::new(),
            fabricated_authority_rejected: false,
            confidence_post_stress,
            evidence_coverage: 0.0,
            documents_retrieved: 0,
        };
        (plan, stress)
    }

    #[test]
    fn integration_counts_either_stance() {
        let (_, stress) = stressed(80.0, &[(2, 0), (0, 1), (0, 0), (0, 0)]);
        assert_eq!(integration_quality(&stress.claim_results), 0.5);
        assert_eq!(integration_quality(&[]), 0.0);
    }

    #[test]
    fn unchanged_plan_is_not_adaptive() {
        let (plan, stress) = stressed(80.0, &[(1, 0), (1, 0)]);
        assert_eq!(
            assess_adaptability(&plan, &stress, None),
            Adaptability {
                disagreement_detected: false,
                adaptability_score: 0.0,
            }
        );
        // restating the same action is not a change
        let same = assess_adaptability(&plan, &stress, Some(" restart pods "));
        assert!(!same.disagreement_detected);
    }

    #[test]
    fn small_drop_is_disagreement_without_adaptation() {
        let (plan, stress) = stressed(78.5, &[(1, 0)]);
        let assessed = assess_adaptability(&plan, &stress, None);
        assert!(assessed.disagreement_detected);
        assert_eq!(assessed.adaptability_score, 0.0);
    }

    #[test]
    fn confidence_drop_scores_against_rigidity() {
        let (plan, stress) = stressed(62.0, &[(1, 0), (0, 2)]);
        let assessed = assess_adaptability(&plan, &stress, None);
        assert!(assessed.disagreement_detected);
        // 1 * 1.0 * 0.3 * 0.8
        assert!((assessed.adaptability_score - 0.24).abs() < 1e-12);
    }

    #[test]
    fn revised_position_scores_highest() {
        let (plan, stress) = stressed(80.0, &[(1, 0), (0, 0)]);
        let assessed = assess_adaptability(&plan, &stress, Some("pause and page the DBA"));
        assert!(assessed.disagreement_detected);
        // 1 * 0.5 * 1.0 * 0.8
        assert!((assessed.adaptability_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn post_stress_clamps_at_zero() {
        assert_eq!(post_stress_confidence(20.0, 0.9, 3, 1.0, &params()), 0.0);
    }
}
