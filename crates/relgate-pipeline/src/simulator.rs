//! Gate simulator
//!
//! Generates seeded random plan/stress/severity triples, evaluates the gate
//! twice per case and checks the decision properties that must hold for
//! every input:
//! - Determinism: identical inputs give identical outputs
//! - Policy dominance: any policy conflict blocks
//! - Critical override: critical incidents always block and require override
//! - Contradiction dominance: enough contradicted claims block
//! - Reason consistency: blocking reasons appear exactly on blocked decisions

use rand::{rngs::StdRng, Rng, SeedableRng};
use relgate_core::scoring::post_stress_confidence;
use relgate_core::types::evidence_coverage;
use relgate_core::{
    Claim, ClaimResult, ClaimStatus, Decision, GateConfig, GateOutput,
    IncidentId, PlanOutput, PolicyConflict, ReasonCode, SafetyGate, ScoringConfig, Severity,
    StressOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Simulator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Cases to generate
    pub cases: u64,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cases: 1000,
            stop_on_first_violation: false,
        }
    }
}

/// A property that did not hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Two evaluations of the same input disagreed
    NonDeterministic {
        /// Case number
        case: u64,
    },
    /// Policy conflict present but the decision did not block
    PolicyNotBlocked {
        /// Case number
        case: u64,
        /// Decision produced
        decision: Decision,
    },
    /// Critical incident not blocked behind an override
    CriticalNotOverridden {
        /// Case number
        case: u64,
        /// Decision produced
        decision: Decision,
    },
    /// Contradicted claims reached the block count but the decision did not block
    ContradictionsNotBlocked {
        /// Case number
        case: u64,
        /// Contradicted claims
        contradicted: usize,
    },
    /// Blocking reasons and the decision disagree
    ReasonMismatch {
        /// Case number
        case: u64,
        /// Decision produced
        decision: Decision,
        /// Reasons produced
        reasons: Vec<ReasonCode>,
    },
    /// The gate rejected its own output
    GateError {
        /// Case number
        case: u64,
        /// Violation message
        message: String,
    },
}

/// Counters over the generated cases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    /// Cases evaluated
    pub cases: u64,
    /// Decisions per kind
    pub decisions: BTreeMap<String, u64>,
    /// Reason occurrences
    pub reasons: BTreeMap<String, u64>,
    /// Cases with a policy conflict
    pub policy_cases: u64,
    /// Critical cases
    pub critical_cases: u64,
}

/// Final report from the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Violations found
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if every property held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Reliability Gate Simulator Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Cases: {}", self.stats.cases);
        let _ = writeln!(report, "Policy cases: {}", self.stats.policy_cases);
        let _ = writeln!(report, "Critical cases: {}", self.stats.critical_cases);
        for (decision, count) in &self.stats.decisions {
            let _ = writeln!(report, "Decision {decision}: {count}");
        }
        for (reason, count) in &self.stats.reasons {
            let _ = writeln!(report, "Reason {reason}: {count}");
        }
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {v:?}", i + 1);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// One generated input
#[derive(Debug, Clone)]
pub struct SimulatedCase {
    /// Plan
    pub plan: PlanOutput,
    /// Stress result
    pub stress: StressOutput,
    /// Incident severity
    pub severity: Severity,
}

const SEVERITIES: [Severity; 4] = [
    Severity::Low,
    Severity::Medium,
    Severity::High,
    Severity::Critical,
];

/// Generate one random case
///
/// Returns `None` only if the generated plan failed validation, which the
/// generator's ranges never produce.
pub fn generate_case(rng: &mut StdRng, case: u64, scoring: &ScoringConfig) -> Option<SimulatedCase> {
    let incident_id = IncidentId::new(format!("SIM-{case}"));
    let severity = SEVERITIES[rng.random_range(0..SEVERITIES.len())];
    let claim_count = rng.random_range(1..=5);

    let mut claims = Vec::with_capacity(claim_count);
    let mut claim_results = Vec::with_capacity(claim_count);
    for idx in 0..claim_count {
        let claim = if rng.random_bool(0.15) {
            Claim::new(format!("claim {idx}")).citing(format!("RFC-{idx}"))
        } else {
            Claim::new(format!("claim {idx}"))
        };
        let lookup_failed = rng.random_bool(0.05);
        let (supporting, contradicting) = if lookup_failed {
            (0, 0)
        } else {
            (rng.random_range(0..=3), if rng.random_bool(0.2) { rng.random_range(1..=2) } else { 0 })
        };
        claim_results.push(ClaimResult {
            claim_index: idx,
            claim: claim.clone(),
            status: ClaimStatus::classify(supporting, contradicting),
            supporting_doc_count: supporting,
            contradicting_doc_count: contradicting,
            fabricated_authority: claim.cited_authority.is_some() && rng.random_bool(0.5),
            lookup_failed,
        });
        claims.push(claim);
    }

    let policy_conflicts = if rng.random_bool(0.15) {
        vec![PolicyConflict::new("sim-policy", "simulated conflict")]
    } else {
        Vec::new()
    };

    let confidence_initial = f64::from(rng.random_range(0_u32..=100));
    let fabrication = rng.random_range(0.0..=1.0);
    let divergence = rng.random_range(0.0..=1.0);
    let contradicted = claim_results
        .iter()
        .filter(|r| r.status == ClaimStatus::Contradicted)
        .count();

    let plan = PlanOutput::new(
        incident_id.clone(),
        "1. restart service 2. verify health",
        "simulated",
        claims,
        confidence_initial,
    )
    .ok()?;

    let stress = StressOutput {
        incident_id,
        fabricated_authority_rejected: claim_results.iter().any(|r| r.fabricated_authority),
        confidence_post_stress: post_stress_confidence(
            confidence_initial,
            fabrication,
            contradicted,
            divergence,
            scoring,
        ),
        evidence_coverage: evidence_coverage(&claim_results),
        documents_retrieved: claim_results
            .iter()
            .map(|r| r.supporting_doc_count + r.contradicting_doc_count)
            .sum(),
        claim_results,
        policy_conflicts,
    };

    Some(SimulatedCase {
        plan,
        stress,
        severity,
    })
}

fn same_output(a: &GateOutput, b: &GateOutput) -> bool {
    a.decision == b.decision
        && a.reasons == b.reasons
        && a.requires_override == b.requires_override
        && a.confidence_delta.to_bits() == b.confidence_delta.to_bits()
}

/// Check one case against the decision properties
#[must_use]
pub fn check_case(gate: &SafetyGate, case_no: u64, case: &SimulatedCase) -> Vec<Violation> {
    let first = gate.evaluate(&case.plan, &case.stress, case.severity);
    let second = gate.evaluate(&case.plan, &case.stress, case.severity);
    let (first, second) = match (first, second) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            return vec![Violation::GateError {
                case: case_no,
                message: e.to_string(),
            }]
        }
    };

    let mut violations = Vec::new();
    if !same_output(&first, &second) {
        violations.push(Violation::NonDeterministic { case: case_no });
    }

    let blocked = first.decision.is_block();
    if !case.stress.policy_conflicts.is_empty() && !blocked {
        violations.push(Violation::PolicyNotBlocked {
            case: case_no,
            decision: first.decision,
        });
    }
    if case.severity.is_critical() && !(blocked && first.requires_override) {
        violations.push(Violation::CriticalNotOverridden {
            case: case_no,
            decision: first.decision,
        });
    }
    let contradicted = case.stress.contradicted_count();
    if contradicted >= gate.config().contradiction_block_count && !blocked {
        violations.push(Violation::ContradictionsNotBlocked {
            case: case_no,
            contradicted,
        });
    }
    let has_blocking = first.reasons.iter().any(|r| r.is_blocking());
    if has_blocking != blocked || first.reasons.is_empty() {
        violations.push(Violation::ReasonMismatch {
            case: case_no,
            decision: first.decision,
            reasons: first.reasons.clone(),
        });
    }
    violations
}

/// Run the gate simulator
#[must_use]
pub fn run_simulator(
    config: SimulatorConfig,
    gate_config: GateConfig,
    scoring: &ScoringConfig,
) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let gate = SafetyGate::new(gate_config);
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    for case_no in 0..config.cases {
        let Some(case) = generate_case(&mut rng, case_no, scoring) else {
            continue;
        };
        stats.cases += 1;
        if !case.stress.policy_conflicts.is_empty() {
            stats.policy_cases += 1;
        }
        if case.severity.is_critical() {
            stats.critical_cases += 1;
        }
        if let Ok(output) = gate.evaluate(&case.plan, &case.stress, case.severity) {
            *stats
                .decisions
                .entry(output.decision.as_str().to_string())
                .or_default() += 1;
            for reason in &output.reasons {
                *stats.reasons.entry(reason.as_str().to_string()).or_default() += 1;
            }
        }

        let found = check_case(&gate, case_no, &case);
        if !found.is_empty() {
            tracing::warn!(case = case_no, violations = found.len(), "gate property violated");
            violations.extend(found);
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    tracing::info!(
        seed = config.seed,
        cases = stats.cases,
        violations = violations.len(),
        "gate simulation finished"
    );
    SimulatorReport {
        config,
        stats,
        violations,
    }
}
