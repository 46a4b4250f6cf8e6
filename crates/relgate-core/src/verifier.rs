//! Claim verifier (Stress stage)
//!
//! Fans out one evidence lookup per claim alongside a single policy check,
//! then fans back in preserving claim order. Collaborator failures never
//! abort the pass; they are downgraded toward blocking:
//! - evidence failure: claim is `unsupported` unless a contradiction was
//!   already seen, which stays
//! - authority lookup failure: citation counts as fabricated
//! - policy failure: synthetic `policy_check_unavailable` conflict

use crate::collaborators::{EvidenceRetriever, PolicyChecker, ReliabilitySignals, Stance};
use crate::config::{ScoringConfig, StressConfig};
use crate::error::CollaboratorError;
use crate::records::ToolCall;
use crate::schema::VerificationHints;
use crate::scoring::post_stress_confidence;
use crate::types::{
    evidence_coverage, Claim, ClaimResult, ClaimStatus, Incident, PlanOutput, PolicyConflict,
    StressOutput,
};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Policy ID used when the policy collaborator cannot answer
pub const POLICY_UNAVAILABLE: &str = "policy_check_unavailable";

/// Stress output plus the collaborator calls made to produce it
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Aggregated verification result
    pub output: StressOutput,
    /// Every collaborator call, claims first in order, policy last
    pub calls: Vec<ToolCall>,
}

struct ClaimLookup {
    result: ClaimResult,
    doc_ids: Vec<String>,
    calls: Vec<ToolCall>,
}

/// Verifies plan claims against evidence and policy
#[derive(Clone)]
pub struct ClaimVerifier {
    evidence: Arc<dyn EvidenceRetriever>,
    policy: Arc<dyn PolicyChecker>,
    stress: StressConfig,
    scoring: ScoringConfig,
}

impl ClaimVerifier {
    /// Create new verifier
    #[must_use]
    pub fn new(
        evidence: Arc<dyn EvidenceRetriever>,
        policy: Arc<dyn PolicyChecker>,
        stress: StressConfig,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            evidence,
            policy,
            stress,
            scoring,
        }
    }

    /// Run the Stress pass
    pub async fn verify(
        &self,
        incident: &Incident,
        plan: &PlanOutput,
        hints: &VerificationHints,
        signals: &ReliabilitySignals,
    ) -> StressReport {
        let lookups = join_all(
            plan.claims()
                .iter()
                .enumerate()
                .map(|(idx, claim)| self.verify_claim(idx, claim, incident.service(), hints)),
        );
        let (lookups, (policy_conflicts, policy_call)) =
            tokio::join!(lookups, self.check_policy(incident, plan));

        let mut calls = Vec::new();
        let mut claim_results = Vec::with_capacity(lookups.len());
        let mut documents = BTreeSet::new();
        for lookup in lookups {
            calls.extend(lookup.calls);
            documents.extend(lookup.doc_ids);
            claim_results.push(lookup.result);
        }
        calls.push(policy_call);

        let contradicted = claim_results
            .iter()
            .filter(|r| r.status == ClaimStatus::Contradicted)
            .count();
        let fabricated_authority_rejected = claim_results.iter().any(|r| r.fabricated_authority);
        let confidence_post_stress = post_stress_confidence(
            plan.confidence_initial(),
            signals.fabrication_signal,
            contradicted,
            signals.divergence_signal,
            &self.scoring,
        );
        let coverage = evidence_coverage(&claim_results);

        info!(
            incident_id = %incident.id(),
            claims = claim_results.len(),
            contradicted,
            coverage,
            policy_conflicts = policy_conflicts.len(),
            confidence_post_stress,
            "stress pass complete"
        );

        StressReport {
            output: StressOutput {
                incident_id: incident.id().clone(),
                claim_results,
                policy_conflicts,
                fabricated_authority_rejected,
                confidence_post_stress,
                evidence_coverage: coverage,
                documents_retrieved: documents.len(),
            },
            calls,
        }
    }

    async fn verify_claim(
        &self,
        claim_index: usize,
        claim: &Claim,
        service: &str,
        hints: &VerificationHints,
    ) -> ClaimLookup {
        let deadline = Instant::now() + self.stress.claim_timeout();
        let mut calls = Vec::new();

        let queries = std::iter::once(claim.text.as_str())
            .chain(hints.queries_for(claim_index).iter().map(String::as_str));
        let mut stances: HashMap<String, Stance> = HashMap::new();
        let mut order = Vec::new();
        let mut lookup_failed = false;
        for query in queries {
            match self.search(query, service, deadline).await {
                Ok(hits) => {
                    calls.push(ToolCall::ok(
                        "evidence",
                        "search",
                        format!("claim {claim_index}: {} hits", hits.len()),
                    ));
                    for hit in hits {
                        if !stances.contains_key(&hit.doc_id) {
                            order.push(hit.doc_id.clone());
                            stances.insert(hit.doc_id, hit.stance);
                        }
                    }
                }
                Err(e) => {
                    warn!(claim_index, error = %e, "evidence lookup failed, claim downgraded to unsupported");
                    calls.push(ToolCall::failed("evidence", "search", &e));
                    lookup_failed = true;
                    break;
                }
            }
        }

        let (supporting, contradicting) =
            stances.values().fold((0, 0), |(s, c), stance| match stance {
                Stance::Supports => (s + 1, c),
                Stance::Contradicts => (s, c + 1),
                Stance::Neutral => (s, c),
            });
        // A failed lookup voids the support seen so far, never a contradiction
        let supporting = if lookup_failed { 0 } else { supporting };

        let fabricated_authority = match &claim.cited_authority {
            None => false,
            Some(authority) => {
                match self.resolve_authority(authority, deadline).await {
                    Ok(true) => {
                        calls.push(ToolCall::ok("evidence", "resolve_authority", authority.clone()));
                        false
                    }
                    Ok(false) => {
                        calls.push(ToolCall::ok(
                            "evidence",
                            "resolve_authority",
                            format!("{authority}: not found"),
                        ));
                        warn!(claim_index, authority = %authority, "cited authority does not exist");
                        true
                    }
                    Err(e) => {
                        warn!(claim_index, error = %e, "authority lookup failed, citation treated as unresolved");
                        calls.push(ToolCall::failed("evidence", "resolve_authority", &e));
                        true
                    }
                }
            }
        };

        let status = ClaimStatus::classify(supporting, contradicting);
        debug!(claim_index, ?status, supporting, contradicting, "claim classified");

        ClaimLookup {
            result: ClaimResult {
                claim_index,
                claim: claim.clone(),
                status,
                supporting_doc_count: supporting,
                contradicting_doc_count: contradicting,
                fabricated_authority,
                lookup_failed,
            },
            doc_ids: if lookup_failed {
                order
                    .into_iter()
                    .filter(|id| stances.get(id) == Some(&Stance::Contradicts))
                    .collect()
            } else {
                order
            },
            calls,
        }
    }

    async fn search(
        &self,
        query: &str,
        service: &str,
        deadline: Instant,
    ) -> Result<Vec<crate::collaborators::EvidenceHit>, CollaboratorError> {
        timeout_at(
            deadline,
            self.evidence.search(query, service, self.stress.evidence_top_k),
        )
        .await
        .map_err(|_| CollaboratorError::timeout("evidence", self.stress.claim_timeout()))?
    }

    async fn resolve_authority(
        &self,
        authority: &str,
        deadline: Instant,
    ) -> Result<bool, CollaboratorError> {
        timeout_at(deadline, self.evidence.resolve_authority(authority))
            .await
            .map_err(|_| CollaboratorError::timeout("evidence", self.stress.claim_timeout()))?
    }

    async fn check_policy(
        &self,
        incident: &Incident,
        plan: &PlanOutput,
    ) -> (Vec<PolicyConflict>, ToolCall) {
        let outcome = tokio::time::timeout(
            self.stress.policy_timeout(),
            self.policy.check_conflicts(
                incident.service(),
                plan.proposed_action(),
                incident.severity(),
            ),
        )
        .await
        .map_err(|_| CollaboratorError::timeout("policy", self.stress.policy_timeout()))
        .and_then(|r| r);

        match outcome {
            Ok(conflicts) => {
                let call = ToolCall::ok(
                    "policy",
                    "check_conflicts",
                    format!("{} conflicts", conflicts.len()),
                );
                (conflicts, call)
            }
            Err(e) => {
                warn!(incident_id = %incident.id(), error = %e, "policy check failed, treating as conflict");
                let conflict = PolicyConflict::new(
                    POLICY_UNAVAILABLE,
                    format!("policy check could not be completed: {e}"),
                );
                (vec![conflict], ToolCall::failed("policy", "check_conflicts", &e))
            }
        }
    }
}

impl std::fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimVerifier")
            .field("stress", &self.stress)
            .finish_non_exhaustive()
    }
}
