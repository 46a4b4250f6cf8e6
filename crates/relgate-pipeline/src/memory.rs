//! In-memory collaborators
//!
//! Keyword-overlap retrieval, a static policy table, fixed metrics, and
//! scripted reasoner/notifier/trigger implementations. They back the CLI
//! scenario runner and the integration tests.

use dashmap::DashMap;
use parking_lot::Mutex;
use relgate_core::{
    ActionPayload, ActionResult, ActionTrigger, ApprovalSignal, ApprovalSummary,
    CollaboratorError, CollaboratorResult, EvidenceHit, EvidenceRetriever, Incident, IncidentId,
    NotificationChannel, PlanOutput, PlanReasoner, PolicyChecker, PolicyConflict,
    ReliabilityMetricsProvider, ReliabilitySignals, RunbookCandidate, RunbookIndexer, Severity,
    Stance,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

/// A document in the in-memory index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    /// Document ID
    pub doc_id: String,
    /// Service the document applies to; `*` for all
    #[serde(default = "any_service")]
    pub service: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Body
    pub text: String,
    /// Source the document came from
    #[serde(default)]
    pub authority: String,
    /// Relation to the claims it matches
    #[serde(default)]
    pub stance: Stance,
}

fn any_service() -> String {
    "*".to_string()
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Keyword-overlap evidence index, shared read-mostly across runs
#[derive(Debug, Default)]
pub struct InMemoryEvidenceIndex {
    docs: DashMap<String, EvidenceDocument>,
    learned: std::sync::atomic::AtomicU64,
}

impl InMemoryEvidenceIndex {
    /// Create empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from documents
    #[must_use]
    pub fn with_documents(docs: impl IntoIterator<Item = EvidenceDocument>) -> Self {
        let index = Self::new();
        for doc in docs {
            index.insert(doc);
        }
        index
    }

    /// Insert or replace a document
    pub fn insert(&self, doc: EvidenceDocument) {
        self.docs.insert(doc.doc_id.clone(), doc);
    }

    /// Fetch a document
    #[must_use]
    pub fn get(&self, doc_id: &str) -> Option<EvidenceDocument> {
        self.docs.get(doc_id).map(|d| d.value().clone())
    }

    /// Number of documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait::async_trait]
impl EvidenceRetriever for InMemoryEvidenceIndex {
    async fn search(
        &self,
        query: &str,
        service: &str,
        top_k: usize,
    ) -> CollaboratorResult<Vec<EvidenceHit>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        #[allow(clippy::cast_precision_loss)]
        let query_len = query_tokens.len() as f64;

        let mut hits: Vec<EvidenceHit> = self
            .docs
            .iter()
            .filter(|d| d.service == "*" || d.service == service)
            .filter_map(|d| {
                let tokens = tokenize(&format!("{} {} {}", d.title, d.text, d.authority));
                let overlap = query_tokens.intersection(&tokens).count();
                if overlap == 0 {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                let score = overlap as f64 / query_len;
                Some(EvidenceHit {
                    doc_id: d.doc_id.clone(),
                    text: d.text.clone(),
                    score,
                    authority: d.authority.clone(),
                    stance: d.stance,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn resolve_authority(&self, authority: &str) -> CollaboratorResult<bool> {
        let wanted = authority.trim().to_lowercase();
        Ok(self.docs.iter().any(|d| {
            d.doc_id.to_lowercase() == wanted || d.authority.to_lowercase() == wanted
        }))
    }
}

#[async_trait::async_trait]
impl RunbookIndexer for InMemoryEvidenceIndex {
    async fn index_runbook(&self, candidate: &RunbookCandidate) -> CollaboratorResult<String> {
        let n = self
            .learned
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let doc_id = format!("learned-{n}");
        self.insert(EvidenceDocument {
            doc_id: doc_id.clone(),
            service: candidate.service.clone(),
            title: candidate.title.clone(),
            text: format!("{}\n{}", candidate.recommended_action, candidate.body),
            authority: candidate.source.clone(),
            stance: Stance::Supports,
        });
        Ok(doc_id)
    }
}

/// One policy rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Policy ID
    pub policy_id: String,
    /// Service the rule applies to; `*` for all
    #[serde(default = "any_service")]
    pub service: String,
    /// Action phrases the rule forbids (case-insensitive substring match)
    pub blocked_actions: Vec<String>,
    /// Severities the rule applies to; empty for all
    #[serde(default)]
    pub severities: Vec<Severity>,
    /// Description
    #[serde(default)]
    pub description: String,
}

impl PolicyRule {
    fn applies(&self, service: &str, action: &str, severity: Severity) -> bool {
        let action = action.to_lowercase();
        (self.service == "*" || self.service == service)
            && (self.severities.is_empty() || self.severities.contains(&severity))
            && self
                .blocked_actions
                .iter()
                .any(|blocked| !blocked.is_empty() && action.contains(&blocked.to_lowercase()))
    }
}

/// Static policy table
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyTable {
    rules: Vec<PolicyRule>,
}

impl InMemoryPolicyTable {
    /// Create from rules
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }
}

#[async_trait::async_trait]
impl PolicyChecker for InMemoryPolicyTable {
    async fn check_conflicts(
        &self,
        service: &str,
        action: &str,
        severity: Severity,
    ) -> CollaboratorResult<Vec<PolicyConflict>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.applies(service, action, severity))
            .map(|r| PolicyConflict::new(r.policy_id.clone(), r.description.clone()))
            .collect())
    }
}

/// Metrics provider with fixed signals
#[derive(Debug, Clone)]
pub struct StaticMetricsProvider {
    name: String,
    signals: ReliabilitySignals,
}

impl StaticMetricsProvider {
    /// Create new provider
    #[must_use]
    pub fn new(name: impl Into<String>, fabrication: f64, divergence: f64, evidence_volume: f64) -> Self {
        let name = name.into();
        Self {
            signals: ReliabilitySignals {
                fabrication_signal: fabrication,
                divergence_signal: divergence,
                evidence_volume,
                source: name.clone(),
            },
            name,
        }
    }
}

#[async_trait::async_trait]
impl ReliabilityMetricsProvider for StaticMetricsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn signals(&self, _model_id: &str) -> CollaboratorResult<ReliabilitySignals> {
        Ok(self.signals.clone())
    }
}

/// Reasoner replaying pre-recorded replies per incident
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    plans: HashMap<IncidentId, serde_json::Value>,
    hints: HashMap<IncidentId, serde_json::Value>,
}

impl ScriptedReasoner {
    /// Create empty reasoner
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With raw plan reply for an incident
    #[must_use]
    pub fn with_plan(mut self, incident_id: impl Into<IncidentId>, plan: serde_json::Value) -> Self {
        self.plans.insert(incident_id.into(), plan);
        self
    }

    /// With raw verification hints for an incident
    #[must_use]
    pub fn with_hints(mut self, incident_id: impl Into<IncidentId>, hints: serde_json::Value) -> Self {
        self.hints.insert(incident_id.into(), hints);
        self
    }
}

#[async_trait::async_trait]
impl PlanReasoner for ScriptedReasoner {
    async fn propose(&self, incident: &Incident) -> CollaboratorResult<serde_json::Value> {
        self.plans.get(incident.id()).cloned().ok_or_else(|| {
            CollaboratorError::unavailable("reasoner", format!("no plan scripted for {}", incident.id()))
        })
    }

    async fn verify(
        &self,
        _plan: &PlanOutput,
        incident: &Incident,
    ) -> CollaboratorResult<serde_json::Value> {
        Ok(self
            .hints
            .get(incident.id())
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Notifier replaying a fixed sequence of poll replies
///
/// Each poll pops one reply; `None` entries simulate a quiet poll window.
/// Once the script is exhausted polls wait out their budget and return nothing.
#[derive(Debug, Default)]
pub struct ScriptedNotifier {
    replies: Mutex<VecDeque<Option<ApprovalSignal>>>,
    posted: Mutex<Vec<ApprovalSummary>>,
}

impl ScriptedNotifier {
    /// Create with poll replies in order
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = Option<ApprovalSignal>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            posted: Mutex::new(Vec::new()),
        }
    }

    /// Approval requests posted so far
    #[must_use]
    pub fn posted(&self) -> Vec<ApprovalSummary> {
        self.posted.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for ScriptedNotifier {
    async fn post_approval_request(&self, summary: &ApprovalSummary) -> CollaboratorResult<String> {
        let mut posted = self.posted.lock();
        posted.push(summary.clone());
        Ok(format!("req-{}-{}", summary.incident_id, posted.len()))
    }

    async fn poll_for_signal(
        &self,
        _request_id: &str,
        budget: Duration,
    ) -> CollaboratorResult<Option<ApprovalSignal>> {
        let next = self.replies.lock().pop_front();
        match next {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(budget).await;
                Ok(None)
            }
        }
    }
}

/// Trigger that logs payloads and reports success
///
/// Actions containing any of the configured failure phrases report failure.
#[derive(Debug, Default)]
pub struct LoggingActionTrigger {
    failing: Vec<String>,
    executed: Mutex<Vec<ActionPayload>>,
}

impl LoggingActionTrigger {
    /// Create trigger that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With an action phrase that makes the trigger report failure
    #[must_use]
    pub fn failing_on(mut self, phrase: impl Into<String>) -> Self {
        self.failing.push(phrase.into().to_lowercase());
        self
    }

    /// Payloads received so far
    #[must_use]
    pub fn executed(&self) -> Vec<ActionPayload> {
        self.executed.lock().clone()
    }
}

#[async_trait::async_trait]
impl ActionTrigger for LoggingActionTrigger {
    async fn execute(&self, payload: &ActionPayload) -> CollaboratorResult<ActionResult> {
        self.executed.lock().push(payload.clone());
        let action = payload.action.to_lowercase();
        let success = !self.failing.iter().any(|p| action.contains(p));
        tracing::info!(
            incident_id = %payload.incident_id,
            mode = payload.mode.as_str(),
            steps = ?payload.steps,
            success,
            "action trigger invoked"
        );
        Ok(ActionResult {
            success,
            details: if success {
                format!("executed {} step(s) in {} mode", payload.steps.len(), payload.mode.as_str())
            } else {
                "action reported failure".to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str, stance: Stance) -> EvidenceDocument {
        EvidenceDocument {
            doc_id: id.to_string(),
            service: "checkout".to_string(),
            title: String::new(),
            text: text.to_string(),
            authority: "runbooks".to_string(),
            stance,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_overlap_and_filters_service() {
        let index = InMemoryEvidenceIndex::with_documents([
            doc("a", "redis connection pool exhausted", Stance::Supports),
            doc("b", "redis memory pressure", Stance::Neutral),
            EvidenceDocument {
                service: "billing".to_string(),
                ..doc("c", "redis connection pool exhausted", Stance::Supports)
            },
        ]);
        let hits = index
            .search("Redis connection pool exhausted", "checkout", 5)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].score, 0.25);
    }

    #[tokio::test]
    async fn learned_runbook_becomes_searchable() {
        let index = InMemoryEvidenceIndex::new();
        let id = index
            .index_runbook(&RunbookCandidate {
                title: "Resolved: checkout 502s".to_string(),
                service: "checkout".to_string(),
                recommended_action: "recycle ingress pods".to_string(),
                body: String::new(),
                source: "agent_learning".to_string(),
                final_confidence: 70.0,
                outcome: "ok".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(id, "learned-1");
        let hits = index.search("recycle ingress", "checkout", 3).await.unwrap();
        assert_eq!(hits[0].doc_id, "learned-1");
        assert_eq!(hits[0].stance, Stance::Supports);
        assert!(index.resolve_authority("agent_learning").await.unwrap());
    }

    #[tokio::test]
    async fn policy_matches_service_action_and_severity() {
        let table = InMemoryPolicyTable::new(vec![PolicyRule {
            policy_id: "no-db-failover-high".to_string(),
            service: "*".to_string(),
            blocked_actions: vec!["failover database".to_string()],
            severities: vec![Severity::High, Severity::Critical],
            description: "manual failover only".to_string(),
        }]);
        let hit = table
            .check_conflicts("orders", "1. Failover database to replica", Severity::High)
            .await
            .unwrap();
        assert_eq!(hit.len(), 1);
        assert!(table
            .check_conflicts("orders", "Failover database", Severity::Low)
            .await
            .unwrap()
            .is_empty());
    }
}
