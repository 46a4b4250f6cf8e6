//! Scenario files
//!
//! A scenario is a JSON document describing the incidents to run and the
//! in-memory collaborators to run them against: evidence documents, policy
//! rules, metrics providers, scripted reasoner replies and approval replies.

use anyhow::Context;
use relgate_core::{ApprovalSignal, AuditSink, Incident, IncidentId, ReliabilityMetricsProvider};
use relgate_pipeline::{
    Collaborators, EvidenceDocument, InMemoryEvidenceIndex, InMemoryPolicyTable,
    LoggingActionTrigger, PolicyRule, ScriptedNotifier, ScriptedReasoner, StaticMetricsProvider,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MetricsSpec {
    pub(crate) name: String,
    pub(crate) fabrication: f64,
    pub(crate) divergence: f64,
    pub(crate) evidence_volume: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Scenario {
    pub(crate) incidents: Vec<Incident>,
    /// Raw reasoner plan replies keyed by incident ID
    pub(crate) plans: BTreeMap<IncidentId, serde_json::Value>,
    #[serde(default)]
    pub(crate) hints: BTreeMap<IncidentId, serde_json::Value>,
    #[serde(default)]
    pub(crate) evidence: Vec<EvidenceDocument>,
    #[serde(default)]
    pub(crate) policies: Vec<PolicyRule>,
    #[serde(default)]
    pub(crate) metrics: Vec<MetricsSpec>,
    /// Poll replies in order; `null` is a quiet poll window
    #[serde(default)]
    pub(crate) approvals: Vec<Option<ApprovalSignal>>,
    /// Action phrases the trigger reports as failed
    #[serde(default)]
    pub(crate) failing_actions: Vec<String>,
}

impl Scenario {
    pub(crate) fn from_json(text: &str) -> anyhow::Result<Self> {
        let scenario: Self = serde_json::from_str(text).context("invalid scenario JSON")?;
        if scenario.incidents.is_empty() {
            anyhow::bail!("scenario has no incidents");
        }
        Ok(scenario)
    }

    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Build the collaborators and hand back the incidents to run
    pub(crate) fn into_parts(self, audit: Arc<dyn AuditSink>) -> (Vec<Incident>, Collaborators) {
        let index = Arc::new(InMemoryEvidenceIndex::with_documents(self.evidence));

        let mut reasoner = ScriptedReasoner::new();
        for (id, plan) in self.plans {
            reasoner = reasoner.with_plan(id, plan);
        }
        for (id, hints) in self.hints {
            reasoner = reasoner.with_hints(id, hints);
        }

        let trigger = self
            .failing_actions
            .into_iter()
            .fold(LoggingActionTrigger::new(), LoggingActionTrigger::failing_on);

        let metrics = self
            .metrics
            .into_iter()
            .map(|m| {
                Arc::new(StaticMetricsProvider::new(
                    m.name,
                    m.fabrication,
                    m.divergence,
                    m.evidence_volume,
                )) as Arc<dyn ReliabilityMetricsProvider>
            })
            .collect();

        let collaborators = Collaborators {
            reasoner: Arc::new(reasoner),
            evidence: index.clone(),
            policy: Arc::new(InMemoryPolicyTable::new(self.policies)),
            metrics,
            notifier: Arc::new(ScriptedNotifier::new(self.approvals)),
            trigger: Arc::new(trigger),
            indexer: index,
            audit,
        };
        (self.incidents, collaborators)
    }
}
