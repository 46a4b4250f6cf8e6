//! Testing utilities for the Reliability Gate workspace
//!
//! Shared fixtures and misbehaving collaborators.

#![allow(missing_docs)]

use parking_lot::Mutex;
use relgate_core::{
    AttemptPhase, AuditReceipt, AuditRecord, AuditSink, Claim, CollaboratorError,
    CollaboratorResult, Incident, PersistenceFailure, PlanOutput, ReliabilityMetricsProvider,
    ReliabilitySignals, RunbookCandidate, RunbookIndexer, Severity,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE: &str = "checkout";

pub fn incident(id: &str, severity: Severity) -> Incident {
    Incident::new(id, SERVICE, severity, format!("{id}: elevated 5xx on {SERVICE}"))
        .with_symptoms("p99 latency above 2s; connection pool saturation")
}

/// Reasoner reply in the shape the plan boundary accepts
pub fn plan_json(action: &str, claims: &[&str], confidence: f64) -> Value {
    json!({
        "proposed_action": action,
        "rationale": "matches previous incidents",
        "key_claims": claims,
        "confidence_initial": confidence,
    })
}

pub fn plan(incident: &Incident, claims: &[&str], confidence: f64) -> PlanOutput {
    PlanOutput::new(
        incident.id().clone(),
        "1. Restart checkout pods 2. Verify error rate",
        "matches previous incidents",
        claims.iter().map(|c| Claim::new(*c)).collect(),
        confidence,
    )
    .unwrap()
}

type Matcher = Box<dyn Fn(&AuditRecord) -> bool + Send + Sync>;

/// Audit sink that refuses selected records and forwards the rest
pub struct FlakyAuditSink {
    inner: Arc<dyn AuditSink>,
    rules: Mutex<Vec<(Matcher, usize)>>,
    refused: Mutex<Vec<AuditRecord>>,
}

impl FlakyAuditSink {
    pub fn new(inner: Arc<dyn AuditSink>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            refused: Mutex::new(Vec::new()),
        }
    }

    /// Refuse the first `times` records matching `matcher`
    pub fn failing(
        self,
        matcher: impl Fn(&AuditRecord) -> bool + Send + Sync + 'static,
        times: usize,
    ) -> Self {
        self.rules.lock().push((Box::new(matcher), times));
        self
    }

    /// Refuse every pre-attempt execution record
    pub fn failing_attempts(self) -> Self {
        self.failing(
            |r| matches!(r, AuditRecord::ActionExecution(a) if a.phase == AttemptPhase::Attempted),
            usize::MAX,
        )
    }

    /// Refuse every post-attempt execution record
    pub fn failing_completions(self) -> Self {
        self.failing(
            |r| matches!(r, AuditRecord::ActionExecution(a) if a.phase == AttemptPhase::Completed),
            usize::MAX,
        )
    }

    pub fn refused(&self) -> Vec<AuditRecord> {
        self.refused.lock().clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for FlakyAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<AuditReceipt, PersistenceFailure> {
        let refuse = {
            let mut rules = self.rules.lock();
            rules.iter_mut().any(|(matcher, remaining)| {
                if *remaining > 0 && matcher(&record) {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            })
        };
        if refuse {
            let kind = record.kind();
            self.refused.lock().push(record);
            return Err(PersistenceFailure::new(kind, "disk full"));
        }
        self.inner.append(record).await
    }
}

/// Metrics provider that never answers in time
#[derive(Debug, Default)]
pub struct StalledMetrics;

#[async_trait::async_trait]
impl ReliabilityMetricsProvider for StalledMetrics {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn signals(&self, _model_id: &str) -> CollaboratorResult<ReliabilitySignals> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(CollaboratorError::unavailable("stalled", "never answers"))
    }
}

/// Runbook indexer that always fails
#[derive(Debug, Default)]
pub struct FailingIndexer;

#[async_trait::async_trait]
impl RunbookIndexer for FailingIndexer {
    async fn index_runbook(&self, _candidate: &RunbookCandidate) -> CollaboratorResult<String> {
        Err(CollaboratorError::unavailable("runbook_indexer", "index read-only"))
    }
}
