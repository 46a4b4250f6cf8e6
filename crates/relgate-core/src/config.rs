//! Pipeline configuration
//!
//! Loaded from TOML; every key is optional and falls back to the defaults
//! below. Durations are stored as milliseconds.

use crate::error::{RelGateError, RelGateResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decision thresholds
    pub gate: GateConfig,
    /// Scoring constants and metric fallbacks
    pub scoring: ScoringConfig,
    /// Claim verification budgets
    pub stress: StressConfig,
    /// Approval wait budgets
    pub escalation: EscalationConfig,
    /// Audit write retries
    pub audit: AuditConfig,
    /// Runtime limits
    pub runtime: RuntimeConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text and validate
    ///
    /// # Errors
    /// `RelGateError::Config` on parse failure or out-of-range values.
    pub fn from_toml_str(text: &str) -> RelGateResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RelGateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    ///
    /// # Errors
    /// `RelGateError::Config` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> RelGateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelGateError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// With gate section
    #[inline]
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// With scoring section
    #[inline]
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// With stress section
    #[inline]
    #[must_use]
    pub fn with_stress(mut self, stress: StressConfig) -> Self {
        self.stress = stress;
        self
    }

    /// With escalation section
    #[inline]
    #[must_use]
    pub fn with_escalation(mut self, escalation: EscalationConfig) -> Self {
        self.escalation = escalation;
        self
    }

    /// With audit section
    #[inline]
    #[must_use]
    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// With max concurrent runs
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.runtime.max_concurrent_runs = max;
        self
    }

    /// Reject out-of-range values
    ///
    /// # Errors
    /// `RelGateError::Config` naming the first offending key.
    pub fn validate(&self) -> RelGateResult<()> {
        unit_interval("gate.coverage_threshold", self.gate.coverage_threshold)?;
        if self.gate.contradiction_block_count == 0 {
            return Err(invalid("gate.contradiction_block_count", "must be at least 1"));
        }

        let s = &self.scoring;
        unit_interval("scoring.fabrication_risk_threshold", s.fabrication_risk_threshold)?;
        non_negative("scoring.fabrication_penalty", s.fabrication_penalty)?;
        non_negative("scoring.per_contradiction_penalty", s.per_contradiction_penalty)?;
        unit_interval("scoring.context_threshold", s.context_threshold)?;
        if !s.context_volume_scale.is_finite() || s.context_volume_scale <= 0.0 {
            return Err(invalid("scoring.context_volume_scale", "must be positive"));
        }
        unit_interval("scoring.fallback_fabrication", s.fallback_fabrication)?;
        unit_interval("scoring.fallback_divergence", s.fallback_divergence)?;
        if s.fallback_evidence_volume.is_nan() || s.fallback_evidence_volume < 0.0 {
            return Err(invalid("scoring.fallback_evidence_volume", "must be >= 0"));
        }

        if self.stress.evidence_top_k == 0 {
            return Err(invalid("stress.evidence_top_k", "must be at least 1"));
        }
        positive_ms("stress.claim_timeout_ms", self.stress.claim_timeout_ms)?;
        positive_ms("stress.policy_timeout_ms", self.stress.policy_timeout_ms)?;
        positive_ms("stress.metrics_timeout_ms", self.stress.metrics_timeout_ms)?;

        positive_ms("escalation.wait_budget_ms", self.escalation.wait_budget_ms)?;
        positive_ms("escalation.poll_interval_ms", self.escalation.poll_interval_ms)?;
        positive_ms("escalation.notify_timeout_ms", self.escalation.notify_timeout_ms)?;
        if self.escalation.poll_interval_ms > self.escalation.wait_budget_ms {
            return Err(invalid(
                "escalation.poll_interval_ms",
                "must not exceed escalation.wait_budget_ms",
            ));
        }

        if self.runtime.max_concurrent_runs == 0 {
            return Err(invalid("runtime.max_concurrent_runs", "must be at least 1"));
        }
        positive_ms("runtime.reasoner_timeout_ms", self.runtime.reasoner_timeout_ms)?;
        positive_ms("runtime.trigger_timeout_ms", self.runtime.trigger_timeout_ms)?;
        positive_ms("runtime.learn_timeout_ms", self.runtime.learn_timeout_ms)?;
        if self.runtime.model_id.trim().is_empty() {
            return Err(invalid("runtime.model_id", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> RelGateError {
    RelGateError::Config(format!("{key}: {message}"))
}

fn unit_interval(key: &str, value: f64) -> RelGateResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(key, "must lie in [0, 1]"))
    }
}

fn non_negative(key: &str, value: f64) -> RelGateResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(key, "must be a finite value >= 0"))
    }
}

fn positive_ms(key: &str, value: u64) -> RelGateResult<()> {
    if value == 0 {
        Err(invalid(key, "must be greater than 0"))
    } else {
        Ok(())
    }
}

/// Gate thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Coverage below this blocks when no claim has any support
    pub coverage_threshold: f64,
    /// Contradicted claims at or above this count block
    pub contradiction_block_count: usize,
    /// Downgrade to `partial_execute` on a single contradiction or a fabricated authority
    pub partial_execute_on_advisory: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.34,
            contradiction_block_count: 2,
            partial_execute_on_advisory: true,
        }
    }
}

/// Scoring constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Fabrication signal above this forces the fixed penalty
    pub fabrication_risk_threshold: f64,
    /// Fixed confidence drop on fabrication risk
    pub fabrication_penalty: f64,
    /// Base penalty per contradicted claim
    pub per_contradiction_penalty: f64,
    /// Context magnitude above this selects full context
    pub context_threshold: f64,
    /// Evidence volume scale of the magnitude curve
    pub context_volume_scale: f64,
    /// Fabrication signal when no metrics provider answers
    pub fallback_fabrication: f64,
    /// Divergence signal when no metrics provider answers
    pub fallback_divergence: f64,
    /// Evidence volume when no metrics provider answers
    pub fallback_evidence_volume: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fabrication_risk_threshold: 0.5,
            fabrication_penalty: 25.0,
            per_contradiction_penalty: 9.0,
            context_threshold: 0.4,
            context_volume_scale: 10.0,
            fallback_fabrication: 1.0,
            fallback_divergence: 1.0,
            fallback_evidence_volume: f64::INFINITY,
        }
    }
}

/// Claim verification budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Evidence hits requested per query
    pub evidence_top_k: usize,
    /// Budget for one claim's evidence lookups
    pub claim_timeout_ms: u64,
    /// Budget for the policy check
    pub policy_timeout_ms: u64,
    /// Budget for one metrics provider
    pub metrics_timeout_ms: u64,
}

impl StressConfig {
    /// Per-claim budget
    #[inline]
    #[must_use]
    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }

    /// Policy budget
    #[inline]
    #[must_use]
    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    /// Metrics budget
    #[inline]
    #[must_use]
    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_millis(self.metrics_timeout_ms)
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            evidence_top_k: 3,
            claim_timeout_ms: 2_000,
            policy_timeout_ms: 2_000,
            metrics_timeout_ms: 1_000,
        }
    }
}

/// Approval wait budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Total time to wait for a human signal
    pub wait_budget_ms: u64,
    /// Budget handed to each poll
    pub poll_interval_ms: u64,
    /// Budget for posting the approval request
    pub notify_timeout_ms: u64,
}

impl EscalationConfig {
    /// Total wait budget
    #[inline]
    #[must_use]
    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(self.wait_budget_ms)
    }

    /// Per-poll budget
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Notification budget
    #[inline]
    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            wait_budget_ms: 300_000,
            poll_interval_ms: 5_000,
            notify_timeout_ms: 5_000,
        }
    }
}

/// Audit write retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Retries of the post-attempt write
    pub post_write_retries: u32,
    /// Base backoff, doubled per retry
    pub retry_backoff_ms: u64,
}

impl AuditConfig {
    /// Backoff before the given retry (1-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            post_write_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

/// Runtime limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Incidents processed concurrently by `run_many`
    pub max_concurrent_runs: usize,
    /// Model identifier handed to the metrics providers
    pub model_id: String,
    /// Budget for reasoner calls
    pub reasoner_timeout_ms: u64,
    /// Budget for the action trigger
    pub trigger_timeout_ms: u64,
    /// Budget for runbook indexing
    pub learn_timeout_ms: u64,
}

impl RuntimeConfig {
    /// Reasoner budget
    #[inline]
    #[must_use]
    pub fn reasoner_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoner_timeout_ms)
    }

    /// Trigger budget
    #[inline]
    #[must_use]
    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.trigger_timeout_ms)
    }

    /// Learn budget
    #[inline]
    #[must_use]
    pub fn learn_timeout(&self) -> Duration {
        Duration::from_millis(self.learn_timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            model_id: "default".to_string(),
            reasoner_timeout_ms: 30_000,
            trigger_timeout_ms: 30_000,
            learn_timeout_ms: 5_000,
        }
    }
}
