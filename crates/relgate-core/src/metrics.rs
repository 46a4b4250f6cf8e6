//! Ranked reliability-metrics providers
//!
//! Providers are tried in order; the first valid answer wins. When none
//! answers, the configured fallback signals are used.

use crate::collaborators::{ReliabilityMetricsProvider, ReliabilitySignals};
use crate::config::ScoringConfig;
use crate::error::CollaboratorError;
use crate::records::ToolCall;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

impl ReliabilitySignals {
    /// Conservative signals used when no provider answers
    #[must_use]
    pub fn fallback(params: &ScoringConfig) -> Self {
        Self {
            fabrication_signal: params.fallback_fabrication,
            divergence_signal: params.fallback_divergence,
            evidence_volume: params.fallback_evidence_volume,
            source: "fallback".to_string(),
        }
    }

    /// Check if the signals are usable
    fn check(&self, provider: &str) -> Result<(), CollaboratorError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.fabrication_signal) {
            return Err(CollaboratorError::malformed(
                provider,
                format!("fabrication signal {} outside [0, 1]", self.fabrication_signal),
            ));
        }
        if !in_unit(self.divergence_signal) {
            return Err(CollaboratorError::malformed(
                provider,
                format!("divergence signal {} outside [0, 1]", self.divergence_signal),
            ));
        }
        if self.evidence_volume.is_nan() || self.evidence_volume < 0.0 {
            return Err(CollaboratorError::malformed(
                provider,
                "evidence volume must be >= 0",
            ));
        }
        Ok(())
    }

    /// Check if these are the fallback values
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == "fallback"
    }
}

/// Signals plus the provider calls made to obtain them
#[derive(Debug, Clone)]
pub struct MetricsResolution {
    /// Signals to score with
    pub signals: ReliabilitySignals,
    /// One entry per provider tried
    pub calls: Vec<ToolCall>,
}

/// Ordered list of metrics providers behind one capability
#[derive(Clone)]
pub struct RankedMetricsProviders {
    providers: Vec<Arc<dyn ReliabilityMetricsProvider>>,
    timeout: Duration,
    fallback: ReliabilitySignals,
}

impl RankedMetricsProviders {
    /// Create from providers in priority order
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn ReliabilityMetricsProvider>>,
        timeout: Duration,
        params: &ScoringConfig,
    ) -> Self {
        Self {
            providers,
            timeout,
            fallback: ReliabilitySignals::fallback(params),
        }
    }

    /// Number of providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if there are no providers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve signals for `model_id`
    pub async fn resolve(&self, model_id: &str) -> MetricsResolution {
        let mut calls = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name().to_string();
            let outcome = match tokio::time::timeout(self.timeout, provider.signals(model_id)).await
            {
                Ok(Ok(signals)) => signals.check(&name).map(|()| signals),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CollaboratorError::timeout(name.clone(), self.timeout)),
            };
            match outcome {
                Ok(mut signals) => {
                    debug!(provider = %name, model_id, "reliability signals resolved");
                    calls.push(ToolCall::ok("metrics", "signals", name.clone()));
                    signals.source = name;
                    return MetricsResolution { signals, calls };
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "metrics provider failed, trying next");
                    calls.push(ToolCall::failed("metrics", "signals", &e));
                }
            }
        }
        warn!(model_id, "no metrics provider answered, using fallback signals");
        MetricsResolution {
            signals: self.fallback.clone(),
            calls,
        }
    }
}

impl std::fmt::Debug for RankedMetricsProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankedMetricsProviders")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
