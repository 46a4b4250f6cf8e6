//! Context compressor
//!
//! Chooses how much evidence context is forwarded downstream. The result
//! never feeds the gate.

use crate::collaborators::ReliabilitySignals;
use crate::config::ScoringConfig;
use crate::scoring::context_magnitude;
use crate::types::{CompressOutput, ContextMode, StressOutput};

/// Maps evidence volume to a context mode
#[derive(Debug, Clone, Copy)]
pub struct ContextCompressor {
    params: ScoringConfig,
}

impl ContextCompressor {
    /// Create new compressor
    #[must_use]
    pub fn new(params: ScoringConfig) -> Self {
        Self { params }
    }

    /// Mode for a given evidence volume
    #[must_use]
    pub fn compress(&self, evidence_volume: f64) -> CompressOutput {
        let magnitude = context_magnitude(evidence_volume, &self.params);
        let mode = if magnitude > self.params.context_threshold {
            ContextMode::FullContext
        } else {
            ContextMode::CompressedContext
        };
        CompressOutput { mode, magnitude }
    }

    /// Mode for a finished Stress pass
    ///
    /// Volume is the provider's figure plus the distinct documents retrieved.
    #[must_use]
    pub fn compress_run(&self, signals: &ReliabilitySignals, stress: &StressOutput) -> CompressOutput {
        #[allow(clippy::cast_precision_loss)]
        let retrieved = stress.documents_retrieved as f64;
        self.compress(signals.evidence_volume + retrieved)
    }
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
