//! Gate state machine
//!
//! `pending -> {execute, partial_execute, block_and_escalate} -> {completed, escalated}`.
//! An escalated incident only reaches `completed` once a human releases it.

use crate::error::GateViolation;
use crate::types::Decision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one incident's gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Stress output available, no decision yet
    Pending,
    /// Decided: run the action
    Execute,
    /// Decided: run the first step under guardrails
    PartialExecute,
    /// Decided: ask a human
    BlockAndEscalate,
    /// Execution attempted
    Completed,
    /// Awaiting a human decision
    Escalated,
}

impl GateState {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GateState::Pending => "pending",
            GateState::Execute => "execute",
            GateState::PartialExecute => "partial_execute",
            GateState::BlockAndEscalate => "block_and_escalate",
            GateState::Completed => "completed",
            GateState::Escalated => "escalated",
        }
    }

    /// Check if no automatic transition leaves this state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Completed | GateState::Escalated)
    }
}

impl From<Decision> for GateState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Execute => GateState::Execute,
            Decision::PartialExecute => GateState::PartialExecute,
            Decision::BlockAndEscalate => GateState::BlockAndEscalate,
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: GateState) -> &'static [GateState] {
    use GateState::*;
    match from {
        Pending => &[Execute, PartialExecute, BlockAndEscalate],
        Execute | PartialExecute => &[Completed],
        BlockAndEscalate => &[Escalated],
        Escalated => &[Completed],
        Completed => &[],
    }
}

/// Validate a transition
///
/// # Errors
/// `GateViolation` if `to` is not reachable from `from`.
pub fn validate_transition(from: GateState, to: GateState) -> Result<(), GateViolation> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(GateViolation(format!("illegal transition {from} -> {to}")))
    }
}

/// Tracks one incident through the gate states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTracker {
    current: GateState,
    history: Vec<GateState>,
}

impl GateTracker {
    /// Start in `pending`
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: GateState::Pending,
            history: vec![GateState::Pending],
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn current(&self) -> GateState {
        self.current
    }

    /// Every state visited, in order
    #[must_use]
    pub fn history(&self) -> &[GateState] {
        &self.history
    }

    /// Move to `to`
    ///
    /// # Errors
    /// `GateViolation` on an illegal transition; the state is unchanged.
    pub fn advance(&mut self, to: GateState) -> Result<GateState, GateViolation> {
        validate_transition(self.current, to)?;
        let from = self.current;
        self.current = to;
        self.history.push(to);
        Ok(from)
    }
}

impl Default for GateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_path() {
        let mut tracker = GateTracker::new();
        tracker.advance(GateState::Execute).unwrap();
        tracker.advance(GateState::Completed).unwrap();
        assert_eq!(
            tracker.history(),
            &[GateState::Pending, GateState::Execute, GateState::Completed]
        );
    }

    #[test]
    fn block_cannot_complete_without_escalating() {
        let mut tracker = GateTracker::new();
        tracker.advance(GateState::BlockAndEscalate).unwrap();
        assert!(tracker.advance(GateState::Completed).is_err());
        assert_eq!(tracker.current(), GateState::BlockAndEscalate);
        tracker.advance(GateState::Escalated).unwrap();
        tracker.advance(GateState::Completed).unwrap();
    }

    #[test]
    fn pending_cannot_skip_decision() {
        assert!(validate_transition(GateState::Pending, GateState::Completed).is_err());
        assert!(validate_transition(GateState::Pending, GateState::Escalated).is_err());
    }

    #[test]
    fn completed_is_final() {
        assert!(allowed_transitions(GateState::Completed).is_empty());
        assert!(GateState::Completed.is_terminal());
    }
}
