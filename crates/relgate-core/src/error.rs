//! Error types for the Reliability Gate
//!
//! The taxonomy mirrors how each failure is allowed to propagate:
//! - Collaborator failures during Stress are downgraded to conservative
//!   claim classifications and never abort a run
//! - Validation failures reject untyped reasoner output at the boundary
//! - Gate violations are fatal and abort without executing anything
//! - Persistence failures before an action block that action

use std::time::Duration;

/// Failure reported by (or on behalf of) an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The call did not complete within its budget
    #[error("{collaborator} timed out after {after_ms}ms")]
    Timeout {
        /// Collaborator name
        collaborator: String,
        /// Budget that elapsed
        after_ms: u64,
    },

    /// The collaborator could not be reached or refused the call
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        /// Collaborator name
        collaborator: String,
        /// Failure detail
        message: String,
    },

    /// The collaborator answered with data that does not fit its contract
    #[error("{collaborator} returned malformed data: {message}")]
    Malformed {
        /// Collaborator name
        collaborator: String,
        /// Failure detail
        message: String,
    },
}

impl CollaboratorError {
    /// Timeout after the given budget
    #[must_use]
    pub fn timeout(collaborator: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            collaborator: collaborator.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Unreachable / refused
    #[must_use]
    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Contract mismatch
    #[must_use]
    pub fn malformed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Check if this is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Name of the failing collaborator
    #[must_use]
    pub fn collaborator(&self) -> &str {
        match self {
            Self::Timeout { collaborator, .. }
            | Self::Unavailable { collaborator, .. }
            | Self::Malformed { collaborator, .. } => collaborator,
        }
    }
}

/// Malformed plan, claim, hint or configuration shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// Offending field (dotted path)
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl ValidationError {
    /// Create new validation error
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Internal invariant breach inside the gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("gate invariant violated: {0}")]
pub struct GateViolation(pub String);

/// An audit append was not acknowledged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to persist {record_kind} record: {message}")]
pub struct PersistenceFailure {
    /// Kind of record that was being appended
    pub record_kind: String,
    /// Failure detail
    pub message: String,
}

impl PersistenceFailure {
    /// Create new persistence failure
    #[inline]
    #[must_use]
    pub fn new(record_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record_kind: record_kind.into(),
            message: message.into(),
        }
    }
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum RelGateError {
    /// A collaborator exceeded its budget outside of Stress
    #[error("collaborator timeout: {0}")]
    CollaboratorTimeout(CollaboratorError),

    /// A collaborator failed outside of Stress
    #[error("collaborator error: {0}")]
    Collaborator(CollaboratorError),

    /// Untyped input rejected at the boundary
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Gate produced an output that breaks its own contract
    #[error(transparent)]
    GateViolation(#[from] GateViolation),

    /// Audit trail could not be written
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(String),

    /// Operator aborted the run
    #[error("run aborted by operator")]
    Aborted,
}

impl From<CollaboratorError> for RelGateError {
    fn from(value: CollaboratorError) -> Self {
        if value.is_timeout() {
            Self::CollaboratorTimeout(value)
        } else {
            Self::Collaborator(value)
        }
    }
}

impl RelGateError {
    /// Check if the run must stop without executing anything
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GateViolation(_) | Self::Config(_))
    }

    /// Check if this error prevents any action from being taken
    #[inline]
    #[must_use]
    pub fn blocks_execution(&self) -> bool {
        !matches!(self, Self::CollaboratorTimeout(_) | Self::Collaborator(_))
    }
}

/// Result alias for pipeline operations
pub type RelGateResult<T> = Result<T, RelGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_timeout_routes_to_timeout_variant() {
        let err: RelGateError =
            CollaboratorError::timeout("evidence", Duration::from_millis(250)).into();
        assert!(matches!(err, RelGateError::CollaboratorTimeout(_)));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn collaborator_failure_routes_to_collaborator_variant() {
        let err: RelGateError = CollaboratorError::unavailable("policy", "connection refused").into();
        assert!(matches!(err, RelGateError::Collaborator(_)));
        assert!(!err.blocks_execution());
    }

    #[test]
    fn gate_violation_is_fatal() {
        let err: RelGateError = GateViolation("empty reasons".to_string()).into();
        assert!(err.is_fatal());
        assert!(err.blocks_execution());
    }

    #[test]
    fn persistence_failure_blocks_but_is_not_fatal() {
        let err: RelGateError = PersistenceFailure::new("action_execution", "disk full").into();
        assert!(!err.is_fatal());
        assert!(err.blocks_execution());
        assert!(err.to_string().contains("action_execution"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new("plan.key_claims", "must not be empty");
        assert_eq!(err.to_string(), "invalid plan.key_claims: must not be empty");
    }
}
