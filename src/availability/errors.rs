//! Role transition errors

use thiserror::Error;

/// Result type for role transitions
pub type AvailabilityResult<T> = Result<T, AvailabilityError>;

/// Role transition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvailabilityError {
    /// The requested transition is not allowed from the current role
    #[error("Illegal role transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Secondary identity changed without a reconfiguration
    #[error("Replica id mismatch: {0}")]
    ReplicaIdMismatch(String),
}

impl AvailabilityError {
    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            AvailabilityError::IllegalTransition { .. } => "TIERKV_ROLE_ILLEGAL_TRANSITION",
            AvailabilityError::ReplicaIdMismatch(_) => "TIERKV_ROLE_REPLICA_ID_MISMATCH",
        }
    }
}
