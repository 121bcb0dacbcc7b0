//! Error types for the action engine.

use opsmith_core::error::OpsError;
use opsmith_store::entities::InvocationState;
use thiserror::Error;

use crate::types::ActionType;

/// Errors surfaced by action validation, preview, and execution.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A parameter is missing, malformed, or out of range.
    #[error("Invalid parameter '{field}': {message}")]
    Validation { field: String, message: String },

    /// A referenced record does not exist in the caller's organization.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The action no longer applies to the current state of the data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage or serialization failure below the action layer.
    #[error("Storage error: {0}")]
    Persistence(#[from] OpsError),

    /// The handler does not implement undo.
    #[error("Undo is not supported for action: {0}")]
    UnsupportedUndo(ActionType),

    /// No handler is registered under the given name.
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    /// An invocation state change outside the allowed lifecycle.
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(InvocationState, InvocationState),
}

impl ActionError {
    /// Shorthand for a field-level validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ActionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = ActionError::validation("amount", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'amount': must be positive"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = ActionError::NotFound("Invoice INV-0042".to_string());
        assert_eq!(err.to_string(), "Not found: Invoice INV-0042");
    }

    #[test]
    fn test_conflict_display() {
        let err = ActionError::Conflict("Invoice is already settled".to_string());
        assert_eq!(err.to_string(), "Conflict: Invoice is already settled");
    }

    #[test]
    fn test_persistence_from_ops_error() {
        let err: ActionError = OpsError::Storage("disk full".to_string()).into();
        assert!(matches!(err, ActionError::Persistence(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_unsupported_undo_display() {
        let err = ActionError::UnsupportedUndo(ActionType::GenerateReport);
        assert_eq!(
            err.to_string(),
            "Undo is not supported for action: generate_report"
        );
    }

    #[test]
    fn test_unknown_action_display() {
        let err = ActionError::UnknownAction("launch_rocket".to_string());
        assert_eq!(err.to_string(), "Unknown action type: launch_rocket");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err =
            ActionError::InvalidTransition(InvocationState::Executed, InvocationState::Pending);
        assert_eq!(err.to_string(), "Invalid state transition: executed -> pending");
    }
}
