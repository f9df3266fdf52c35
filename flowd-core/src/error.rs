//! Core error types.

use crate::definition::ValidationError;
use thiserror::Error;

/// Errors from the workflow engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] ValidationError),

    #[error("definition already exists: {definition_id}")]
    DefinitionExists { definition_id: String },

    #[error("definition not found: {definition_id}")]
    DefinitionNotFound { definition_id: String },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("action '{action_id}' not found in definition '{definition_id}'")]
    ActionNotFound {
        definition_id: String,
        action_id: String,
    },

    #[error("action is disabled: {action_id}")]
    ActionDisabled { action_id: String },

    #[error("instance '{instance_id}' is in final state '{state_id}'")]
    TerminalState {
        instance_id: String,
        state_id: String,
    },

    #[error("action '{action_id}' is not allowed from state '{state_id}'")]
    IllegalTransition {
        action_id: String,
        state_id: String,
    },

    #[error("action '{action_id}' targets unknown state '{state_id}'")]
    UnknownTargetState {
        action_id: String,
        state_id: String,
    },

    #[error("internal consistency fault: {reason}")]
    ConsistencyFault { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns a stable error code suitable for protocol responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition(_) => "INVALID_DEFINITION",
            CoreError::DefinitionExists { .. } => "DEFINITION_EXISTS",
            CoreError::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            CoreError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            CoreError::ActionNotFound { .. } => "ACTION_NOT_FOUND",
            CoreError::ActionDisabled { .. } => "ACTION_DISABLED",
            CoreError::TerminalState { .. } => "TERMINAL_STATE",
            CoreError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            CoreError::UnknownTargetState { .. } => "INTERNAL_ERROR",
            CoreError::ConsistencyFault { .. } => "INTERNAL_ERROR",
            CoreError::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error indicates a broken server-side
    /// invariant rather than a client mistake.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownTargetState { .. }
                | CoreError::ConsistencyFault { .. }
                | CoreError::Json(_)
        )
    }
}
