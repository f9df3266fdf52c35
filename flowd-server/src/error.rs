//! Server error types.

use flowd_core::CoreError;
use flowd_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocol(u16),

    #[error("handshake required before this operation")]
    HandshakeRequired,

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Converts to a protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Io(_) => ErrorCode::InternalError,
            ServerError::Protocol(_) => ErrorCode::BadRequest,
            ServerError::Core(e) => match e.error_code() {
                "INVALID_DEFINITION" => ErrorCode::InvalidDefinition,
                "DEFINITION_EXISTS" => ErrorCode::DefinitionExists,
                "DEFINITION_NOT_FOUND" => ErrorCode::DefinitionNotFound,
                "INSTANCE_NOT_FOUND" => ErrorCode::InstanceNotFound,
                "ACTION_NOT_FOUND" => ErrorCode::ActionNotFound,
                "ACTION_DISABLED" => ErrorCode::ActionDisabled,
                "TERMINAL_STATE" => ErrorCode::TerminalState,
                "ILLEGAL_TRANSITION" => ErrorCode::IllegalTransition,
                _ => ErrorCode::InternalError,
            },
            ServerError::Json(_) => ErrorCode::InternalError,
            ServerError::InvalidRequest(_) => ErrorCode::BadRequest,
            ServerError::UnsupportedProtocol(_) => ErrorCode::UnsupportedProtocol,
            ServerError::HandshakeRequired => ErrorCode::BadRequest,
            ServerError::ShuttingDown => ErrorCode::InternalError,
        }
    }

    /// Structured detail pairs naming the identifiers the error is
    /// about, attached to error responses so callers can act on the
    /// failed rule without parsing the message.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        use flowd_core::ValidationError;

        let ServerError::Core(core) = self else {
            return Vec::new();
        };

        match core {
            CoreError::InvalidDefinition(v) => match v {
                ValidationError::MissingDefinitionId => Vec::new(),
                ValidationError::NoStates { definition_id } => {
                    vec![("definition_id", definition_id.clone())]
                }
                ValidationError::DuplicateStateId { state_id } => {
                    vec![("state_id", state_id.clone())]
                }
                ValidationError::InitialStateCount { count } => {
                    vec![("initial_state_count", count.to_string())]
                }
                ValidationError::DuplicateActionId { action_id } => {
                    vec![("action_id", action_id.clone())]
                }
                ValidationError::UnknownTargetState {
                    action_id,
                    state_id,
                }
                | ValidationError::UnknownSourceState {
                    action_id,
                    state_id,
                } => vec![
                    ("action_id", action_id.clone()),
                    ("state_id", state_id.clone()),
                ],
            },
            CoreError::DefinitionExists { definition_id }
            | CoreError::DefinitionNotFound { definition_id } => {
                vec![("definition_id", definition_id.clone())]
            }
            CoreError::InstanceNotFound { instance_id } => {
                vec![("instance_id", instance_id.clone())]
            }
            CoreError::ActionNotFound {
                definition_id,
                action_id,
            } => vec![
                ("definition_id", definition_id.clone()),
                ("action_id", action_id.clone()),
            ],
            CoreError::ActionDisabled { action_id } => {
                vec![("action_id", action_id.clone())]
            }
            CoreError::TerminalState {
                instance_id,
                state_id,
            } => vec![
                ("instance_id", instance_id.clone()),
                ("state_id", state_id.clone()),
            ],
            CoreError::IllegalTransition {
                action_id,
                state_id,
            }
            | CoreError::UnknownTargetState {
                action_id,
                state_id,
            } => vec![
                ("action_id", action_id.clone()),
                ("state_id", state_id.clone()),
            ],
            CoreError::ConsistencyFault { .. } | CoreError::Json(_) => Vec::new(),
        }
    }
}
