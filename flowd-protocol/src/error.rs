//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or message
/// handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes returned in error responses.
///
/// These codes are part of the protocol contract and must remain
/// stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    UnsupportedProtocol,
    BadRequest,

    // Definition errors
    InvalidDefinition,
    DefinitionExists,
    DefinitionNotFound,

    // Instance execution errors
    InstanceNotFound,
    ActionNotFound,
    ActionDisabled,
    TerminalState,
    IllegalTransition,

    // System errors
    InternalError,
}

impl ErrorCode {
    /// Returns whether this code indicates a server-side fault as
    /// opposed to a client mistake.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ErrorCode::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::UnsupportedProtocol => write!(f, "UNSUPPORTED_PROTOCOL"),
            ErrorCode::BadRequest => write!(f, "BAD_REQUEST"),
            ErrorCode::InvalidDefinition => write!(f, "INVALID_DEFINITION"),
            ErrorCode::DefinitionExists => write!(f, "DEFINITION_EXISTS"),
            ErrorCode::DefinitionNotFound => write!(f, "DEFINITION_NOT_FOUND"),
            ErrorCode::InstanceNotFound => write!(f, "INSTANCE_NOT_FOUND"),
            ErrorCode::ActionNotFound => write!(f, "ACTION_NOT_FOUND"),
            ErrorCode::ActionDisabled => write!(f, "ACTION_DISABLED"),
            ErrorCode::TerminalState => write!(f, "TERMINAL_STATE"),
            ErrorCode::IllegalTransition => write!(f, "ILLEGAL_TRANSITION"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}
