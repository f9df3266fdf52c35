//! # flowd-protocol
//!
//! Wire protocol for flowd (FCP - flowd Command Protocol).
//!
//! This crate provides:
//! - Newline-delimited JSON framing
//! - Request/Response envelope types
//! - Typed operation parameters and results
//! - Stable error codes

pub mod codec;
pub mod error;
pub mod message;

pub use codec::LineDecoder;
pub use error::{ErrorCode, ProtocolError};
pub use message::{Operation, Request, Response, ResponseError, ResponseMeta, ResponseStatus};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for the flowd server.
pub const DEFAULT_PORT: u16 = 7410;

/// Maximum length of a single request line (1 MiB).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;
