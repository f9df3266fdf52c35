//! # flowd-server
//!
//! TCP server for flowd.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Newline-delimited JSON message dispatch
//! - Session bookkeeping
//! - Command handlers for all FCP operations

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Config, NetworkConfig};
pub use error::ServerError;
pub use handler::CommandHandler;
pub use server::{Server, ServerConfig};
pub use session::Session;
