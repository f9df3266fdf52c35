//! # flowd-core
//!
//! Workflow engine for flowd.
//!
//! This crate provides:
//! - Workflow definition types and registration-time validation
//! - In-memory definition and instance stores
//! - The transition engine that executes actions on live instances
//!
//! Everything here is synchronous and in-memory. All state lives for
//! the lifetime of the process; there is no persistence layer.

pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod store;

pub use definition::{Action, State, ValidationError, WorkflowDefinition};
pub use engine::WorkflowEngine;
pub use error::CoreError;
pub use instance::{HistoryEntry, WorkflowInstance};
pub use store::{DefinitionStore, InstanceStore};
