//! Workflow instance state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed action, recorded at capture time. Immutable once
/// appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The executed action's id.
    pub action_id: String,

    /// When the action executed.
    pub timestamp: DateTime<Utc>,
}

/// A live execution of a workflow definition.
///
/// The only mutation path is [`WorkflowInstance::apply_transition`],
/// invoked by the transition engine behind the instance store's
/// locked update; nothing else writes `current_state` or `history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// System-generated instance id.
    pub id: String,

    /// Owning definition's id. Definitions are never deleted, so this
    /// reference stays valid for the instance's lifetime.
    pub definition_id: String,

    /// Current state id, always a valid state of the definition.
    pub current_state: String,

    /// Append-only record of executed actions, oldest first.
    pub history: Vec<HistoryEntry>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp; equals `created_at` until the first
    /// action executes.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Creates an instance in the given initial state with empty
    /// history.
    pub fn new(
        id: impl Into<String>,
        definition_id: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
            current_state: initial_state.into(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the instance to `to_state` and appends the matching
    /// history entry. State and history always change together.
    pub fn apply_transition(&mut self, action_id: impl Into<String>, to_state: impl Into<String>) {
        let now = Utc::now();
        self.current_state = to_state.into();
        self.history.push(HistoryEntry {
            action_id: action_id.into(),
            timestamp: now,
        });
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_starts_clean() {
        let instance = WorkflowInstance::new("i-1", "doc-approval", "draft");
        assert_eq!(instance.id, "i-1");
        assert_eq!(instance.definition_id, "doc-approval");
        assert_eq!(instance.current_state, "draft");
        assert!(instance.history.is_empty());
        assert_eq!(instance.created_at, instance.updated_at);
    }

    #[test]
    fn apply_transition_updates_state_and_history_together() {
        let mut instance = WorkflowInstance::new("i-1", "doc-approval", "draft");
        instance.apply_transition("submit", "review");

        assert_eq!(instance.current_state, "review");
        assert_eq!(instance.history.len(), 1);
        assert_eq!(instance.history[0].action_id, "submit");
        assert!(instance.updated_at >= instance.created_at);

        instance.apply_transition("approve", "approved");
        assert_eq!(instance.current_state, "approved");
        assert_eq!(instance.history.len(), 2);
        assert_eq!(instance.history[1].action_id, "approve");
        assert!(instance.history[1].timestamp >= instance.history[0].timestamp);
    }
}
