//! Workflow definition types and registration-time validation.
//!
//! Definitions are submitted as JSON:
//!
//! ```json
//! {
//!   "id": "doc-approval",
//!   "states": [
//!     {"id": "draft", "is_initial": true},
//!     {"id": "review"},
//!     {"id": "approved", "is_final": true}
//!   ],
//!   "actions": [
//!     {"id": "submit", "from_states": ["draft"], "to_state": "review"},
//!     {"id": "approve", "from_states": ["review"], "to_state": "approved"}
//!   ]
//! }
//! ```
//!
//! A missing `actions` list is normalized to an empty list during
//! deserialization; that is the canonical form the validator sees.
//! Once a definition passes [`WorkflowDefinition::validate`] and is
//! accepted into the store it is immutable, so the transition engine
//! can rely on its structural invariants without re-checking them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

fn default_true() -> bool {
    true
}

/// A state in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// State identifier, unique within the definition.
    pub id: String,

    /// Whether instances start in this state. Exactly one state per
    /// definition has this set.
    #[serde(default)]
    pub is_initial: bool,

    /// Whether this state is terminal. No action executes from a
    /// final state.
    #[serde(default)]
    pub is_final: bool,

    /// Advisory flag carried through from the submitted definition.
    /// The engine does not consult it.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl State {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_initial: false,
            is_final: false,
            enabled: true,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }
}

/// A transition rule: executing the action moves an instance from any
/// of `from_states` to `to_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action identifier, unique within the definition.
    pub id: String,

    /// Whether the action may currently be executed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Source states this action is executable from. An empty list
    /// means the action is not executable from anywhere.
    #[serde(default)]
    pub from_states: Vec<String>,

    /// Target state.
    pub to_state: String,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        from_states: impl IntoIterator<Item = impl Into<String>>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            from_states: from_states.into_iter().map(Into::into).collect(),
            to_state: to_state.into(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Validation failures, one variant per rule so callers can tell
/// exactly which rule a submitted definition broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("definition id is required")]
    MissingDefinitionId,

    #[error("definition '{definition_id}' has no states")]
    NoStates { definition_id: String },

    #[error("duplicate state id: {state_id}")]
    DuplicateStateId { state_id: String },

    #[error("exactly one initial state is required, found {count}")]
    InitialStateCount { count: usize },

    #[error("duplicate action id: {action_id}")]
    DuplicateActionId { action_id: String },

    #[error("action '{action_id}' targets unknown state '{state_id}'")]
    UnknownTargetState {
        action_id: String,
        state_id: String,
    },

    #[error("action '{action_id}' has unknown source state '{state_id}'")]
    UnknownSourceState {
        action_id: String,
        state_id: String,
    },
}

/// A named finite-state-machine template: states plus actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Definition identifier, unique across the store.
    pub id: String,

    /// All states. Non-empty, with exactly one initial state.
    pub states: Vec<State>,

    /// Transition rules. Defaults to empty when omitted.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl WorkflowDefinition {
    pub fn new(
        id: impl Into<String>,
        states: impl IntoIterator<Item = State>,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        Self {
            id: id.into(),
            states: states.into_iter().collect(),
            actions: actions.into_iter().collect(),
        }
    }

    /// Checks structural well-formedness. Rules run in order and the
    /// first failure wins:
    ///
    /// 1. id present (non-empty after trimming)
    /// 2. at least one state
    /// 3. state ids pairwise unique
    /// 4. exactly one initial state
    /// 5. action ids pairwise unique, and every state an action
    ///    references exists
    ///
    /// Duplicate-id-in-store is the engine's concern, checked
    /// atomically with insertion. This check is pure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingDefinitionId);
        }

        if self.states.is_empty() {
            return Err(ValidationError::NoStates {
                definition_id: self.id.clone(),
            });
        }

        let mut state_ids: HashSet<&str> = HashSet::with_capacity(self.states.len());
        for state in &self.states {
            if !state_ids.insert(state.id.as_str()) {
                return Err(ValidationError::DuplicateStateId {
                    state_id: state.id.clone(),
                });
            }
        }

        let initial_count = self.states.iter().filter(|s| s.is_initial).count();
        if initial_count != 1 {
            return Err(ValidationError::InitialStateCount {
                count: initial_count,
            });
        }

        let mut action_ids: HashSet<&str> = HashSet::with_capacity(self.actions.len());
        for action in &self.actions {
            if !action_ids.insert(action.id.as_str()) {
                return Err(ValidationError::DuplicateActionId {
                    action_id: action.id.clone(),
                });
            }

            if !state_ids.contains(action.to_state.as_str()) {
                return Err(ValidationError::UnknownTargetState {
                    action_id: action.id.clone(),
                    state_id: action.to_state.clone(),
                });
            }

            for from in &action.from_states {
                if !state_ids.contains(from.as_str()) {
                    return Err(ValidationError::UnknownSourceState {
                        action_id: action.id.clone(),
                        state_id: from.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the unique initial state. `None` only for definitions
    /// that never passed validation.
    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.is_initial)
    }

    /// Looks up a state by id.
    pub fn state(&self, state_id: &str) -> Option<&State> {
        self.states.iter().find(|s| s.id == state_id)
    }

    /// Looks up an action by id.
    pub fn action(&self, action_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == action_id)
    }

    /// CRC32C over the canonical JSON form, usable as an integrity
    /// handle for the immutable stored definition.
    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:08x}", crc32c::crc32c(&bytes)))
    }
}
