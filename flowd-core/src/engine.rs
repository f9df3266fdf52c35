//! Workflow engine - coordinates definitions, instances, and
//! transition execution.

use crate::definition::{Action, State, ValidationError, WorkflowDefinition};
use crate::error::CoreError;
use crate::instance::WorkflowInstance;
use crate::store::{DefinitionStore, InstanceStore};
use std::sync::Arc;
use uuid::Uuid;

/// The workflow engine. Owns the definition and instance stores and
/// exposes every operation the transport layer needs; nothing outside
/// this type mutates an instance.
#[derive(Debug, Default)]
pub struct WorkflowEngine {
    definitions: DefinitionStore,
    instances: InstanceStore,
}

impl WorkflowEngine {
    /// Creates an engine with empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Definition Management
    // =========================================================================

    /// Validates and stores a workflow definition. On failure nothing
    /// is stored. Checks run in order and the first failure wins:
    /// id present, id not already registered, then the structural
    /// rules of [`WorkflowDefinition::validate`].
    pub fn register_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>, CoreError> {
        if definition.id.trim().is_empty() {
            return Err(ValidationError::MissingDefinitionId.into());
        }

        // Fast fail for the common sequential case; the insert below
        // re-checks under the store's atomic entry.
        if self.definitions.contains(&definition.id) {
            return Err(CoreError::DefinitionExists {
                definition_id: definition.id,
            });
        }

        definition.validate()?;

        let definition_id = definition.id.clone();
        let stored = self
            .definitions
            .insert_if_absent(definition)
            .ok_or(CoreError::DefinitionExists { definition_id })?;

        tracing::info!(
            definition_id = %stored.id,
            states = stored.states.len(),
            actions = stored.actions.len(),
            "registered workflow definition"
        );

        Ok(stored)
    }

    /// Gets a definition by id.
    pub fn get_definition(&self, definition_id: &str) -> Result<Arc<WorkflowDefinition>, CoreError> {
        self.definitions
            .get(definition_id)
            .ok_or_else(|| CoreError::DefinitionNotFound {
                definition_id: definition_id.to_string(),
            })
    }

    /// Lists all definitions, sorted by id for stable output.
    pub fn list_definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut definitions = self.definitions.list();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }

    /// Read-only projection of a definition's states.
    pub fn definition_states(&self, definition_id: &str) -> Result<Vec<State>, CoreError> {
        Ok(self.get_definition(definition_id)?.states.clone())
    }

    /// Read-only projection of a definition's actions.
    pub fn definition_actions(&self, definition_id: &str) -> Result<Vec<Action>, CoreError> {
        Ok(self.get_definition(definition_id)?.actions.clone())
    }

    // =========================================================================
    // Instance Management
    // =========================================================================

    /// Creates an instance of the given definition, starting in its
    /// unique initial state with empty history.
    pub fn create_instance(&self, definition_id: &str) -> Result<WorkflowInstance, CoreError> {
        let definition = self.get_definition(definition_id)?;

        let initial = definition
            .initial_state()
            .ok_or_else(|| CoreError::ConsistencyFault {
                reason: format!("definition '{}' has no initial state", definition.id),
            })?;

        let instance =
            WorkflowInstance::new(Uuid::new_v4().to_string(), &definition.id, &initial.id);
        self.instances.insert(instance.clone());

        tracing::info!(
            instance_id = %instance.id,
            definition_id = %definition.id,
            state = %instance.current_state,
            "created workflow instance"
        );

        Ok(instance)
    }

    /// Gets a point-in-time snapshot of an instance.
    pub fn get_instance(&self, instance_id: &str) -> Result<WorkflowInstance, CoreError> {
        self.instances
            .get(instance_id)
            .ok_or_else(|| CoreError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    /// Lists all instances, sorted by id for stable output.
    pub fn list_instances(&self) -> Vec<WorkflowInstance> {
        let mut instances = self.instances.list();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    // =========================================================================
    // Transition Execution
    // =========================================================================

    /// Executes an action on an instance and returns the updated
    /// instance.
    ///
    /// The whole sequence runs under the instance's write lock, each
    /// step short-circuiting on failure: resolve instance, resolve
    /// definition, resolve action, reject disabled actions, reject
    /// final current states, reject actions not reachable from the
    /// current state, resolve the target, then apply. The instance is
    /// untouched unless every check passes, and no observer can see
    /// the state updated without the matching history entry.
    pub fn execute_action(
        &self,
        instance_id: &str,
        action_id: &str,
    ) -> Result<WorkflowInstance, CoreError> {
        let updated = self
            .instances
            .update(instance_id, |instance| self.run_transition(instance, action_id))
            .ok_or_else(|| CoreError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })??;

        tracing::debug!(
            instance_id = %updated.id,
            action_id,
            state = %updated.current_state,
            "executed action"
        );

        Ok(updated)
    }

    /// Transition checks and mutation, called with the instance write
    /// lock held.
    fn run_transition(
        &self,
        instance: &mut WorkflowInstance,
        action_id: &str,
    ) -> Result<WorkflowInstance, CoreError> {
        // Definitions are never deleted, so a miss here means the
        // store is corrupted, not a caller mistake.
        let definition = self.definitions.get(&instance.definition_id).ok_or_else(|| {
            CoreError::ConsistencyFault {
                reason: format!(
                    "instance '{}' references missing definition '{}'",
                    instance.id, instance.definition_id
                ),
            }
        })?;

        let action =
            definition
                .action(action_id)
                .ok_or_else(|| CoreError::ActionNotFound {
                    definition_id: definition.id.clone(),
                    action_id: action_id.to_string(),
                })?;

        if !action.enabled {
            return Err(CoreError::ActionDisabled {
                action_id: action.id.clone(),
            });
        }

        let current = definition.state(&instance.current_state).ok_or_else(|| {
            CoreError::ConsistencyFault {
                reason: format!(
                    "instance '{}' is in state '{}' unknown to definition '{}'",
                    instance.id, instance.current_state, definition.id
                ),
            }
        })?;

        if current.is_final {
            return Err(CoreError::TerminalState {
                instance_id: instance.id.clone(),
                state_id: current.id.clone(),
            });
        }

        if !action.from_states.iter().any(|s| s == &current.id) {
            return Err(CoreError::IllegalTransition {
                action_id: action.id.clone(),
                state_id: current.id.clone(),
            });
        }

        // Guaranteed by registration-time validation; a miss means a
        // broken invariant, surfaced as a server fault.
        let target =
            definition
                .state(&action.to_state)
                .ok_or_else(|| CoreError::UnknownTargetState {
                    action_id: action.id.clone(),
                    state_id: action.to_state.clone(),
                })?;

        instance.apply_transition(&action.id, &target.id);
        Ok(instance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Action, State};

    fn doc_approval() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "doc-approval",
            [
                State::new("draft").initial(),
                State::new("review"),
                State::new("approved").final_state(),
                State::new("rejected").final_state(),
            ],
            [
                Action::new("submit", ["draft"], "review"),
                Action::new("approve", ["review"], "approved"),
                Action::new("reject", ["review"], "rejected"),
            ],
        )
    }

    fn engine_with_doc_approval() -> WorkflowEngine {
        let engine = WorkflowEngine::new();
        engine.register_definition(doc_approval()).unwrap();
        engine
    }

    #[test]
    fn register_and_get_definition() {
        let engine = engine_with_doc_approval();
        let def = engine.get_definition("doc-approval").unwrap();
        assert_eq!(def.id, "doc-approval");
        assert_eq!(def.states.len(), 4);
        assert_eq!(def.actions.len(), 3);
    }

    #[test]
    fn register_rejects_invalid_definition() {
        let engine = WorkflowEngine::new();
        let result = engine.register_definition(WorkflowDefinition::new("bad", [], []));
        assert!(matches!(result, Err(CoreError::InvalidDefinition(_))));
        assert!(engine.list_definitions().is_empty());
    }

    #[test]
    fn duplicate_registration_fails_and_keeps_first() {
        let engine = engine_with_doc_approval();

        let mut second = doc_approval();
        second.actions.clear();
        let result = engine.register_definition(second);
        assert!(matches!(result, Err(CoreError::DefinitionExists { .. })));

        let stored = engine.get_definition("doc-approval").unwrap();
        assert_eq!(stored.actions.len(), 3);
        assert_eq!(engine.list_definitions().len(), 1);
    }

    #[test]
    fn definition_projections() {
        let engine = engine_with_doc_approval();

        let states = engine.definition_states("doc-approval").unwrap();
        assert_eq!(states.len(), 4);

        let actions = engine.definition_actions("doc-approval").unwrap();
        assert_eq!(actions.len(), 3);

        assert!(matches!(
            engine.definition_states("missing"),
            Err(CoreError::DefinitionNotFound { .. })
        ));
    }

    #[test]
    fn create_instance_starts_in_initial_state() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();

        assert_eq!(instance.current_state, "draft");
        assert!(instance.history.is_empty());

        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched, instance);
    }

    #[test]
    fn create_instance_unknown_definition() {
        let engine = WorkflowEngine::new();
        assert!(matches!(
            engine.create_instance("missing"),
            Err(CoreError::DefinitionNotFound { .. })
        ));
        assert!(engine.list_instances().is_empty());
    }

    #[test]
    fn instance_ids_are_unique() {
        let engine = engine_with_doc_approval();
        let a = engine.create_instance("doc-approval").unwrap();
        let b = engine.create_instance("doc-approval").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(engine.list_instances().len(), 2);
    }

    #[test]
    fn legal_action_transitions_and_records_history() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();

        let updated = engine.execute_action(&instance.id, "submit").unwrap();
        assert_eq!(updated.current_state, "review");
        assert_eq!(updated.history.len(), 1);
        assert_eq!(updated.history[0].action_id, "submit");

        // A re-read reflects state and history together.
        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched.current_state, "review");
        assert_eq!(fetched.history.len(), 1);
    }

    #[test]
    fn illegal_transition_leaves_instance_unchanged() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();

        // approve is not reachable from draft.
        let result = engine.execute_action(&instance.id, "approve");
        assert!(matches!(
            result,
            Err(CoreError::IllegalTransition { .. })
        ));

        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched.current_state, "draft");
        assert!(fetched.history.is_empty());
    }

    #[test]
    fn unknown_action_fails() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();

        let result = engine.execute_action(&instance.id, "teleport");
        assert!(matches!(result, Err(CoreError::ActionNotFound { .. })));
    }

    #[test]
    fn unknown_instance_fails() {
        let engine = engine_with_doc_approval();
        let result = engine.execute_action("ghost", "submit");
        assert!(matches!(result, Err(CoreError::InstanceNotFound { .. })));
    }

    #[test]
    fn disabled_action_fails_even_from_valid_source() {
        let engine = WorkflowEngine::new();
        engine
            .register_definition(WorkflowDefinition::new(
                "gated",
                [State::new("open").initial(), State::new("closed")],
                [Action::new("close", ["open"], "closed").disabled()],
            ))
            .unwrap();

        let instance = engine.create_instance("gated").unwrap();
        let result = engine.execute_action(&instance.id, "close");
        assert!(matches!(result, Err(CoreError::ActionDisabled { .. })));

        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched.current_state, "open");
        assert!(fetched.history.is_empty());
    }

    #[test]
    fn terminal_state_blocks_every_action() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();

        engine.execute_action(&instance.id, "submit").unwrap();
        engine.execute_action(&instance.id, "approve").unwrap();

        for action in ["submit", "approve", "reject"] {
            let result = engine.execute_action(&instance.id, action);
            assert!(
                matches!(result, Err(CoreError::TerminalState { .. })),
                "expected TerminalState for '{action}'"
            );
        }

        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched.current_state, "approved");
        assert_eq!(fetched.history.len(), 2);
    }

    #[test]
    fn doc_approval_walkthrough() {
        let engine = engine_with_doc_approval();
        let instance = engine.create_instance("doc-approval").unwrap();
        assert_eq!(instance.current_state, "draft");

        assert!(matches!(
            engine.execute_action(&instance.id, "approve"),
            Err(CoreError::IllegalTransition { .. })
        ));

        let after_submit = engine.execute_action(&instance.id, "submit").unwrap();
        assert_eq!(after_submit.current_state, "review");
        assert_eq!(after_submit.history.len(), 1);

        let after_approve = engine.execute_action(&instance.id, "approve").unwrap();
        assert_eq!(after_approve.current_state, "approved");
        let ids: Vec<_> = after_approve
            .history
            .iter()
            .map(|h| h.action_id.as_str())
            .collect();
        assert_eq!(ids, ["submit", "approve"]);

        assert!(matches!(
            engine.execute_action(&instance.id, "reject"),
            Err(CoreError::TerminalState { .. })
        ));
        let fetched = engine.get_instance(&instance.id).unwrap();
        assert_eq!(fetched.current_state, "approved");
        assert_eq!(fetched.history.len(), 2);
    }

    #[test]
    fn concurrent_registrations_single_winner() {
        let engine = std::sync::Arc::new(WorkflowEngine::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.register_definition(doc_approval()).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(engine.list_definitions().len(), 1);
    }

    /// Mutations are serialized per instance: of two racing legal
    /// actions, at most one applies and the loser observes the
    /// winner's state.
    #[test]
    fn concurrent_executes_serialize() {
        let engine = std::sync::Arc::new(engine_with_doc_approval());

        for _ in 0..16 {
            let instance = engine.create_instance("doc-approval").unwrap();
            engine.execute_action(&instance.id, "submit").unwrap();

            // approve and reject are both legal from review.
            let handles: Vec<_> = ["approve", "reject"]
                .into_iter()
                .map(|action| {
                    let engine = engine.clone();
                    let id = instance.id.clone();
                    std::thread::spawn(move || engine.execute_action(&id, action))
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let successes = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(successes, 1, "exactly one racing execute must win");

            let fetched = engine.get_instance(&instance.id).unwrap();
            assert_eq!(fetched.history.len(), 2, "exactly one new history entry");

            let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
            assert_eq!(fetched.current_state, winner.current_state);
            assert!(fetched.current_state == "approved" || fetched.current_state == "rejected");
        }
    }
}
