//! In-memory stores for definitions and instances.
//!
//! Both stores expose only atomic operations. The definition store's
//! duplicate check and insert are a single step via the map's entry
//! API; the instance store hands out point-in-time clones for reads
//! and runs mutations behind a per-instance write lock, so no caller
//! ever holds a raw mutable handle.

use crate::definition::WorkflowDefinition;
use crate::instance::WorkflowInstance;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable store of validated workflow definitions, keyed by id.
/// No update or delete; a stored definition lives for the process
/// lifetime.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    inner: DashMap<String, Arc<WorkflowDefinition>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the definition unless its id is already present.
    /// Returns `None` on conflict. Check and insert are one atomic
    /// operation, so two racing registrations of the same id cannot
    /// both succeed.
    pub fn insert_if_absent(
        &self,
        definition: WorkflowDefinition,
    ) -> Option<Arc<WorkflowDefinition>> {
        match self.inner.entry(definition.id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let stored = Arc::new(definition);
                entry.insert(stored.clone());
                Some(stored)
            }
        }
    }

    pub fn contains(&self, definition_id: &str) -> bool {
        self.inner.contains_key(definition_id)
    }

    pub fn get(&self, definition_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.inner.get(definition_id).map(|r| r.value().clone())
    }

    /// Returns all stored definitions. Iteration order is not the
    /// insertion order; callers must not depend on it.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.inner.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Mutable store of live instances, keyed by id. Each instance sits
/// behind its own lock; reads of different instances never contend.
#[derive(Debug, Default)]
pub struct InstanceStore {
    inner: DashMap<String, RwLock<WorkflowInstance>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly created instance. Ids are generated with
    /// UUID-class entropy, so a collision is treated as impossible
    /// rather than an error case.
    pub fn insert(&self, instance: WorkflowInstance) {
        self.inner
            .insert(instance.id.clone(), RwLock::new(instance));
    }

    /// Returns a point-in-time clone of the instance.
    pub fn get(&self, instance_id: &str) -> Option<WorkflowInstance> {
        self.inner.get(instance_id).map(|r| r.value().read().clone())
    }

    /// Runs `f` with exclusive access to the instance. The write lock
    /// is held for the whole closure, so every check a caller makes
    /// inside it is atomic with the mutation it guards. Returns
    /// `None` if the instance does not exist.
    pub fn update<T>(
        &self,
        instance_id: &str,
        f: impl FnOnce(&mut WorkflowInstance) -> T,
    ) -> Option<T> {
        let entry = self.inner.get(instance_id)?;
        let mut instance = entry.value().write();
        Some(f(&mut instance))
    }

    /// Returns point-in-time clones of all instances. Iteration order
    /// is unspecified.
    pub fn list(&self) -> Vec<WorkflowInstance> {
        self.inner.iter().map(|r| r.value().read().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
