//! Saga definition registry.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};

/// Maps saga names to their definitions.
///
/// Definitions are registered once at startup by the modules that own them
/// and looked up by name on every execution. Cloning the registry yields
/// another handle to the same definitions.
#[derive(Clone, Default)]
pub struct SagaRegistry {
    definitions: Arc<DashMap<String, Arc<SagaDefinition>>>,
}

impl SagaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its own name.
    ///
    /// Fails with [`SagaError::DuplicateSaga`] if the name is taken;
    /// definitions are immutable once registered.
    pub fn register(&self, definition: SagaDefinition) -> Result<()> {
        let name = definition.name().to_string();
        match self.definitions.entry(name.clone()) {
            Entry::Occupied(_) => Err(SagaError::DuplicateSaga(name)),
            Entry::Vacant(slot) => {
                tracing::info!(
                    saga = %name,
                    steps = definition.step_count(),
                    "saga definition registered"
                );
                slot.insert(Arc::new(definition));
                Ok(())
            }
        }
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Result<Arc<SagaDefinition>> {
        self.definitions
            .get(name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| SagaError::SagaNotFound(name.to_string()))
    }

    /// Returns true if a definition is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Returns the registered saga names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
