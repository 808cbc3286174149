//! In-memory state store implementation for the Cascade Platform
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the cascade-engine crate. It is primarily useful for
//! development, testing, and simple deployments where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use cascade_engine::{
    domain::process_definition::ProcessDefinition,
    domain::process_instance::ProcessInstance,
    domain::repository::{ProcessDefinitionRepository, ProcessInstanceRepository},
};

pub mod repositories;
pub use repositories::{InMemoryProcessDefinitionRepository, InMemoryProcessInstanceRepository};

/// Provider for in-memory state store repositories
#[derive(Default)]
pub struct InMemoryStateStoreProvider {
    // Shared storage for process instances
    instances: Arc<RwLock<HashMap<String, ProcessInstance>>>,

    // Shared storage for process definitions
    definitions: Arc<RwLock<HashMap<String, Arc<ProcessDefinition>>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repositories for use with the RuntimeService
    ///
    /// Repositories created by the same provider share their storage.
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn ProcessInstanceRepository>,
        Arc<dyn ProcessDefinitionRepository>,
    ) {
        let instance_repo = Arc::new(InMemoryProcessInstanceRepository::new(
            self.instances.clone(),
        ));
        let definition_repo = Arc::new(InMemoryProcessDefinitionRepository::new(
            self.definitions.clone(),
        ));
        (instance_repo, definition_repo)
    }
}

#[cfg(test)]
mod tests;
