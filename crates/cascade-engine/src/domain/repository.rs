//! Repository traits for the Cascade engine
//!
//! External crates implement these traits to provide persistence. Saves of
//! process instances are optimistic: the stored revision must equal the revision
//! the caller loaded, otherwise the save fails with
//! [`EngineError::OptimisticLockConflict`].

use async_trait::async_trait;
use std::sync::Arc;

use super::ids::{JobId, ProcessDefinitionId, ProcessInstanceId, TaskId};
use super::process_definition::{EventType, ProcessDefinition};
use super::process_instance::ProcessInstance;
use crate::EngineError;

/// Repository for process instances
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// Find a process instance by ID
    async fn find_by_id(&self, id: &ProcessInstanceId)
        -> Result<Option<ProcessInstance>, EngineError>;

    /// Save a process instance, returning the new revision
    async fn save(&self, instance: &ProcessInstance) -> Result<u64, EngineError>;

    /// Save several instances atomically; nothing is written if any revision check fails
    async fn save_all(&self, instances: &[ProcessInstance]) -> Result<(), EngineError>;

    /// Delete a process instance
    async fn delete(&self, id: &ProcessInstanceId) -> Result<(), EngineError>;

    /// List instance ids, optionally restricted to one definition
    async fn list_instances(
        &self,
        process_definition_id: Option<&ProcessDefinitionId>,
    ) -> Result<Vec<ProcessInstanceId>, EngineError>;

    /// Find the instance owning a task
    async fn find_by_task(&self, task_id: &TaskId) -> Result<Option<ProcessInstance>, EngineError>;

    /// Find the instance owning a job
    async fn find_by_job(&self, job_id: &JobId) -> Result<Option<ProcessInstance>, EngineError>;

    /// Find instances holding a subscription for the event
    async fn find_by_subscription(
        &self,
        event_type: EventType,
        event_name: &str,
    ) -> Result<Vec<ProcessInstance>, EngineError>;
}

/// Repository for process definitions
#[async_trait]
pub trait ProcessDefinitionRepository: Send + Sync {
    /// Find a process definition by ID
    async fn find_by_id(
        &self,
        id: &ProcessDefinitionId,
    ) -> Result<Option<Arc<ProcessDefinition>>, EngineError>;

    /// Latest version deployed under a key
    async fn find_latest_by_key(
        &self,
        key: &str,
    ) -> Result<Option<Arc<ProcessDefinition>>, EngineError>;

    /// Save a process definition
    async fn save(&self, definition: ProcessDefinition)
        -> Result<Arc<ProcessDefinition>, EngineError>;

    /// List all process definitions
    async fn list_definitions(&self) -> Result<Vec<ProcessDefinitionId>, EngineError>;
}
