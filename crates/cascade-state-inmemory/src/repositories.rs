use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use async_trait::async_trait;

use cascade_engine::{
    domain::ids::{JobId, ProcessDefinitionId, ProcessInstanceId, TaskId},
    domain::process_definition::{EventType, ProcessDefinition},
    domain::process_instance::ProcessInstance,
    domain::repository::{ProcessDefinitionRepository, ProcessInstanceRepository},
    EngineError,
};

/// In-memory implementation of the ProcessInstanceRepository
///
/// The stored revision is bumped on every save. A save whose revision differs
/// from the stored one fails with an optimistic lock conflict.
pub struct InMemoryProcessInstanceRepository {
    instances: Arc<RwLock<HashMap<String, ProcessInstance>>>,
}

impl InMemoryProcessInstanceRepository {
    /// Create a new in-memory process instance repository
    pub fn new(instances: Arc<RwLock<HashMap<String, ProcessInstance>>>) -> Self {
        Self { instances }
    }
}

fn check_revision(
    instances: &HashMap<String, ProcessInstance>,
    instance: &ProcessInstance,
) -> Result<(), EngineError> {
    let actual = instances.get(instance.id.as_str()).map_or(0, |stored| stored.revision);
    if actual != instance.revision {
        warn!(
            process_instance = %instance.id,
            expected = instance.revision,
            actual,
            "Rejecting stale process instance"
        );
        return Err(EngineError::OptimisticLockConflict {
            instance_id: instance.id.to_string(),
            expected: instance.revision,
            actual,
        });
    }
    Ok(())
}

fn store(instances: &mut HashMap<String, ProcessInstance>, instance: &ProcessInstance) -> u64 {
    let mut stored = instance.clone();
    stored.revision = instance.revision + 1;
    let revision = stored.revision;
    instances.insert(instance.id.to_string(), stored);
    revision
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryProcessInstanceRepository {
    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, EngineError> {
        let instances = self.instances.read().await;
        Ok(instances.get(id.as_str()).cloned())
    }

    async fn save(&self, instance: &ProcessInstance) -> Result<u64, EngineError> {
        let mut instances = self.instances.write().await;
        check_revision(&instances, instance)?;
        let revision = store(&mut instances, instance);
        debug!(process_instance = %instance.id, revision, "Saved process instance");
        Ok(revision)
    }

    async fn save_all(&self, instances: &[ProcessInstance]) -> Result<(), EngineError> {
        let mut stored = self.instances.write().await;
        for instance in instances {
            check_revision(&stored, instance)?;
        }
        for instance in instances {
            store(&mut stored, instance);
        }
        debug!(count = instances.len(), "Saved process instances");
        Ok(())
    }

    async fn delete(&self, id: &ProcessInstanceId) -> Result<(), EngineError> {
        let mut instances = self.instances.write().await;
        instances.remove(id.as_str());
        Ok(())
    }

    async fn list_instances(
        &self,
        process_definition_id: Option<&ProcessDefinitionId>,
    ) -> Result<Vec<ProcessInstanceId>, EngineError> {
        let instances = self.instances.read().await;
        let mut ids: Vec<ProcessInstanceId> = instances
            .values()
            .filter(|instance| {
                process_definition_id.map_or(true, |id| instance.process_definition_id == *id)
            })
            .map(|instance| instance.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_by_task(&self, task_id: &TaskId) -> Result<Option<ProcessInstance>, EngineError> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|instance| instance.tasks.iter().any(|t| t.id == *task_id))
            .cloned())
    }

    async fn find_by_job(&self, job_id: &JobId) -> Result<Option<ProcessInstance>, EngineError> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|instance| instance.jobs.iter().any(|j| j.id == *job_id))
            .cloned())
    }

    async fn find_by_subscription(
        &self,
        event_type: EventType,
        event_name: &str,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        let instances = self.instances.read().await;
        let mut matching: Vec<ProcessInstance> = instances
            .values()
            .filter(|instance| {
                instance
                    .event_subscriptions
                    .iter()
                    .any(|s| s.event_type == event_type && s.event_name == event_name)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}

/// In-memory implementation of the ProcessDefinitionRepository
pub struct InMemoryProcessDefinitionRepository {
    definitions: Arc<RwLock<HashMap<String, Arc<ProcessDefinition>>>>,
}

impl InMemoryProcessDefinitionRepository {
    /// Create a new in-memory process definition repository
    pub fn new(definitions: Arc<RwLock<HashMap<String, Arc<ProcessDefinition>>>>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl ProcessDefinitionRepository for InMemoryProcessDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &ProcessDefinitionId,
    ) -> Result<Option<Arc<ProcessDefinition>>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(id.as_str()).cloned())
    }

    async fn find_latest_by_key(
        &self,
        key: &str,
    ) -> Result<Option<Arc<ProcessDefinition>>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .values()
            .filter(|definition| definition.key == key)
            .max_by_key(|definition| definition.version)
            .cloned())
    }

    async fn save(
        &self,
        definition: ProcessDefinition,
    ) -> Result<Arc<ProcessDefinition>, EngineError> {
        let mut definitions = self.definitions.write().await;
        let definition = Arc::new(definition);
        definitions.insert(definition.id.to_string(), definition.clone());
        debug!(definition = %definition.id, "Saved process definition");
        Ok(definition)
    }

    async fn list_definitions(&self) -> Result<Vec<ProcessDefinitionId>, EngineError> {
        let definitions = self.definitions.read().await;
        let mut ids: Vec<ProcessDefinitionId> =
            definitions.values().map(|definition| definition.id.clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
