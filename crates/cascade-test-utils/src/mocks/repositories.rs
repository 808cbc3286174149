//! Mock repository implementations.

use async_trait::async_trait;
use cascade_engine::domain::ids::{JobId, ProcessDefinitionId, ProcessInstanceId, TaskId};
use cascade_engine::domain::process_definition::EventType;
use cascade_engine::domain::process_instance::ProcessInstance;
use cascade_engine::domain::repository::ProcessInstanceRepository;
use cascade_engine::EngineError;
use mockall::mock;

mock! {
    /// Scriptable process instance repository
    pub InstanceRepository {}

    #[async_trait]
    impl ProcessInstanceRepository for InstanceRepository {
        async fn find_by_id(
            &self,
            id: &ProcessInstanceId,
        ) -> Result<Option<ProcessInstance>, EngineError>;

        async fn save(&self, instance: &ProcessInstance) -> Result<u64, EngineError>;

        async fn save_all(&self, instances: &[ProcessInstance]) -> Result<(), EngineError>;

        async fn delete(&self, id: &ProcessInstanceId) -> Result<(), EngineError>;

        async fn list_instances<'a, 'b>(
            &'a self,
            process_definition_id: Option<&'b ProcessDefinitionId>,
        ) -> Result<Vec<ProcessInstanceId>, EngineError>;

        async fn find_by_task(&self, task_id: &TaskId) -> Result<Option<ProcessInstance>, EngineError>;

        async fn find_by_job(&self, job_id: &JobId) -> Result<Option<ProcessInstance>, EngineError>;

        async fn find_by_subscription(
            &self,
            event_type: EventType,
            event_name: &str,
        ) -> Result<Vec<ProcessInstance>, EngineError>;
    }
}

/// Conflict error as the store reports it
pub fn optimistic_lock_conflict(instance: &ProcessInstance) -> EngineError {
    EngineError::OptimisticLockConflict {
        instance_id: instance.id.to_string(),
        expected: instance.revision,
        actual: instance.revision + 1,
    }
}
