//! Runtime service: the engine's entry points for running and migrating instances
//!
//! Every operation follows the same cycle: load the instance, build a
//! [`WorkingState`], run the interpreter or migration on it, commit, save with
//! an optimistic revision check and dispatch the recorded domain events.

use crate::application::delegates::DelegateRegistry;
use crate::application::interpreter::Interpreter;
use crate::application::migration::plan::{MigrationPlan, MigrationPlanBuilder};
use crate::application::migration::service::MigrationPlanExecutionBuilder;
use crate::application::working_state::{ExecutionContext, Owner, WorkingState};
use crate::config::EngineConfig;
use crate::domain::activity_instance::ActivityInstance;
use crate::domain::clock::Clock;
use crate::domain::events::DomainEvent;
use crate::domain::ids::{
    EventSubscriptionId, ExecutionId, JobId, ProcessDefinitionId, ProcessInstanceId, TaskId,
};
use crate::domain::process_definition::{EventType, ProcessDefinition};
use crate::domain::process_instance::ProcessInstance;
use crate::domain::repository::{ProcessDefinitionRepository, ProcessInstanceRepository};
use crate::{DataPacket, EngineError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Handler for domain events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), EngineError>;
}

/// Event handler that only logs
#[derive(Debug, Default, Clone)]
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), EngineError> {
        info!(
            event_type = event.event_type(),
            process_instance = %event.process_instance_id(),
            "Domain event"
        );
        Ok(())
    }
}

/// Service for running process instances
#[derive(Clone)]
pub struct RuntimeService {
    pub(crate) instances: Arc<dyn ProcessInstanceRepository>,
    pub(crate) definitions: Arc<dyn ProcessDefinitionRepository>,
    pub(crate) delegates: Arc<DelegateRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) event_handler: Arc<dyn DomainEventHandler>,
    pub(crate) config: EngineConfig,
}

impl RuntimeService {
    /// Create a new runtime service
    pub fn new(
        instances: Arc<dyn ProcessInstanceRepository>,
        definitions: Arc<dyn ProcessDefinitionRepository>,
        delegates: Arc<DelegateRegistry>,
        clock: Arc<dyn Clock>,
        event_handler: Arc<dyn DomainEventHandler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            instances,
            definitions,
            delegates,
            clock,
            event_handler,
            config,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Deploy a process definition
    pub async fn deploy(
        &self,
        definition: ProcessDefinition,
    ) -> Result<Arc<ProcessDefinition>, EngineError> {
        info!(definition = %definition.id, key = %definition.key, version = definition.version, "Deploying process definition");
        self.definitions.save(definition).await
    }

    /// Start an instance of a definition at its none start event
    #[instrument(skip_all, fields(definition = %definition_id))]
    pub async fn start_process_instance_by_id(
        &self,
        definition_id: &ProcessDefinitionId,
        variables: HashMap<String, DataPacket>,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self.definition(definition_id).await?;
        self.start(definition, None, variables).await
    }

    /// Start an instance of a definition under a business key
    pub async fn start_process_instance_with_business_key(
        &self,
        definition_id: &ProcessDefinitionId,
        business_key: impl Into<String>,
        variables: HashMap<String, DataPacket>,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self.definition(definition_id).await?;
        self.start(definition, Some(business_key.into()), variables).await
    }

    /// Start an instance of the latest version deployed under a key
    pub async fn start_process_instance_by_key(
        &self,
        key: &str,
        variables: HashMap<String, DataPacket>,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self
            .definitions
            .find_latest_by_key(key)
            .await?
            .ok_or_else(|| EngineError::ProcessDefinitionNotFound(format!("key '{}'", key)))?;
        self.start(definition, None, variables).await
    }

    async fn start(
        &self,
        definition: Arc<ProcessDefinition>,
        business_key: Option<String>,
        variables: HashMap<String, DataPacket>,
    ) -> Result<ProcessInstance, EngineError> {
        let instance = ProcessInstance::new(definition.id.clone(), business_key, self.clock.now());
        debug!(process_instance = %instance.id, definition = %definition.id, "Starting process instance");
        let mut state = WorkingState::create(instance, definition);
        Interpreter::new(&mut state, &self.context()).start(variables)?;
        self.persist(state).await
    }

    /// Current state of a process instance
    pub async fn process_instance(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, EngineError> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::ProcessInstanceNotFound(id.to_string()))
    }

    /// Activity-instance tree of a running instance
    pub async fn activity_instance_tree(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ActivityInstance, EngineError> {
        self.process_instance(id).await?.activity_instance_tree()
    }

    /// Complete a user task
    #[instrument(skip_all, fields(task = %task_id))]
    pub async fn complete_task(
        &self,
        task_id: &TaskId,
        variables: HashMap<String, DataPacket>,
    ) -> Result<(), EngineError> {
        let instance = self
            .instances
            .find_by_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let mut state = self.load(instance).await?;
        Interpreter::new(&mut state, &self.context()).complete_task(task_id, variables)?;
        self.persist(state).await?;
        Ok(())
    }

    /// Deliver a message to the first instance waiting for it
    #[instrument(skip(self, variables))]
    pub async fn correlate_message(
        &self,
        name: &str,
        variables: HashMap<String, DataPacket>,
    ) -> Result<ProcessInstanceId, EngineError> {
        let instance = self
            .instances
            .find_by_subscription(EventType::Message, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoMatchingSubscription {
                event_type: EventType::Message.to_string(),
                name: name.to_string(),
            })?;
        let id = instance.id.clone();
        let subscription = subscriptions_for(&instance, EventType::Message, name)
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoMatchingSubscription {
                event_type: EventType::Message.to_string(),
                name: name.to_string(),
            })?;
        let mut state = self.load(instance).await?;
        Interpreter::new(&mut state, &self.context())
            .trigger_subscription(&subscription, variables)?;
        self.persist(state).await?;
        Ok(id)
    }

    /// Broadcast a signal; returns the instances that received it
    pub async fn signal_event_received(
        &self,
        name: &str,
        variables: HashMap<String, DataPacket>,
    ) -> Result<Vec<ProcessInstanceId>, EngineError> {
        self.broadcast(EventType::Signal, name, variables).await
    }

    /// Notify every instance waiting on a named condition that it became true
    pub async fn trigger_conditional_event(
        &self,
        name: &str,
        variables: HashMap<String, DataPacket>,
    ) -> Result<Vec<ProcessInstanceId>, EngineError> {
        self.broadcast(EventType::Conditional, name, variables).await
    }

    async fn broadcast(
        &self,
        event_type: EventType,
        name: &str,
        variables: HashMap<String, DataPacket>,
    ) -> Result<Vec<ProcessInstanceId>, EngineError> {
        let mut delivered = Vec::new();
        for instance in self.instances.find_by_subscription(event_type, name).await? {
            let id = instance.id.clone();
            let subscriptions = subscriptions_for(&instance, event_type, name);
            let mut state = self.load(instance).await?;
            let context = self.context();
            for subscription in subscriptions {
                if state.instance.is_ended()
                    || !state.subscriptions.iter().any(|s| s.item.id == subscription)
                {
                    continue;
                }
                Interpreter::new(&mut state, &context)
                    .trigger_subscription(&subscription, variables.clone())?;
            }
            self.persist(state).await?;
            delivered.push(id);
        }
        if delivered.is_empty() {
            debug!(%event_type, name, "No instance waits for the event");
        }
        Ok(delivered)
    }

    /// Execute a job
    ///
    /// When a delegate or listener fails, all effects of the attempt are
    /// discarded, the job loses one retry and records the failure. A job out of
    /// retries raises a `failedJob` incident. The failure is returned.
    #[instrument(skip_all, fields(job = %job_id))]
    pub async fn execute_job(&self, job_id: &JobId) -> Result<(), EngineError> {
        let instance = self
            .instances
            .find_by_job(job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        let original = instance.clone();
        let mut state = self.load(instance).await?;
        let outcome = Interpreter::new(&mut state, &self.context()).execute_job(job_id);
        match outcome {
            Ok(()) => {
                self.persist(state).await?;
                Ok(())
            }
            Err(
                err @ (EngineError::DelegateFailed { .. } | EngineError::ListenerFailed { .. }),
            ) => {
                warn!(job = %job_id, error = %err, "Job execution failed");
                let mut state = self.load(original).await?;
                state.fail_job(job_id, &err.to_string(), self.clock.now())?;
                self.persist(state).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Set a variable on the process instance
    pub async fn set_variable(
        &self,
        process_instance_id: &ProcessInstanceId,
        name: &str,
        value: DataPacket,
    ) -> Result<(), EngineError> {
        let instance = self.process_instance(process_instance_id).await?;
        let mut state = self.load(instance).await?;
        let root = state.root.instance_id.clone();
        state.set_variable_from(&root, name, value);
        self.persist(state).await?;
        Ok(())
    }

    /// Set a variable local to an execution
    pub async fn set_variable_local(
        &self,
        process_instance_id: &ProcessInstanceId,
        execution_id: &ExecutionId,
        name: &str,
        value: DataPacket,
    ) -> Result<(), EngineError> {
        let instance = self.process_instance(process_instance_id).await?;
        let mut state = self.load(instance).await?;
        let owner: Owner = state.owner_of_execution(execution_id)?;
        state.set_local_variable(owner, name, value);
        self.persist(state).await?;
        Ok(())
    }

    /// Start a migration plan between two deployed definitions
    pub async fn create_migration_plan(
        &self,
        source: &ProcessDefinitionId,
        target: &ProcessDefinitionId,
    ) -> Result<MigrationPlanBuilder, EngineError> {
        let source_definition = self.definitions.find_by_id(source).await?.ok_or_else(|| {
            EngineError::BadUserRequest(format!(
                "Source process definition with id '{}' does not exist",
                source
            ))
        })?;
        let target_definition = self.definitions.find_by_id(target).await?.ok_or_else(|| {
            EngineError::BadUserRequest(format!(
                "Target process definition with id '{}' does not exist",
                target
            ))
        })?;
        Ok(MigrationPlanBuilder::new(source_definition, target_definition))
    }

    /// Configure the execution of a plan
    pub fn new_migration(&self, plan: MigrationPlan) -> MigrationPlanExecutionBuilder {
        MigrationPlanExecutionBuilder::new(self.clone(), plan)
    }

    /// Migrate instances all-or-nothing, failing with the first instance error
    pub async fn execute_migration_plan(
        &self,
        plan: MigrationPlan,
        process_instance_ids: Vec<ProcessInstanceId>,
    ) -> Result<(), EngineError> {
        let result = self
            .new_migration(plan)
            .process_instance_ids(process_instance_ids)
            .all_or_nothing()
            .execute()
            .await?;
        match result.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext::new(&self.delegates, self.clock.as_ref(), &self.config)
    }

    pub(crate) async fn definition(
        &self,
        id: &ProcessDefinitionId,
    ) -> Result<Arc<ProcessDefinition>, EngineError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::ProcessDefinitionNotFound(id.to_string()))
    }

    pub(crate) async fn load(&self, instance: ProcessInstance) -> Result<WorkingState, EngineError> {
        let definition = self.definition(&instance.process_definition_id).await?;
        WorkingState::load(instance, definition)
    }

    /// Commit, save and dispatch events
    pub(crate) async fn persist(&self, state: WorkingState) -> Result<ProcessInstance, EngineError> {
        let mut instance = state.commit(self.clock.now());
        instance.revision = self.instances.save(&instance).await?;
        self.dispatch(&mut instance).await;
        Ok(instance)
    }

    /// Hand recorded events to the handler; the state is already saved, so failures are only logged
    pub(crate) async fn dispatch(&self, instance: &mut ProcessInstance) {
        for event in instance.take_events() {
            let event_type = event.event_type();
            if let Err(err) = self.event_handler.handle_event(event).await {
                warn!(
                    process_instance = %instance.id,
                    event_type,
                    error = %err,
                    "Event handler failed after save"
                );
            }
        }
    }
}

fn subscriptions_for(
    instance: &ProcessInstance,
    event_type: EventType,
    name: &str,
) -> Vec<EventSubscriptionId> {
    instance
        .event_subscriptions
        .iter()
        .filter(|s| s.event_type == event_type && s.event_name == name)
        .map(|s| s.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::MockClock;
    use crate::domain::process_definition::ProcessDefinitionBuilder;
    use chrono::{TimeZone, Utc};
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Definitions {}

        #[async_trait]
        impl ProcessDefinitionRepository for Definitions {
            async fn find_by_id(
                &self,
                id: &ProcessDefinitionId,
            ) -> Result<Option<Arc<ProcessDefinition>>, EngineError>;
            async fn find_latest_by_key(
                &self,
                key: &str,
            ) -> Result<Option<Arc<ProcessDefinition>>, EngineError>;
            async fn save(&self, definition: ProcessDefinition)
                -> Result<Arc<ProcessDefinition>, EngineError>;
            async fn list_definitions(&self) -> Result<Vec<ProcessDefinitionId>, EngineError>;
        }
    }

    mock! {
        Instances {}

        #[async_trait]
        impl ProcessInstanceRepository for Instances {
            async fn find_by_id(&self, id: &ProcessInstanceId)
                -> Result<Option<ProcessInstance>, EngineError>;
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

    struct RejectingHandler;

    #[async_trait]
    impl DomainEventHandler for RejectingHandler {
        async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), EngineError> {
            Err(EngineError::Other(format!("rejected {}", event.event_type())))
        }
    }

    fn one_task_definition() -> Arc<ProcessDefinition> {
        Arc::new(
            ProcessDefinitionBuilder::new("order")
                .start_event("start")
                .user_task("review")
                .end_event("end")
                .build()
                .unwrap(),
        )
    }

    fn service(
        instances: MockInstances,
        definitions: MockDefinitions,
        handler: Arc<dyn DomainEventHandler>,
    ) -> RuntimeService {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        RuntimeService::new(
            Arc::new(instances),
            Arc::new(definitions),
            Arc::new(DelegateRegistry::new()),
            Arc::new(clock),
            handler,
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_plan_for_unknown_source_is_a_bad_request() {
        let mut definitions = MockDefinitions::new();
        definitions
            .expect_find_by_id()
            .with(eq(ProcessDefinitionId::new("missing")))
            .returning(|_| Ok(None));
        let runtime = service(MockInstances::new(), definitions, Arc::new(LoggingEventHandler));

        let err = runtime
            .create_migration_plan(
                &ProcessDefinitionId::new("missing"),
                &ProcessDefinitionId::new("other"),
            )
            .await
            .err()
            .unwrap();

        assert_eq!(
            err,
            EngineError::BadUserRequest(
                "Source process definition with id 'missing' does not exist".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_plan_for_unknown_target_is_a_bad_request() {
        let definition = one_task_definition();
        let source_id = definition.id.clone();
        let known = source_id.clone();
        let mut definitions = MockDefinitions::new();
        definitions.expect_find_by_id().returning(move |id| {
            Ok((*id == known).then(|| definition.clone()))
        });
        let runtime = service(MockInstances::new(), definitions, Arc::new(LoggingEventHandler));

        let err = runtime
            .create_migration_plan(&source_id, &ProcessDefinitionId::new("gone"))
            .await
            .err()
            .unwrap();

        assert_eq!(
            err,
            EngineError::BadUserRequest(
                "Target process definition with id 'gone' does not exist".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_missing_instance_is_reported() {
        let mut instances = MockInstances::new();
        instances.expect_find_by_id().returning(|_| Ok(None));
        let runtime = service(instances, MockDefinitions::new(), Arc::new(LoggingEventHandler));

        let err = runtime
            .process_instance(&ProcessInstanceId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::ProcessInstanceNotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_event_handler_failure_does_not_fail_saved_start() {
        let definition = one_task_definition();
        let id = definition.id.clone();
        let mut definitions = MockDefinitions::new();
        definitions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(definition.clone())));
        let mut instances = MockInstances::new();
        instances.expect_save().times(1).returning(|_| Ok(1));
        let runtime = service(instances, definitions, Arc::new(RejectingHandler));

        let instance = runtime
            .start_process_instance_by_id(&id, HashMap::new())
            .await
            .unwrap();
        assert_eq!(instance.revision, 1);
        assert_eq!(instance.tasks.len(), 1);
    }
}
