//! TestEngine builder and handle for integration testing.

use crate::logging::init_test_logging;
use crate::mocks::event_handler::RecordingEventHandler;
use crate::mocks::listeners::RecordingListener;
use cascade_engine::domain::ids::{JobId, ProcessInstanceId, TaskId};
use cascade_engine::{
    ActivityInstance, DataPacket, DelegateRegistry, EngineConfig, EngineError,
    ExecutionListener, MigrationBatchResult, MigrationPlan, MigrationPlanBuilder, MockClock, ProcessDefinition,
    ProcessDefinitionBuilder, ProcessDefinitionRepository, ProcessInstance,
    ProcessInstanceRepository, RuntimeService, ServiceDelegate,
};
use cascade_state_inmemory::InMemoryStateStoreProvider;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Name under which the recording listener is registered
pub const RECORDING_LISTENER: &str = "recorder";

/// Builder for a [`TestEngine`]
pub struct TestEngineBuilder {
    config: EngineConfig,
    delegates: DelegateRegistry,
    instances: Option<Arc<dyn ProcessInstanceRepository>>,
    events: Option<RecordingEventHandler>,
}

impl fmt::Debug for TestEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestEngineBuilder")
            .field("config", &self.config)
            .field("delegates", &self.delegates)
            .field("custom_instances", &self.instances.is_some())
            .finish()
    }
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngineBuilder {
    /// Builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            delegates: DelegateRegistry::new(),
            instances: None,
            events: None,
        }
    }

    /// Use a specific engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a service delegate
    pub fn with_service(mut self, name: &str, delegate: Arc<dyn ServiceDelegate>) -> Self {
        self.delegates = self.delegates.with_service(name, delegate);
        self
    }

    /// Register an execution listener next to the recorder
    pub fn with_listener(mut self, name: &str, listener: Arc<dyn ExecutionListener>) -> Self {
        self.delegates = self.delegates.with_listener(name, listener);
        self
    }

    /// Replace the in-memory instance store, e.g. with a mock
    pub fn with_instance_repository(mut self, instances: Arc<dyn ProcessInstanceRepository>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Dispatch events to a specific recorder, e.g. one that rejects some events
    pub fn with_event_handler(mut self, events: RecordingEventHandler) -> Self {
        self.events = Some(events);
        self
    }

    /// Wire up the engine
    pub fn build(self) -> TestEngine {
        init_test_logging();

        let (default_instances, definitions) = InMemoryStateStoreProvider::new().create_repositories();
        let instances = self.instances.unwrap_or(default_instances);
        let listener = Arc::new(RecordingListener::new());
        let events = Arc::new(self.events.unwrap_or_default());
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        ));
        let delegates = self
            .delegates
            .with_listener(RECORDING_LISTENER, listener.clone());

        let runtime = RuntimeService::new(
            instances.clone(),
            definitions.clone(),
            Arc::new(delegates),
            clock.clone(),
            events.clone(),
            self.config,
        );

        TestEngine {
            runtime,
            instances,
            definitions,
            clock,
            listener,
            events,
            next_version: AtomicU32::new(1),
        }
    }
}

/// Running engine with handles on its collaborators
pub struct TestEngine {
    /// Service under test
    pub runtime: RuntimeService,
    /// Instance store the runtime saves to
    pub instances: Arc<dyn ProcessInstanceRepository>,
    /// Definition store
    pub definitions: Arc<dyn ProcessDefinitionRepository>,
    /// Clock driving timers and timestamps
    pub clock: Arc<MockClock>,
    /// Listener registered as [`RECORDING_LISTENER`]
    pub listener: Arc<RecordingListener>,
    /// Every dispatched domain event
    pub events: Arc<RecordingEventHandler>,
    next_version: AtomicU32,
}

impl fmt::Debug for TestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestEngine")
            .field("clock", &self.clock)
            .field("next_version", &self.next_version)
            .finish()
    }
}

impl TestEngine {
    /// Engine with default configuration
    pub fn new() -> Self {
        TestEngineBuilder::new().build()
    }

    /// Start configuring an engine
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::new()
    }

    /// Deploy a model as the next version of its key
    pub async fn deploy(&self, model: ProcessDefinitionBuilder) -> Arc<ProcessDefinition> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let definition = model.version(version).build().expect("fixture model is valid");
        self.runtime.deploy(definition).await.expect("deploy succeeds")
    }

    /// Start an instance without variables
    pub async fn start(&self, definition: &ProcessDefinition) -> ProcessInstance {
        self.start_with(definition, HashMap::new()).await
    }

    /// Start an instance with variables
    pub async fn start_with(
        &self,
        definition: &ProcessDefinition,
        variables: HashMap<String, DataPacket>,
    ) -> ProcessInstance {
        self.runtime
            .start_process_instance_by_id(&definition.id, variables)
            .await
            .expect("process instance starts")
    }

    /// Reload an instance from the store
    pub async fn instance(&self, id: &ProcessInstanceId) -> ProcessInstance {
        self.runtime
            .process_instance(id)
            .await
            .expect("process instance exists")
    }

    /// Activity-instance tree of an instance
    pub async fn tree(&self, id: &ProcessInstanceId) -> ActivityInstance {
        self.runtime
            .activity_instance_tree(id)
            .await
            .expect("activity instance tree")
    }

    /// Id of the single open task at an activity
    pub async fn task_at(&self, id: &ProcessInstanceId, activity_id: &str) -> TaskId {
        let instance = self.instance(id).await;
        let tasks = instance.tasks_at(activity_id);
        assert_eq!(tasks.len(), 1, "expected one task at '{}'", activity_id);
        tasks[0].id.clone()
    }

    /// Complete the single open task at an activity
    pub async fn complete_task_at(&self, id: &ProcessInstanceId, activity_id: &str) {
        let task = self.task_at(id, activity_id).await;
        self.runtime
            .complete_task(&task, HashMap::new())
            .await
            .expect("task completes");
    }

    /// Id of the single job at an activity
    pub async fn job_at(&self, id: &ProcessInstanceId, activity_id: &str) -> JobId {
        let instance = self.instance(id).await;
        let jobs = instance.jobs_at(activity_id);
        assert_eq!(jobs.len(), 1, "expected one job at '{}'", activity_id);
        jobs[0].id.clone()
    }

    /// Execute the single job at an activity
    pub async fn execute_job_at(
        &self,
        id: &ProcessInstanceId,
        activity_id: &str,
    ) -> Result<(), EngineError> {
        let job = self.job_at(id, activity_id).await;
        self.runtime.execute_job(&job).await
    }

    /// Build a plan between two definitions
    pub async fn plan(
        &self,
        source: &ProcessDefinition,
        target: &ProcessDefinition,
        configure: impl FnOnce(MigrationPlanBuilder) -> MigrationPlanBuilder,
    ) -> Result<MigrationPlan, EngineError> {
        let builder = self
            .runtime
            .create_migration_plan(&source.id, &target.id)
            .await?;
        configure(builder).build()
    }

    /// Migrate instances one by one
    pub async fn migrate(
        &self,
        plan: MigrationPlan,
        ids: Vec<ProcessInstanceId>,
    ) -> Result<MigrationBatchResult, EngineError> {
        self.runtime
            .new_migration(plan)
            .process_instance_ids(ids)
            .execute()
            .await
    }

    /// Migrate one instance, returning its reloaded state
    pub async fn migrate_one(
        &self,
        plan: MigrationPlan,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, EngineError> {
        self.runtime
            .execute_migration_plan(plan, vec![id.clone()])
            .await?;
        self.runtime.process_instance(id).await
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
