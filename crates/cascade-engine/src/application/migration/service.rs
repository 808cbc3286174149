//! Batch execution of a migration plan

use crate::application::migration::executor;
use crate::application::migration::matcher;
use crate::application::migration::plan::MigrationPlan;
use crate::application::runtime_service::RuntimeService;
use crate::application::working_state::WorkingState;
use crate::domain::ids::ProcessInstanceId;
use crate::domain::process_definition::ProcessDefinition;
use crate::domain::process_instance::ProcessInstance;
use crate::EngineError;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a batch; instances fail independently unless the batch is all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationBatchResult {
    /// Instances now running on the target definition
    pub migrated: Vec<ProcessInstanceId>,
    /// Instances left untouched, with the reason
    pub failed: Vec<(ProcessInstanceId, EngineError)>,
}

impl MigrationBatchResult {
    /// Whether every instance migrated
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Error of a failed instance
    pub fn failure(&self, id: &ProcessInstanceId) -> Option<&EngineError> {
        self.failed
            .iter()
            .find(|(failed, _)| failed == id)
            .map(|(_, err)| err)
    }
}

/// Fluent configuration of a plan execution
pub struct MigrationPlanExecutionBuilder {
    runtime: RuntimeService,
    plan: MigrationPlan,
    process_instance_ids: Vec<ProcessInstanceId>,
    skip_custom_listeners: bool,
    skip_io_mappings: bool,
    all_or_nothing: bool,
}

impl MigrationPlanExecutionBuilder {
    pub(crate) fn new(runtime: RuntimeService, plan: MigrationPlan) -> Self {
        Self {
            runtime,
            plan,
            process_instance_ids: Vec::new(),
            skip_custom_listeners: false,
            skip_io_mappings: false,
            all_or_nothing: false,
        }
    }

    /// Instances to migrate
    pub fn process_instance_ids(
        mut self,
        ids: impl IntoIterator<Item = ProcessInstanceId>,
    ) -> Self {
        self.process_instance_ids.extend(ids);
        self
    }

    /// Do not invoke execution listeners of created and removed scopes
    pub fn skip_custom_listeners(mut self) -> Self {
        self.skip_custom_listeners = true;
        self
    }

    /// Do not apply input and output mappings of created and removed scopes
    pub fn skip_io_mappings(mut self) -> Self {
        self.skip_io_mappings = true;
        self
    }

    /// Migrate every instance or none
    pub fn all_or_nothing(mut self) -> Self {
        self.all_or_nothing = true;
        self
    }

    /// Run the migration
    #[instrument(skip(self), fields(plan_source = %self.plan.source_process_definition_id))]
    pub async fn execute(self) -> Result<MigrationBatchResult, EngineError> {
        if self.process_instance_ids.is_empty() {
            return Err(EngineError::BadUserRequest(
                "Process instance ids is empty".to_string(),
            ));
        }
        let target = self
            .runtime
            .definition(&self.plan.target_process_definition_id)
            .await?;
        info!(
            source = %self.plan.source_process_definition_id,
            target = %target.id,
            instances = self.process_instance_ids.len(),
            all_or_nothing = self.all_or_nothing,
            "Executing migration plan"
        );

        if self.all_or_nothing {
            self.execute_atomically(&target).await
        } else {
            Ok(self.execute_independently(&target).await)
        }
    }

    async fn execute_independently(&self, target: &Arc<ProcessDefinition>) -> MigrationBatchResult {
        let parallelism = self.runtime.config.migration_parallelism.max(1);
        let outcomes: Vec<(ProcessInstanceId, Result<(), EngineError>)> =
            stream::iter(self.process_instance_ids.iter().cloned())
                .map(|id| async move {
                    let outcome = self.migrate_with_retries(&id, target).await;
                    (id, outcome)
                })
                .buffer_unordered(parallelism)
                .collect()
                .await;

        let mut result = MigrationBatchResult::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => result.migrated.push(id),
                Err(err) => {
                    warn!(process_instance = %id, error = %err, "Process instance was not migrated");
                    result.failed.push((id, err));
                }
            }
        }
        result
    }

    async fn migrate_with_retries(
        &self,
        id: &ProcessInstanceId,
        target: &Arc<ProcessDefinition>,
    ) -> Result<(), EngineError> {
        let retries = self.runtime.config.optimistic_lock_retries;
        let mut attempt = 0;
        loop {
            let state = self.prepare(id, target).await?;
            match self.runtime.persist(state).await {
                Ok(instance) => {
                    debug!(process_instance = %id, revision = instance.revision, "Migrated process instance");
                    return Ok(());
                }
                Err(err) if err.is_optimistic_lock_conflict() && attempt < retries => {
                    attempt += 1;
                    debug!(process_instance = %id, attempt, "Concurrent modification, retrying migration");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_atomically(
        &self,
        target: &Arc<ProcessDefinition>,
    ) -> Result<MigrationBatchResult, EngineError> {
        let parallelism = self.runtime.config.migration_parallelism.max(1);
        let retries = self.runtime.config.optimistic_lock_retries;
        let mut attempt = 0;
        loop {
            let prepared: Vec<(ProcessInstanceId, Result<WorkingState, EngineError>)> =
                stream::iter(self.process_instance_ids.iter().cloned())
                    .map(|id| async move {
                        let state = self.prepare(&id, target).await;
                        (id, state)
                    })
                    .buffered(parallelism)
                    .collect()
                    .await;

            let mut instances: Vec<ProcessInstance> = Vec::with_capacity(prepared.len());
            let mut failed = Vec::new();
            let now = self.runtime.clock.now();
            for (id, state) in prepared {
                match state {
                    Ok(state) => instances.push(state.commit(now)),
                    Err(err) => failed.push((id, err)),
                }
            }
            if !failed.is_empty() {
                warn!(failed = failed.len(), "Batch rejected, no process instance was migrated");
                return Ok(MigrationBatchResult {
                    migrated: Vec::new(),
                    failed,
                });
            }

            match self.runtime.instances.save_all(&instances).await {
                Ok(()) => {
                    for instance in &mut instances {
                        self.runtime.dispatch(instance).await;
                    }
                    return Ok(MigrationBatchResult {
                        migrated: self.process_instance_ids.clone(),
                        failed: Vec::new(),
                    });
                }
                Err(err) if err.is_optimistic_lock_conflict() && attempt < retries => {
                    attempt += 1;
                    debug!(attempt, "Concurrent modification, retrying migration batch");
                }
                Err(err) => {
                    return Ok(MigrationBatchResult {
                        migrated: Vec::new(),
                        failed: self
                            .process_instance_ids
                            .iter()
                            .map(|id| (id.clone(), err.clone()))
                            .collect(),
                    });
                }
            }
        }
    }

    /// Load, match and transform one instance without saving it
    async fn prepare(
        &self,
        id: &ProcessInstanceId,
        target: &Arc<ProcessDefinition>,
    ) -> Result<WorkingState, EngineError> {
        let instance = self.runtime.process_instance(id).await?;
        let state = self.runtime.load(instance).await?;
        let migrating = matcher::match_instance(&state, &self.plan, target)?;

        let mut context = self.runtime.context();
        context.skip_custom_listeners = self.skip_custom_listeners;
        context.skip_io_mappings = self.skip_io_mappings;
        executor::migrate(state, &migrating, &self.plan, target.clone(), &context)
    }
}
