use crate::domain::activity_instance::ActivityInstance;
use crate::domain::event_subscription::EventSubscription;
use crate::domain::events::DomainEvent;
use crate::domain::execution::ExecutionTree;
use crate::domain::ids::{ExecutionId, ProcessDefinitionId, ProcessInstanceId};
use crate::domain::job::{Incident, Job};
use crate::domain::task::Task;
use crate::domain::variable::VariableInstance;
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessInstanceStatus {
    /// At least one token is alive
    Active,
    /// The root scope completed
    Ended,
}

/// Aggregate: process instance with its execution tree and dependent state
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Unique identifier, equal to the root execution id
    pub id: ProcessInstanceId,

    /// Definition the instance currently runs against
    pub process_definition_id: ProcessDefinitionId,

    /// Business key
    pub business_key: Option<String>,

    /// Current status
    pub status: ProcessInstanceStatus,

    /// Revision used for optimistic locking; bumped by the store on every save
    pub revision: u64,

    /// Execution tree
    pub executions: ExecutionTree,

    /// Open user tasks
    pub tasks: Vec<Task>,

    /// Variables
    pub variables: Vec<VariableInstance>,

    /// Message, signal and conditional subscriptions
    pub event_subscriptions: Vec<EventSubscription>,

    /// Timer and async continuation jobs
    pub jobs: Vec<Job>,

    /// Open incidents
    pub incidents: Vec<Incident>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

impl Clone for ProcessInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            process_definition_id: self.process_definition_id.clone(),
            business_key: self.business_key.clone(),
            status: self.status,
            revision: self.revision,
            executions: self.executions.clone(),
            tasks: self.tasks.clone(),
            variables: self.variables.clone(),
            event_subscriptions: self.event_subscriptions.clone(),
            jobs: self.jobs.clone(),
            incidents: self.incidents.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(),
        }
    }
}

impl ProcessInstance {
    /// Create an empty instance; the interpreter populates the tree
    pub fn new(
        process_definition_id: ProcessDefinitionId,
        business_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProcessInstanceId::generate(),
            process_definition_id,
            business_key,
            status: ProcessInstanceStatus::Active,
            revision: 0,
            executions: ExecutionTree::default(),
            tasks: Vec::new(),
            variables: Vec::new(),
            event_subscriptions: Vec::new(),
            jobs: Vec::new(),
            incidents: Vec::new(),
            created_at: now,
            updated_at: now,
            events: Vec::with_capacity(4),
        }
    }

    /// Whether the root scope has completed
    pub fn is_ended(&self) -> bool {
        self.status == ProcessInstanceStatus::Ended
    }

    /// Activity-instance tree derived from the execution tree
    pub fn activity_instance_tree(&self) -> Result<ActivityInstance, EngineError> {
        if self.is_ended() {
            return Err(EngineError::BadUserRequest(format!(
                "Process instance '{}' has ended",
                self.id
            )));
        }
        ActivityInstance::from_tree(&self.executions)
    }

    /// Variable local to the process instance execution
    pub fn variable(&self, name: &str) -> Option<&VariableInstance> {
        self.variables
            .iter()
            .find(|v| v.name == name && v.execution_id == *self.id.as_str())
    }

    /// Variables local to an execution
    pub fn variables_on(&self, execution_id: &ExecutionId) -> Vec<&VariableInstance> {
        self.variables
            .iter()
            .filter(|v| v.execution_id == *execution_id)
            .collect()
    }

    /// Open tasks of a user task activity
    pub fn tasks_at(&self, activity_id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.task_definition_key == *activity_id)
            .collect()
    }

    /// Jobs of an activity
    pub fn jobs_at(&self, activity_id: &str) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|j| j.activity_id == *activity_id)
            .collect()
    }

    /// Subscriptions of an activity
    pub fn subscriptions_at(&self, activity_id: &str) -> Vec<&EventSubscription> {
        self.event_subscriptions
            .iter()
            .filter(|s| s.activity_id == *activity_id)
            .collect()
    }

    /// Record a domain event
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}
