use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ExecutionId, IncidentId, JobId, ProcessDefinitionId,
    ProcessInstanceId,
};
use crate::DataPacket;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events in the engine
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the process instance this event is associated with
    fn process_instance_id(&self) -> &ProcessInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Event: process instance started
#[derive(Debug)]
pub struct ProcessInstanceStarted {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// The definition it was started from
    pub process_definition_id: ProcessDefinitionId,
    /// When the instance started
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceStarted {
    fn event_type(&self) -> &'static str {
        "process_instance.started"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: process instance ended
#[derive(Debug)]
pub struct ProcessInstanceEnded {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// When the instance ended
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceEnded {
    fn event_type(&self) -> &'static str {
        "process_instance.ended"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: process instance moved to another definition
#[derive(Debug)]
pub struct ProcessInstanceMigrated {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition before migration
    pub source_process_definition_id: ProcessDefinitionId,
    /// Definition after migration
    pub target_process_definition_id: ProcessDefinitionId,
    /// When the migration was committed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceMigrated {
    fn event_type(&self) -> &'static str {
        "process_instance.migrated"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: a scope instance was created by migration
#[derive(Debug)]
pub struct ScopeInstanceCreated {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Target scope activity
    pub activity_id: ActivityId,
    /// New activity instance
    pub activity_instance_id: ActivityInstanceId,
    /// When the scope emerged
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ScopeInstanceCreated {
    fn event_type(&self) -> &'static str {
        "migration.scope_created"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: a scope instance without counterpart was removed by migration
#[derive(Debug)]
pub struct ScopeInstanceRemoved {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Source scope activity
    pub activity_id: ActivityId,
    /// Removed activity instance
    pub activity_instance_id: ActivityInstanceId,
    /// When the scope was removed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ScopeInstanceRemoved {
    fn event_type(&self) -> &'static str {
        "migration.scope_removed"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: two variables of the same name landed on one execution; one value was dropped
#[derive(Debug)]
pub struct VariableOverwritten {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Execution both variables resolved to
    pub execution_id: ExecutionId,
    /// Variable name
    pub name: String,
    /// Value that was discarded
    pub discarded_value: DataPacket,
    /// Value that was kept
    pub kept_value: DataPacket,
    /// When the collision was resolved
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for VariableOverwritten {
    fn event_type(&self) -> &'static str {
        "variable.overwritten"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: incident raised for a job without retries
#[derive(Debug)]
pub struct IncidentCreated {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// The incident
    pub incident_id: IncidentId,
    /// The failed job
    pub job_id: JobId,
    /// Activity of the failed job
    pub activity_id: ActivityId,
    /// When the incident was raised
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for IncidentCreated {
    fn event_type(&self) -> &'static str {
        "incident.created"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
