use crate::domain::execution::AsyncPosition;
use crate::domain::ids::{
    ActivityId, ExecutionId, IncidentId, JobId, ProcessDefinitionId, ProcessInstanceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a job does when executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Fire a timer event
    Timer,
    /// Continue a token parked at an asynchronous continuation
    AsyncContinuation(AsyncPosition),
}

/// Unit of deferred work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job id, stable across migration
    pub id: JobId,
    /// Job kind
    pub kind: JobKind,
    /// Timer event or async activity the job belongs to
    pub activity_id: ActivityId,
    /// Execution the job acts on
    pub execution_id: ExecutionId,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition of `activity_id`
    pub process_definition_id: ProcessDefinitionId,
    /// Earliest execution time; only timers carry one
    pub due_date: Option<DateTime<Utc>>,
    /// Remaining attempts
    pub retries: u32,
    /// Scheduling priority
    pub priority: i64,
    /// Message of the last failure
    pub exception_message: Option<String>,
}

impl Job {
    /// Whether the job is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retries > 0 && self.due_date.map_or(true, |due| due <= now)
    }
}

/// Incident type raised when a job exhausted its retries
pub const FAILED_JOB_INCIDENT: &str = "failedJob";

/// An open problem attached to an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Incident id, stable across migration
    pub id: IncidentId,
    /// Incident type
    pub incident_type: String,
    /// Type-specific configuration; the job id for failed jobs
    pub configuration: String,
    /// Incident message
    pub message: Option<String>,
    /// Activity the incident occurred at
    pub activity_id: ActivityId,
    /// Execution the incident is attached to
    pub execution_id: ExecutionId,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition of `activity_id`
    pub process_definition_id: ProcessDefinitionId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Whether this incident reports a failure of the given job
    pub fn is_for_job(&self, job_id: &JobId) -> bool {
        self.incident_type == FAILED_JOB_INCIDENT && self.configuration == job_id.0
    }
}
