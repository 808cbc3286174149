use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ExecutionId, ProcessDefinitionId, ProcessInstanceId, TaskId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user task waiting for completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id, stable across migration
    pub id: TaskId,
    /// Display name copied from the activity
    pub name: Option<String>,
    /// User task activity
    pub task_definition_key: ActivityId,
    /// Activity instance the task belongs to
    pub activity_instance_id: ActivityInstanceId,
    /// Execution executing the task
    pub execution_id: ExecutionId,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition the task was created from
    pub process_definition_id: ProcessDefinitionId,
    /// Assignee
    pub assignee: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}
