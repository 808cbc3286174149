use crate::domain::ids::{
    ActivityId, EventSubscriptionId, ExecutionId, ProcessDefinitionId, ProcessInstanceId,
};
use crate::domain::process_definition::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration of an execution for a message, signal or conditional event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubscription {
    /// Subscription id, stable across migration
    pub id: EventSubscriptionId,
    /// Event type; never `Timer`
    pub event_type: EventType,
    /// Message/signal name or condition
    pub event_name: String,
    /// Catching activity that reacts to the event
    pub activity_id: ActivityId,
    /// Execution the subscription lives on
    pub execution_id: ExecutionId,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition of the catching activity
    pub process_definition_id: ProcessDefinitionId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}
