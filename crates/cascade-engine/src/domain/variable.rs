use crate::domain::ids::{ActivityInstanceId, ExecutionId, ProcessInstanceId, VariableId};
use crate::DataPacket;
use serde::{Deserialize, Serialize};

/// A variable stored on an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInstance {
    /// Variable id, stable across migration
    pub id: VariableId,
    /// Variable name, unique per execution
    pub name: String,
    /// Value
    pub value: DataPacket,
    /// Execution the variable is local to
    pub execution_id: ExecutionId,
    /// Activity instance the owning execution belongs to
    pub activity_instance_id: ActivityInstanceId,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
}
