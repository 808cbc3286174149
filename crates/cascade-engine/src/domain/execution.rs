use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ExecutionId, ProcessDefinitionId, ProcessInstanceId,
};
use crate::EngineError;
use serde::{Deserialize, Serialize};

/// Side of an activity an asynchronous continuation waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsyncPosition {
    /// Before the activity starts
    Before,
    /// After the activity ended, before leaving it
    After,
}

/// Token parked at an asynchronous continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    /// Where the token waits
    pub position: AsyncPosition,
    /// Sequence flow the token arrived on (before) or will take (after)
    pub sequence_flow: Option<String>,
}

/// A node of the execution tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution id
    pub id: ExecutionId,
    /// Parent execution, `None` for the process instance execution
    pub parent_id: Option<ExecutionId>,
    /// Owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition the execution runs against
    pub process_definition_id: ProcessDefinitionId,
    /// Activity the execution currently executes, if any
    pub activity_id: Option<ActivityId>,
    /// Activity instance (or transition instance) of `activity_id`
    pub activity_instance_id: Option<ActivityInstanceId>,
    /// Scope activity this execution represents; set iff `is_scope`
    pub scope_activity_id: Option<ActivityId>,
    /// Activity instance of the scope; set iff `is_scope`
    pub scope_instance_id: Option<ActivityInstanceId>,
    /// Scope execution flag
    pub is_scope: bool,
    /// Concurrent child of a scope execution
    pub is_concurrent: bool,
    /// Whether the token can currently make progress
    pub is_active: bool,
    /// Set when the execution waits at an asynchronous continuation
    pub transition: Option<TransitionState>,
}

/// Arena of executions addressed by id
///
/// Children keep insertion order. The first execution is the process instance
/// execution; its id equals the process instance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionTree {
    executions: Vec<Execution>,
}

impl ExecutionTree {
    /// Build a tree from executions, root first
    pub fn from_executions(executions: Vec<Execution>) -> Self {
        Self { executions }
    }

    /// The process instance execution
    pub fn root(&self) -> Option<&Execution> {
        self.executions.iter().find(|e| e.parent_id.is_none())
    }

    /// All executions in arena order
    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    /// Number of executions
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Whether no execution remains
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Look up an execution
    pub fn get(&self, id: &str) -> Option<&Execution> {
        self.executions.iter().find(|e| e.id == *id)
    }

    /// Look up an execution, failing on unknown ids
    pub fn require(&self, id: &str) -> Result<&Execution, EngineError> {
        self.get(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))
    }

    /// Direct children in insertion order
    pub fn children(&self, id: &str) -> Vec<&Execution> {
        self.executions
            .iter()
            .filter(|e| e.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Executions currently positioned at an activity
    pub fn executions_at(&self, activity_id: &str) -> Vec<&Execution> {
        self.executions
            .iter()
            .filter(|e| e.activity_id.as_deref() == Some(activity_id))
            .collect()
    }

    /// Closest scope execution enclosing `id`, excluding `id` itself
    pub fn parent_scope(&self, id: &str) -> Option<&Execution> {
        let mut current = self.get(id)?.parent_id.as_deref();
        while let Some(parent_id) = current {
            let parent = self.get(parent_id)?;
            if parent.is_scope {
                return Some(parent);
            }
            current = parent.parent_id.as_deref();
        }
        None
    }

    /// The scope execution `id` belongs to; a scope execution belongs to itself
    pub fn scope_of(&self, id: &str) -> Option<&Execution> {
        let execution = self.get(id)?;
        if execution.is_scope {
            Some(execution)
        } else {
            self.parent_scope(id)
        }
    }
}
