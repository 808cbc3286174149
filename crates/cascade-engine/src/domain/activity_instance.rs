//! Activity-instance tree view of a process instance

use crate::domain::execution::{AsyncPosition, ExecutionTree};
use crate::domain::ids::{ActivityId, ActivityInstanceId, ExecutionId};
use crate::domain::layout::{LayoutNode, NodeState};
use crate::EngineError;
use serde::{Deserialize, Serialize};

/// An instance of an activity; the root instance is the process instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInstance {
    /// Activity instance id
    pub id: ActivityInstanceId,
    /// Instantiated activity
    pub activity_id: ActivityId,
    /// Parent activity instance, `None` for the process instance
    pub parent_activity_instance_id: Option<ActivityInstanceId>,
    /// Executions that represent this instance
    pub execution_ids: Vec<ExecutionId>,
    /// Child activity instances
    pub child_activity_instances: Vec<ActivityInstance>,
    /// Child transition instances
    pub child_transition_instances: Vec<TransitionInstance>,
}

/// A token waiting at an asynchronous continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInstance {
    /// Transition instance id
    pub id: ActivityInstanceId,
    /// Activity the token waits before or after
    pub activity_id: ActivityId,
    /// Enclosing activity instance
    pub parent_activity_instance_id: ActivityInstanceId,
    /// Execution holding the token
    pub execution_id: ExecutionId,
    /// Before or after the activity
    pub position: AsyncPosition,
}

impl ActivityInstance {
    /// Derive the activity-instance tree from an execution tree
    pub fn from_tree(tree: &ExecutionTree) -> Result<Self, EngineError> {
        let layout = LayoutNode::from_tree(tree)?;
        Ok(Self::from_layout(&layout, None))
    }

    fn from_layout(node: &LayoutNode, parent: Option<&ActivityInstanceId>) -> Self {
        let mut instance = ActivityInstance {
            id: node.instance_id.clone(),
            activity_id: node.activity_id.clone(),
            parent_activity_instance_id: parent.cloned(),
            execution_ids: node.hints.representative.iter().cloned().collect(),
            child_activity_instances: Vec::new(),
            child_transition_instances: Vec::new(),
        };
        for child in &node.children {
            match &child.state {
                NodeState::Transition(transition) => {
                    if let Some(execution_id) = child.hints.representative.clone() {
                        instance.child_transition_instances.push(TransitionInstance {
                            id: child.instance_id.clone(),
                            activity_id: child.activity_id.clone(),
                            parent_activity_instance_id: node.instance_id.clone(),
                            execution_id,
                            position: transition.position,
                        })
                    }
                }
                _ => instance
                    .child_activity_instances
                    .push(Self::from_layout(child, Some(&node.instance_id))),
            }
        }
        instance
    }

    /// All activity instances of an activity, in pre-order
    pub fn activity_instances(&self, activity_id: &str) -> Vec<&ActivityInstance> {
        let mut out = Vec::new();
        if self.activity_id == *activity_id {
            out.push(self);
        }
        for child in &self.child_activity_instances {
            out.extend(child.activity_instances(activity_id));
        }
        out
    }

    /// All transition instances of an activity, in pre-order
    pub fn transition_instances(&self, activity_id: &str) -> Vec<&TransitionInstance> {
        let mut out: Vec<&TransitionInstance> = self
            .child_transition_instances
            .iter()
            .filter(|t| t.activity_id == *activity_id)
            .collect();
        for child in &self.child_activity_instances {
            out.extend(child.transition_instances(activity_id));
        }
        out
    }

    /// Find an activity instance by id
    pub fn find(&self, id: &str) -> Option<&ActivityInstance> {
        if self.id == *id {
            return Some(self);
        }
        self.child_activity_instances
            .iter()
            .find_map(|child| child.find(id))
    }
}
