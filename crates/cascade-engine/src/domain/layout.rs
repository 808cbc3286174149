//! Logical activity-instance layout of a process instance
//!
//! The execution tree is a compacted encoding of the activity-instance tree: a
//! scope with a single non-scope activity carries that activity on its own scope
//! execution, and concurrency introduces intermediate concurrent executions. The
//! engine mutates the logical [`LayoutNode`] tree and derives executions from it
//! with [`materialize`], so compaction and expansion are never done by hand.

use crate::domain::execution::{Execution, ExecutionTree, TransitionState};
use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ExecutionId, ProcessDefinitionId, ProcessInstanceId,
};
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// State of a non-scope node or a scope leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Executing or waiting for an external trigger
    Active,
    /// Inactive token waiting at a joining gateway
    Waiting,
    /// Parked at an asynchronous continuation (transition instance)
    Transition(TransitionState),
}

/// Execution ids a node occupied, reused when materializing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHints {
    /// Scope execution of a scope node
    pub scope: Option<ExecutionId>,
    /// Concurrent execution the node hung under
    pub branch: Option<ExecutionId>,
    /// Execution that represented the node
    pub representative: Option<ExecutionId>,
}

/// Activity instance, transition instance, or the process instance itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutNode {
    /// Activity instance id (the process instance id for the root)
    pub instance_id: ActivityInstanceId,
    /// Activity the node instantiates
    pub activity_id: ActivityId,
    /// Whether the node owns a scope execution
    pub is_scope: bool,
    /// Node state; for scopes with children always `Active`
    pub state: NodeState,
    /// Previously occupied execution ids
    pub hints: ExecutionHints,
    /// Child nodes in order
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Fresh scope node with reserved execution ids
    pub fn scope(instance_id: ActivityInstanceId, activity_id: ActivityId) -> Self {
        Self {
            instance_id,
            activity_id,
            is_scope: true,
            state: NodeState::Active,
            hints: ExecutionHints {
                scope: Some(ExecutionId::generate()),
                branch: Some(ExecutionId::generate()),
                representative: None,
            },
            children: Vec::new(),
        }
    }

    /// Fresh non-scope node with a reserved branch execution id
    pub fn leaf(instance_id: ActivityInstanceId, activity_id: ActivityId, state: NodeState) -> Self {
        Self {
            instance_id,
            activity_id,
            is_scope: false,
            state,
            hints: ExecutionHints {
                scope: None,
                branch: Some(ExecutionId::generate()),
                representative: None,
            },
            children: Vec::new(),
        }
    }

    /// Record the execution ids a materialization assigned, so later runs reuse them
    pub fn pin(&mut self, placement: &Placement) {
        if let Some(id) = placement.scope_execution.get(&self.instance_id) {
            self.hints.scope = Some(id.clone());
        }
        if let Some(id) = placement.branch_execution.get(&self.instance_id) {
            self.hints.branch = Some(id.clone());
        }
        if let Some(id) = placement.representative.get(&self.instance_id) {
            self.hints.representative = Some(id.clone());
        }
        for child in &mut self.children {
            child.pin(placement);
        }
    }

    /// Derive the layout from a materialized execution tree
    pub fn from_tree(tree: &ExecutionTree) -> Result<Self, EngineError> {
        let root = tree
            .root()
            .ok_or_else(|| EngineError::ExecutionNotFound("process instance execution".into()))?;
        scope_node(tree, root)
    }

    /// Whether the node is a transition instance
    pub fn is_transition(&self) -> bool {
        matches!(self.state, NodeState::Transition(_))
    }

    /// Transition state, if the node is a transition instance
    pub fn transition(&self) -> Option<&TransitionState> {
        match &self.state {
            NodeState::Transition(state) => Some(state),
            _ => None,
        }
    }

    /// Find a node by instance id
    pub fn find(&self, id: &str) -> Option<&LayoutNode> {
        if self.instance_id == *id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Find a node by instance id, mutably
    pub fn find_mut(&mut self, id: &str) -> Option<&mut LayoutNode> {
        if self.instance_id == *id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Parent of the node with the given id
    pub fn parent_of(&self, id: &str) -> Option<&LayoutNode> {
        if self.children.iter().any(|child| child.instance_id == *id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.parent_of(id))
    }

    /// Instance ids from the root down to `id`, both inclusive
    pub fn path_to(&self, id: &str) -> Option<Vec<ActivityInstanceId>> {
        if self.instance_id == *id {
            return Some(vec![self.instance_id.clone()]);
        }
        self.children.iter().find_map(|child| {
            child.path_to(id).map(|mut path| {
                path.insert(0, self.instance_id.clone());
                path
            })
        })
    }

    /// Detach a descendant node
    pub fn remove(&mut self, id: &str) -> Option<LayoutNode> {
        if let Some(index) = self.children.iter().position(|c| c.instance_id == *id) {
            return Some(self.children.remove(index));
        }
        self.children.iter_mut().find_map(|child| child.remove(id))
    }

    /// Pre-order traversal including `self`
    pub fn descendants(&self) -> Vec<&LayoutNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    /// Ids of `self` and all descendants
    pub fn subtree_ids(&self) -> HashSet<ActivityInstanceId> {
        self.descendants()
            .into_iter()
            .map(|node| node.instance_id.clone())
            .collect()
    }
}

fn scope_node(tree: &ExecutionTree, execution: &Execution) -> Result<LayoutNode, EngineError> {
    let instance_id = execution.scope_instance_id.clone().ok_or_else(|| {
        EngineError::StateStoreError(format!(
            "Scope execution '{}' has no scope instance",
            execution.id
        ))
    })?;
    let activity_id = execution.scope_activity_id.clone().ok_or_else(|| {
        EngineError::StateStoreError(format!(
            "Scope execution '{}' has no scope activity",
            execution.id
        ))
    })?;
    let mut node = LayoutNode::scope(instance_id, activity_id);
    node.hints = ExecutionHints {
        scope: Some(execution.id.clone()),
        branch: None,
        representative: Some(execution.id.clone()),
    };

    let children = tree.children(&execution.id);
    match &execution.activity_id {
        Some(activity) if *activity == node.activity_id && children.is_empty() => {
            node.state = state_of(execution);
        }
        Some(_) => node.children.push(leaf_node(execution, None)?),
        None => {}
    }

    for child in children {
        if child.is_concurrent {
            if child.activity_id.is_some() {
                node.children.push(leaf_node(child, Some(child.id.clone()))?);
            }
            for nested in tree.children(&child.id) {
                let mut scope = scope_node(tree, nested)?;
                scope.hints.branch = Some(child.id.clone());
                node.children.push(scope);
            }
        } else {
            node.children.push(scope_node(tree, child)?);
        }
    }
    Ok(node)
}

fn leaf_node(execution: &Execution, branch: Option<ExecutionId>) -> Result<LayoutNode, EngineError> {
    let activity_id = execution.activity_id.clone().ok_or_else(|| {
        EngineError::StateStoreError(format!("Execution '{}' has no activity", execution.id))
    })?;
    let instance_id = execution.activity_instance_id.clone().ok_or_else(|| {
        EngineError::StateStoreError(format!(
            "Execution '{}' has no activity instance",
            execution.id
        ))
    })?;
    let mut node = LayoutNode::leaf(instance_id, activity_id, state_of(execution));
    node.hints = ExecutionHints {
        scope: None,
        branch,
        representative: Some(execution.id.clone()),
    };
    Ok(node)
}

fn state_of(execution: &Execution) -> NodeState {
    match &execution.transition {
        Some(transition) => NodeState::Transition(transition.clone()),
        None if execution.is_active => NodeState::Active,
        None => NodeState::Waiting,
    }
}

/// Where each layout node landed in a materialized tree
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// Scope execution of every scope node
    pub scope_execution: HashMap<ActivityInstanceId, ExecutionId>,
    /// Concurrent execution of nodes with concurrent siblings
    pub branch_execution: HashMap<ActivityInstanceId, ExecutionId>,
    /// Execution that represents each node
    pub representative: HashMap<ActivityInstanceId, ExecutionId>,
    /// Scope execution of the enclosing scope node
    pub enclosing_scope: HashMap<ActivityInstanceId, ExecutionId>,
}

impl Placement {
    /// Execution holding state that belongs to the node's own scope
    pub fn scope_of(&self, id: &ActivityInstanceId) -> Option<&ExecutionId> {
        self.scope_execution
            .get(id)
            .or_else(|| self.representative.get(id))
    }

    /// Execution holding state local to the node's concurrent branch
    pub fn branch_of(&self, id: &ActivityInstanceId) -> Option<&ExecutionId> {
        self.branch_execution
            .get(id)
            .or_else(|| self.enclosing_scope.get(id))
    }
}

/// Build the compacted execution tree for a layout
pub fn materialize(
    root: &LayoutNode,
    process_instance_id: &ProcessInstanceId,
    process_definition_id: &ProcessDefinitionId,
) -> (ExecutionTree, Placement) {
    let mut materializer = Materializer {
        process_instance_id,
        process_definition_id,
        executions: Vec::new(),
        used: HashSet::new(),
        placement: Placement::default(),
    };
    let root_id = ExecutionId::from(process_instance_id);
    materializer.used.insert(root_id.clone());
    materializer.scope(root, root_id, None);
    (
        ExecutionTree::from_executions(materializer.executions),
        materializer.placement,
    )
}

struct Materializer<'a> {
    process_instance_id: &'a ProcessInstanceId,
    process_definition_id: &'a ProcessDefinitionId,
    executions: Vec<Execution>,
    used: HashSet<ExecutionId>,
    placement: Placement,
}

impl Materializer<'_> {
    fn claim(&mut self, hint: &Option<ExecutionId>) -> ExecutionId {
        match hint {
            Some(id) if !self.used.contains(id) => {
                self.used.insert(id.clone());
                id.clone()
            }
            _ => {
                let id = ExecutionId::generate();
                self.used.insert(id.clone());
                id
            }
        }
    }

    fn push(&mut self, id: ExecutionId, parent: Option<ExecutionId>) -> usize {
        self.executions.push(Execution {
            id,
            parent_id: parent,
            process_instance_id: self.process_instance_id.clone(),
            process_definition_id: self.process_definition_id.clone(),
            activity_id: None,
            activity_instance_id: None,
            scope_activity_id: None,
            scope_instance_id: None,
            is_scope: false,
            is_concurrent: false,
            is_active: false,
            transition: None,
        });
        self.executions.len() - 1
    }

    fn occupy(&mut self, index: usize, node: &LayoutNode) {
        let execution = &mut self.executions[index];
        execution.activity_id = Some(node.activity_id.clone());
        execution.activity_instance_id = Some(node.instance_id.clone());
        match &node.state {
            NodeState::Active => execution.is_active = true,
            NodeState::Waiting => execution.is_active = false,
            NodeState::Transition(transition) => {
                execution.is_active = true;
                execution.transition = Some(transition.clone());
            }
        }
    }

    fn scope(&mut self, node: &LayoutNode, id: ExecutionId, parent: Option<ExecutionId>) {
        let index = self.push(id.clone(), parent);
        {
            let execution = &mut self.executions[index];
            execution.is_scope = true;
            execution.scope_activity_id = Some(node.activity_id.clone());
            execution.scope_instance_id = Some(node.instance_id.clone());
        }
        self.placement
            .scope_execution
            .insert(node.instance_id.clone(), id.clone());
        self.placement
            .representative
            .insert(node.instance_id.clone(), id.clone());

        match node.children.as_slice() {
            [] => self.occupy(index, node),
            [only] if !only.is_scope => {
                self.occupy(index, only);
                self.placement
                    .representative
                    .insert(only.instance_id.clone(), id.clone());
                self.placement
                    .enclosing_scope
                    .insert(only.instance_id.clone(), id);
            }
            [only] => {
                self.placement
                    .enclosing_scope
                    .insert(only.instance_id.clone(), id.clone());
                let child_id = self.claim(&only.hints.scope);
                self.scope(only, child_id, Some(id));
            }
            many => {
                for child in many {
                    self.placement
                        .enclosing_scope
                        .insert(child.instance_id.clone(), id.clone());
                    let branch_id = self.claim(&child.hints.branch);
                    let branch_index = self.push(branch_id.clone(), Some(id.clone()));
                    self.executions[branch_index].is_concurrent = true;
                    self.placement
                        .branch_execution
                        .insert(child.instance_id.clone(), branch_id.clone());
                    if child.is_scope {
                        let scope_id = self.claim(&child.hints.scope);
                        self.scope(child, scope_id, Some(branch_id));
                    } else {
                        self.occupy(branch_index, child);
                        self.placement
                            .representative
                            .insert(child.instance_id.clone(), branch_id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::AsyncPosition;

    fn ids() -> (ProcessInstanceId, ProcessDefinitionId) {
        (
            ProcessInstanceId::new("pi"),
            ProcessDefinitionId::new("Process:1:x"),
        )
    }

    fn root() -> LayoutNode {
        LayoutNode::scope(ActivityInstanceId::new("pi"), ActivityId::new("Process"))
    }

    fn task(id: &str, activity: &str) -> LayoutNode {
        LayoutNode::leaf(
            ActivityInstanceId::new(id),
            ActivityId::new(activity),
            NodeState::Active,
        )
    }

    #[test]
    fn test_single_task_is_compacted_onto_root() {
        let (pi, pd) = ids();
        let mut layout = root();
        layout.children.push(task("ai1", "userTask"));

        let (tree, placement) = materialize(&layout, &pi, &pd);

        assert_eq!(tree.len(), 1);
        let execution = tree.root().unwrap();
        assert_eq!(execution.id, "pi");
        assert_eq!(execution.activity_id.as_deref(), Some("userTask"));
        assert!(execution.is_scope && execution.is_active);
        assert_eq!(
            placement.representative[&ActivityInstanceId::new("ai1")],
            ExecutionId::new("pi")
        );
    }

    #[test]
    fn test_concurrent_children_expand() {
        let (pi, pd) = ids();
        let mut layout = root();
        layout.children.push(task("ai1", "userTask1"));
        let mut sub = LayoutNode::scope(ActivityInstanceId::new("ai2"), ActivityId::new("subProcess"));
        sub.children.push(task("ai3", "userTask2"));
        layout.children.push(sub);

        let (tree, placement) = materialize(&layout, &pi, &pd);

        assert_eq!(tree.len(), 4);
        let children = tree.children("pi");
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.is_concurrent && !c.is_scope));
        assert_eq!(children[0].activity_id.as_deref(), Some("userTask1"));
        let scope_id = &placement.scope_execution[&ActivityInstanceId::new("ai2")];
        let scope = tree.get(scope_id).unwrap();
        assert_eq!(scope.parent_id.as_ref(), Some(&children[1].id));
        assert_eq!(scope.activity_id.as_deref(), Some("userTask2"));
        assert_eq!(
            placement.branch_of(&ActivityInstanceId::new("ai3")),
            Some(scope_id)
        );
    }

    #[test]
    fn test_layout_round_trips_through_tree() {
        let (pi, pd) = ids();
        let mut layout = root();
        let mut sub = LayoutNode::scope(ActivityInstanceId::new("ai1"), ActivityId::new("subProcess"));
        sub.children.push(task("ai2", "userTask1"));
        sub.children.push(LayoutNode::leaf(
            ActivityInstanceId::new("ai3"),
            ActivityId::new("userTask2"),
            NodeState::Transition(TransitionState {
                position: AsyncPosition::Before,
                sequence_flow: None,
            }),
        ));
        layout.children.push(sub);

        let (tree, _) = materialize(&layout, &pi, &pd);
        let derived = LayoutNode::from_tree(&tree).unwrap();
        let (again, _) = materialize(&derived, &pi, &pd);

        assert_eq!(tree, again);
        assert_eq!(derived.find("ai3").unwrap().state, layout.find("ai3").unwrap().state);
    }

    #[test]
    fn test_hints_preserve_execution_ids_when_a_sibling_leaves() {
        let (pi, pd) = ids();
        let mut layout = root();
        let mut sub = LayoutNode::scope(ActivityInstanceId::new("ai1"), ActivityId::new("subProcess"));
        sub.children.push(task("ai2", "userTask"));
        layout.children.push(sub);
        layout.children.push(task("ai3", "otherTask"));

        let (tree, placement) = materialize(&layout, &pi, &pd);
        let sub_execution = placement.scope_execution[&ActivityInstanceId::new("ai1")].clone();

        let mut derived = LayoutNode::from_tree(&tree).unwrap();
        derived.remove("ai3");
        let (compacted, placement) = materialize(&derived, &pi, &pd);

        assert_eq!(compacted.len(), 2);
        assert_eq!(
            placement.scope_execution[&ActivityInstanceId::new("ai1")],
            sub_execution
        );
        assert!(!compacted.get(&sub_execution).unwrap().is_concurrent);
    }
}
