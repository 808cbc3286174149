//! Transforms a matched process instance into its target-definition shape
//!
//! The transformation works on the logical layout. Migrating nodes keep their
//! activity instance ids and execution hints, unmapped scopes vanish and scopes
//! the target requires between a migrating parent and child emerge. The
//! execution tree is recompacted when the working state is committed.

use crate::application::interpreter::new_instance_id;
use crate::application::migration::event_trigger;
use crate::application::migration::jobs;
use crate::application::migration::matcher::MigratingProcessInstance;
use crate::application::migration::plan::MigrationPlan;
use crate::application::working_state::{ExecutionContext, Owner, WorkingState};
use crate::domain::events::{ProcessInstanceMigrated, ScopeInstanceCreated, ScopeInstanceRemoved};
use crate::domain::execution::{AsyncPosition, TransitionState};
use crate::domain::ids::{ActivityId, ActivityInstanceId};
use crate::domain::layout::{LayoutNode, NodeState};
use crate::domain::process_definition::{ListenerEvent, ProcessDefinition};
use crate::EngineError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
struct Emerged {
    instance_id: ActivityInstanceId,
    activity_id: ActivityId,
}

#[derive(Debug)]
struct Removed {
    instance_id: ActivityInstanceId,
    activity_id: ActivityId,
    /// Closest migrating ancestor, receives outputs and local variables
    ancestor: ActivityInstanceId,
}

/// Migrate the working state to the target definition
pub(crate) fn migrate(
    mut state: WorkingState,
    migrating: &MigratingProcessInstance,
    plan: &MigrationPlan,
    target: Arc<ProcessDefinition>,
    context: &ExecutionContext<'_>,
) -> Result<WorkingState, EngineError> {
    let source = state.definition.clone();
    let mut builder = LayoutBuilder {
        target: &target,
        migrating,
        emerged: Vec::new(),
        removed: Vec::new(),
    };
    let layout = builder.build(&state.root);
    let LayoutBuilder {
        emerged, removed, ..
    } = builder;
    debug!(
        process_instance = %state.instance.id,
        emerging = emerged.len(),
        removed = removed.len(),
        "Computed target layout"
    );

    for scope in &removed {
        remove_scope(&mut state, &source, scope, context)?;
    }

    state.root = layout;
    state.definition = target.clone();
    state.instance.process_definition_id = target.id.clone();
    for task in &mut state.tasks {
        if let Some(activity) = migrating.target_of(task.owner.node()) {
            task.item.task_definition_key = activity.clone();
        }
        task.item.process_definition_id = target.id.clone();
    }

    event_trigger::reconcile(&mut state, migrating, plan, context)?;
    jobs::reassign(&mut state, migrating);

    for scope in &emerged {
        create_scope(&mut state, &target, scope, context)?;
    }

    let now = context.clock.now();
    state.instance.record_event(Box::new(ProcessInstanceMigrated {
        process_instance_id: state.instance.id.clone(),
        source_process_definition_id: source.id.clone(),
        target_process_definition_id: target.id.clone(),
        timestamp: now,
    }));
    Ok(state)
}

/// End a vanishing scope the way ordinary completion would, minus the outgoing flow
fn remove_scope(
    state: &mut WorkingState,
    source: &ProcessDefinition,
    scope: &Removed,
    context: &ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let activity = source.require(&scope.activity_id)?;
    state.invoke_listeners(&scope.instance_id, activity, ListenerEvent::End, context)?;
    state.apply_outputs(
        &scope.instance_id,
        activity,
        Owner::Scope(scope.ancestor.clone()),
        context,
    );

    let destination = Owner::Scope(scope.ancestor.clone());
    let relocated: HashSet<String> = state
        .variables
        .iter()
        .filter(|v| is_local_to(&v.owner, &scope.instance_id))
        .map(|v| v.item.name.clone())
        .collect();
    if !relocated.is_empty() {
        // known data loss: an ancestor variable of the same name is overwritten
        state.variables.retain(|v| {
            let overwritten = v.owner == destination && relocated.contains(&v.item.name);
            if overwritten {
                warn!(
                    variable = %v.item.name,
                    scope = %scope.activity_id,
                    "Variable of a removed scope overwrites the ancestor's variable"
                );
            }
            !overwritten
        });
        for variable in &mut state.variables {
            if is_local_to(&variable.owner, &scope.instance_id) {
                variable.owner = destination.clone();
            }
        }
    }

    let own: HashSet<ActivityInstanceId> = [scope.instance_id.clone()].into_iter().collect();
    state.remove_owned_by(&own);

    let now = context.clock.now();
    state.instance.record_event(Box::new(ScopeInstanceRemoved {
        process_instance_id: state.instance.id.clone(),
        activity_id: scope.activity_id.clone(),
        activity_instance_id: scope.instance_id.clone(),
        timestamp: now,
    }));
    Ok(())
}

/// Enter a scope the target requires, without running its behaviour
fn create_scope(
    state: &mut WorkingState,
    target: &ProcessDefinition,
    scope: &Emerged,
    context: &ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let activity = target.require(&scope.activity_id)?;
    state.apply_inputs(&scope.instance_id, activity, context);
    state.invoke_listeners(&scope.instance_id, activity, ListenerEvent::Start, context)?;
    for trigger in target.scope_triggers(&activity.id) {
        state.create_trigger(trigger, Owner::Scope(scope.instance_id.clone()), context)?;
    }

    let now = context.clock.now();
    state.instance.record_event(Box::new(ScopeInstanceCreated {
        process_instance_id: state.instance.id.clone(),
        activity_id: scope.activity_id.clone(),
        activity_instance_id: scope.instance_id.clone(),
        timestamp: now,
    }));
    Ok(())
}

fn is_local_to(owner: &Owner, node: &ActivityInstanceId) -> bool {
    matches!(owner, Owner::Scope(id) | Owner::Branch(id) if id == node)
}

struct LayoutBuilder<'a> {
    target: &'a ProcessDefinition,
    migrating: &'a MigratingProcessInstance,
    emerged: Vec<Emerged>,
    removed: Vec<Removed>,
}

impl LayoutBuilder<'_> {
    fn build(&mut self, source_root: &LayoutNode) -> LayoutNode {
        let mut root = LayoutNode {
            instance_id: source_root.instance_id.clone(),
            activity_id: self.target.root_id().clone(),
            is_scope: true,
            state: source_root.state.clone(),
            hints: source_root.hints.clone(),
            children: Vec::new(),
        };
        let mut slots = HashMap::new();
        self.attach(&source_root.children, &mut root, &mut slots);
        root
    }

    /// Attach migrated descendants of `sources` below the migrating node `parent`
    ///
    /// `slots` holds the scopes that emerged below `parent`, one per target flow scope.
    fn attach(
        &mut self,
        sources: &[LayoutNode],
        parent: &mut LayoutNode,
        slots: &mut HashMap<ActivityId, ActivityInstanceId>,
    ) {
        for source in sources {
            let Some(target_activity) = self.migrating.target_of(&source.instance_id).cloned()
            else {
                self.attach(&source.children, parent, slots);
                self.removed.push(Removed {
                    instance_id: source.instance_id.clone(),
                    activity_id: source.activity_id.clone(),
                    ancestor: parent.instance_id.clone(),
                });
                continue;
            };

            let node = self.migrate_node(source, &target_activity);
            let flow_scope = self
                .target
                .flow_scope(&target_activity)
                .cloned()
                .unwrap_or_else(|| self.target.root_id().clone());
            if flow_scope == parent.activity_id {
                parent.children.push(node);
                continue;
            }

            let slot = match slots.get(&flow_scope) {
                Some(slot) => slot.clone(),
                None => {
                    let instance_id = new_instance_id(&flow_scope);
                    parent
                        .children
                        .push(LayoutNode::scope(instance_id.clone(), flow_scope.clone()));
                    self.emerged.push(Emerged {
                        instance_id: instance_id.clone(),
                        activity_id: flow_scope.clone(),
                    });
                    slots.insert(flow_scope, instance_id.clone());
                    instance_id
                }
            };
            if let Some(emerged) = parent.find_mut(&slot) {
                emerged.children.push(node);
            }
        }
    }

    fn migrate_node(&mut self, source: &LayoutNode, target_activity: &ActivityId) -> LayoutNode {
        let activity = self.target.activity(target_activity);
        let state = match &source.state {
            NodeState::Transition(transition) => {
                NodeState::Transition(self.migrate_transition(transition, target_activity))
            }
            other => other.clone(),
        };
        let mut node = LayoutNode {
            instance_id: source.instance_id.clone(),
            activity_id: target_activity.clone(),
            is_scope: activity.map_or(source.is_scope, |a| a.is_scope) && !source.is_transition(),
            state,
            hints: source.hints.clone(),
            children: Vec::new(),
        };
        let mut slots = HashMap::new();
        self.attach(&source.children, &mut node, &mut slots);
        node
    }

    /// Keep the recorded sequence flow when the target has it, else its only candidate
    fn migrate_transition(&self, transition: &TransitionState, target_activity: &str) -> TransitionState {
        let candidates = match transition.position {
            AsyncPosition::Before => self.target.incoming(target_activity),
            AsyncPosition::After => self.target.outgoing(target_activity),
        };
        let sequence_flow = match &transition.sequence_flow {
            Some(flow) if candidates.iter().any(|c| c.id == *flow) => Some(flow.clone()),
            Some(_) if candidates.len() == 1 => Some(candidates[0].id.clone()),
            _ => None,
        };
        TransitionState {
            position: transition.position,
            sequence_flow,
        }
    }
}
