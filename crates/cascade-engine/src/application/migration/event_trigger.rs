//! Event subscriptions and timers of migrating activity instances
//!
//! A trigger whose activity is mapped keeps its identity and, unless its
//! instruction asks to update the event trigger, its event name and due date.
//! Triggers without a surviving mapping are removed, target triggers nobody
//! migrated into are created as if their scope had just been entered.

use crate::application::migration::matcher::MigratingProcessInstance;
use crate::application::migration::plan::{MigrationInstruction, MigrationPlan};
use crate::application::working_state::{ExecutionContext, Owner, WorkingState};
use crate::domain::ids::{ActivityId, ActivityInstanceId, EventSubscriptionId, JobId};
use crate::domain::job::JobKind;
use crate::domain::process_definition::EventDefinition;
use crate::EngineError;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Reconcile the triggers of every migrating node against the target definition
pub(crate) fn reconcile(
    state: &mut WorkingState,
    migrating: &MigratingProcessInstance,
    plan: &MigrationPlan,
    context: &ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let nodes: Vec<(ActivityInstanceId, ActivityId)> = state
        .root
        .descendants()
        .into_iter()
        .filter_map(|node| {
            migrating
                .target_of(&node.instance_id)
                .map(|target| (node.instance_id.clone(), target.clone()))
        })
        .collect();

    for (node, target_activity) in nodes {
        reconcile_scope_triggers(state, &node, &target_activity, plan, context)?;
        if !state.node(&node)?.is_transition() {
            reconcile_own_trigger(
                state,
                &node,
                &target_activity,
                migrating.instruction_of(&node),
                context,
            )?;
        }
    }
    Ok(())
}

/// Boundary events and event sub process starts owned by a scope
fn reconcile_scope_triggers(
    state: &mut WorkingState,
    node: &ActivityInstanceId,
    target_activity: &ActivityId,
    plan: &MigrationPlan,
    context: &ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let target = state.definition.clone();
    let owner = Owner::Scope(node.clone());
    let mapping = |source_activity: &ActivityId| -> Option<MigrationInstruction> {
        plan.instruction_for(source_activity)
            .filter(|instruction| {
                target.event_scope(&instruction.target_activity_id).as_ref() == Some(target_activity)
            })
            .cloned()
    };

    let mut migrated: HashSet<ActivityId> = HashSet::new();
    let mut dropped_subscriptions: Vec<EventSubscriptionId> = Vec::new();
    for subscription in state.subscriptions.iter_mut().filter(|s| s.owner == owner) {
        match mapping(&subscription.item.activity_id) {
            Some(instruction) => {
                if instruction.update_event_trigger {
                    if let Some(name) = target
                        .activity(&instruction.target_activity_id)
                        .and_then(|a| a.event.as_ref())
                        .and_then(EventDefinition::event_name)
                    {
                        debug!(from = %subscription.item.event_name, to = name, "Updating event trigger");
                        subscription.item.event_name = name.to_string();
                    }
                }
                subscription.item.activity_id = instruction.target_activity_id.clone();
                migrated.insert(instruction.target_activity_id);
            }
            None => dropped_subscriptions.push(subscription.item.id.clone()),
        }
    }
    state
        .subscriptions
        .retain(|s| !dropped_subscriptions.contains(&s.item.id));

    let now = context.clock.now();
    let mut dropped_jobs: Vec<JobId> = Vec::new();
    for job in state
        .jobs
        .iter_mut()
        .filter(|j| j.owner == owner && j.item.kind == JobKind::Timer)
    {
        match mapping(&job.item.activity_id) {
            Some(instruction) => {
                if instruction.update_event_trigger {
                    if let Some(EventDefinition::Timer(timer)) = target
                        .activity(&instruction.target_activity_id)
                        .and_then(|a| a.event.as_ref())
                    {
                        job.item.due_date = Some(timer.due_date(now)?);
                        debug!(job = %job.item.id, due_date = ?job.item.due_date, "Recomputed timer");
                    }
                }
                job.item.activity_id = instruction.target_activity_id.clone();
                migrated.insert(instruction.target_activity_id);
            }
            None => dropped_jobs.push(job.item.id.clone()),
        }
    }
    for job in &dropped_jobs {
        state.remove_job(job);
    }
    if !dropped_subscriptions.is_empty() || !dropped_jobs.is_empty() {
        trace!(
            scope = %node,
            subscriptions = dropped_subscriptions.len(),
            jobs = dropped_jobs.len(),
            "Removed unmapped scope triggers"
        );
    }

    for trigger in target.scope_triggers(target_activity) {
        if !migrated.contains(&trigger.id) {
            debug!(scope = %node, trigger = %trigger.id, "Creating trigger absent from the source");
            state.create_trigger(trigger, owner.clone(), context)?;
        }
    }
    Ok(())
}

/// Receive tasks and intermediate catch events wait on a trigger of their own
fn reconcile_own_trigger(
    state: &mut WorkingState,
    node: &ActivityInstanceId,
    target_activity: &ActivityId,
    instruction: Option<&MigrationInstruction>,
    context: &ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let target = state.definition.clone();
    let Some(activity) = target.activity(target_activity) else {
        return Ok(());
    };
    let owner = Owner::Leaf(node.clone());
    let update = instruction.is_some_and(|i| i.update_event_trigger);
    let keeps_trigger = activity.has_own_trigger();
    let mut found = false;

    if keeps_trigger {
        for subscription in state.subscriptions.iter_mut().filter(|s| s.owner == owner) {
            found = true;
            subscription.item.activity_id = activity.id.clone();
            if update {
                if let Some(name) = activity.event.as_ref().and_then(EventDefinition::event_name) {
                    subscription.item.event_name = name.to_string();
                }
            }
        }
        let now = context.clock.now();
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.owner == owner && j.item.kind == JobKind::Timer)
        {
            found = true;
            job.item.activity_id = activity.id.clone();
            if update {
                if let Some(EventDefinition::Timer(timer)) = &activity.event {
                    job.item.due_date = Some(timer.due_date(now)?);
                }
            }
        }
    } else {
        state.subscriptions.retain(|s| s.owner != owner);
        let timers: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|j| j.owner == owner && j.item.kind == JobKind::Timer)
            .map(|j| j.item.id.clone())
            .collect();
        for job in &timers {
            state.remove_job(job);
        }
    }

    if keeps_trigger && !found {
        state.create_trigger(activity, owner, context)?;
    }
    Ok(())
}
