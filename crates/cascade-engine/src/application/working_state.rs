//! Mutable working copy of a process instance
//!
//! Operations never edit executions directly. They edit the logical layout and
//! attach dependent state (variables, tasks, subscriptions, jobs, incidents) to
//! layout nodes through an [`Owner`]. [`WorkingState::commit`] materializes the
//! execution tree and resolves each owner to a concrete execution.

use crate::application::delegates::{DelegateContext, DelegateRegistry};
use crate::config::EngineConfig;
use crate::domain::clock::Clock;
use crate::domain::event_subscription::EventSubscription;
use crate::domain::events::{IncidentCreated, VariableOverwritten};
use crate::domain::execution::{AsyncPosition, ExecutionTree};
use crate::domain::ids::{
    ActivityId, ActivityInstanceId, EventSubscriptionId, ExecutionId, IncidentId, JobId, TaskId,
    VariableId,
};
use crate::domain::job::{Incident, Job, JobKind, FAILED_JOB_INCIDENT};
use crate::domain::layout::{materialize, LayoutNode, Placement};
use crate::domain::process_definition::{
    ActivityDefinition, EventDefinition, IoParameter, IoSource, ListenerEvent, ProcessDefinition,
};
use crate::domain::process_instance::{ProcessInstance, ProcessInstanceStatus};
use crate::domain::task::Task;
use crate::domain::variable::VariableInstance;
use crate::{DataPacket, EngineError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Layout node that dependent state belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Owner {
    /// The node's own scope (scope variables, boundary and event sub process triggers)
    Scope(ActivityInstanceId),
    /// The concurrent branch the node runs in (concurrent-local variables)
    Branch(ActivityInstanceId),
    /// The node itself (tasks, own triggers, async jobs)
    Leaf(ActivityInstanceId),
}

impl Owner {
    pub(crate) fn node(&self) -> &ActivityInstanceId {
        match self {
            Owner::Scope(id) | Owner::Branch(id) | Owner::Leaf(id) => id,
        }
    }
}

/// Dependent entity with its owner
#[derive(Debug, Clone)]
pub(crate) struct Owned<T> {
    pub(crate) owner: Owner,
    pub(crate) item: T,
}

/// Collaborators and flags of one engine operation
pub(crate) struct ExecutionContext<'a> {
    pub(crate) delegates: &'a DelegateRegistry,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) config: &'a EngineConfig,
    pub(crate) skip_custom_listeners: bool,
    pub(crate) skip_io_mappings: bool,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        delegates: &'a DelegateRegistry,
        clock: &'a dyn Clock,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            delegates,
            clock,
            config,
            skip_custom_listeners: false,
            skip_io_mappings: false,
        }
    }
}

/// Working copy of one process instance
#[derive(Debug, Clone)]
pub(crate) struct WorkingState {
    pub(crate) instance: ProcessInstance,
    pub(crate) definition: Arc<ProcessDefinition>,
    pub(crate) root: LayoutNode,
    pub(crate) tasks: Vec<Owned<Task>>,
    pub(crate) variables: Vec<Owned<VariableInstance>>,
    pub(crate) subscriptions: Vec<Owned<EventSubscription>>,
    pub(crate) jobs: Vec<Owned<Job>>,
    pub(crate) incidents: Vec<Owned<Incident>>,
}

impl WorkingState {
    /// Working state for a brand-new instance with only the root scope
    pub(crate) fn create(instance: ProcessInstance, definition: Arc<ProcessDefinition>) -> Self {
        let root = LayoutNode::scope(
            ActivityInstanceId::from(&instance.id),
            definition.root_id().clone(),
        );
        Self {
            instance,
            definition,
            root,
            tasks: Vec::new(),
            variables: Vec::new(),
            subscriptions: Vec::new(),
            jobs: Vec::new(),
            incidents: Vec::new(),
        }
    }

    /// Load a persisted instance; `definition` must be its current definition
    pub(crate) fn load(
        mut instance: ProcessInstance,
        definition: Arc<ProcessDefinition>,
    ) -> Result<Self, EngineError> {
        if instance.is_ended() {
            return Err(EngineError::BadUserRequest(format!(
                "Process instance '{}' has ended",
                instance.id
            )));
        }
        let root = LayoutNode::from_tree(&instance.executions)?;

        let mut scope_nodes: HashMap<ExecutionId, ActivityInstanceId> = HashMap::new();
        let mut branch_nodes: HashMap<ExecutionId, ActivityInstanceId> = HashMap::new();
        let mut leaf_nodes: HashMap<ExecutionId, Vec<(ActivityInstanceId, ActivityId)>> =
            HashMap::new();
        for node in root.descendants() {
            if node.is_scope {
                if let Some(execution) = &node.hints.scope {
                    scope_nodes.insert(execution.clone(), node.instance_id.clone());
                }
            }
            if let Some(branch) = &node.hints.branch {
                branch_nodes.insert(branch.clone(), node.instance_id.clone());
            }
            if node.children.is_empty() {
                if let Some(execution) = &node.hints.representative {
                    leaf_nodes
                        .entry(execution.clone())
                        .or_default()
                        .push((node.instance_id.clone(), node.activity_id.clone()));
                }
            }
        }

        let leaf_at = |execution: &ExecutionId, activity: &ActivityId| {
            leaf_nodes.get(execution).and_then(|nodes| {
                nodes
                    .iter()
                    .find(|(_, a)| a == activity)
                    .map(|(id, _)| id.clone())
            })
        };
        let scope_at = |execution: &ExecutionId, activity: &str| {
            scope_nodes
                .get(execution)
                .filter(|id| root.find(id).is_some_and(|n| n.activity_id == *activity))
                .cloned()
        };

        let root_id = root.instance_id.clone();
        let variables = std::mem::take(&mut instance.variables)
            .into_iter()
            .map(|variable| {
                let owner = if let Some(node) = scope_nodes.get(&variable.execution_id) {
                    Owner::Scope(node.clone())
                } else if let Some(node) = branch_nodes.get(&variable.execution_id) {
                    Owner::Branch(node.clone())
                } else {
                    warn!(
                        variable = %variable.name,
                        execution = %variable.execution_id,
                        "Variable on unknown execution, attaching to the process instance"
                    );
                    Owner::Scope(root_id.clone())
                };
                Owned { owner, item: variable }
            })
            .collect();

        let tasks = std::mem::take(&mut instance.tasks)
            .into_iter()
            .map(|task| {
                leaf_at(&task.execution_id, &task.task_definition_key)
                    .map(|node| Owned {
                        owner: Owner::Leaf(node),
                        item: task.clone(),
                    })
                    .ok_or_else(|| orphan("Task", &task.id.0, &task.execution_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let trigger_owner = |execution: &ExecutionId, activity: &ActivityId| {
            match definition.event_scope(activity) {
                Some(scope) if scope != *activity => {
                    scope_at(execution, &scope).map(Owner::Scope)
                }
                _ => leaf_at(execution, activity).map(Owner::Leaf),
            }
        };

        let subscriptions = std::mem::take(&mut instance.event_subscriptions)
            .into_iter()
            .map(|subscription| {
                trigger_owner(&subscription.execution_id, &subscription.activity_id)
                    .map(|owner| Owned {
                        owner,
                        item: subscription.clone(),
                    })
                    .ok_or_else(|| {
                        orphan("Subscription", &subscription.id.0, &subscription.execution_id)
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let jobs: Vec<Owned<Job>> = std::mem::take(&mut instance.jobs)
            .into_iter()
            .map(|job| {
                let owner = match job.kind {
                    JobKind::Timer => trigger_owner(&job.execution_id, &job.activity_id),
                    JobKind::AsyncContinuation(_) => {
                        leaf_at(&job.execution_id, &job.activity_id).map(Owner::Leaf)
                    }
                };
                owner
                    .map(|owner| Owned {
                        owner,
                        item: job.clone(),
                    })
                    .ok_or_else(|| orphan("Job", &job.id.0, &job.execution_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let incidents = std::mem::take(&mut instance.incidents)
            .into_iter()
            .map(|incident| {
                let owner = jobs
                    .iter()
                    .find(|job| incident.is_for_job(&job.item.id))
                    .map(|job| job.owner.clone())
                    .or_else(|| {
                        leaf_at(&incident.execution_id, &incident.activity_id).map(Owner::Leaf)
                    })
                    .or_else(|| {
                        scope_nodes
                            .get(&incident.execution_id)
                            .cloned()
                            .map(Owner::Scope)
                    })
                    .unwrap_or_else(|| Owner::Scope(root_id.clone()));
                Owned {
                    owner,
                    item: incident,
                }
            })
            .collect();

        Ok(Self {
            instance,
            definition,
            root,
            tasks,
            variables,
            subscriptions,
            jobs,
            incidents,
        })
    }

    /// Materialize the layout and write everything back into the aggregate
    pub(crate) fn commit(mut self, now: DateTime<Utc>) -> ProcessInstance {
        self.instance.updated_at = now;
        if self.instance.status == ProcessInstanceStatus::Ended {
            self.instance.executions = ExecutionTree::default();
            return self.instance;
        }

        let (tree, placement) = materialize(
            &self.root,
            &self.instance.id,
            &self.instance.process_definition_id,
        );
        let resolve = |owner: &Owner| -> Option<ExecutionId> {
            match owner {
                Owner::Scope(node) => placement.scope_of(node),
                Owner::Branch(node) => placement.branch_of(node),
                Owner::Leaf(node) => placement.representative.get(node),
            }
            .cloned()
        };

        // outer owners first, so on a shared execution the innermost variable survives
        let mut depths = HashMap::new();
        index_depths(&self.root, 0, &mut depths);
        self.variables
            .sort_by_key(|variable| owner_rank(&depths, &variable.owner));

        let mut variables: Vec<VariableInstance> = Vec::with_capacity(self.variables.len());
        let mut slots: HashMap<(ExecutionId, String), usize> = HashMap::new();
        for Owned { owner, mut item } in self.variables {
            let Some(execution_id) = resolve(&owner) else {
                warn!(variable = %item.name, "Dropping variable of a removed activity instance");
                continue;
            };
            item.activity_instance_id = tree
                .scope_of(&execution_id)
                .and_then(|scope| scope.scope_instance_id.clone())
                .unwrap_or_else(|| ActivityInstanceId::from(&self.instance.id));
            item.execution_id = execution_id.clone();
            match slots.get(&(execution_id.clone(), item.name.clone())) {
                Some(&slot) => {
                    let discarded = std::mem::replace(&mut variables[slot], item);
                    warn!(
                        variable = %discarded.name,
                        execution = %execution_id,
                        "Two variables of the same name resolved to one execution; the later write wins"
                    );
                    self.instance.record_event(Box::new(VariableOverwritten {
                        process_instance_id: self.instance.id.clone(),
                        execution_id,
                        name: discarded.name,
                        discarded_value: discarded.value,
                        kept_value: variables[slot].value.clone(),
                        timestamp: now,
                    }));
                }
                None => {
                    slots.insert((execution_id, item.name.clone()), variables.len());
                    variables.push(item);
                }
            }
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for Owned { owner, mut item } in self.tasks {
            let Some(execution_id) = resolve(&owner) else {
                warn!(task = %item.id, owner = %owner.node(), "Dropping task of a removed activity instance");
                continue;
            };
            item.execution_id = execution_id;
            item.activity_instance_id = owner.node().clone();
            tasks.push(item);
        }
        let subscriptions = self
            .subscriptions
            .into_iter()
            .filter_map(|Owned { owner, mut item }| {
                let Some(execution_id) = resolve(&owner) else {
                    warn!(subscription = %item.id, owner = %owner.node(), "Dropping subscription of a removed activity instance");
                    return None;
                };
                item.execution_id = execution_id;
                Some(item)
            })
            .collect();
        let jobs = self
            .jobs
            .into_iter()
            .filter_map(|Owned { owner, mut item }| {
                let Some(execution_id) = resolve(&owner) else {
                    warn!(job = %item.id, owner = %owner.node(), "Dropping job of a removed activity instance");
                    return None;
                };
                item.execution_id = execution_id;
                Some(item)
            })
            .collect();
        let incidents = self
            .incidents
            .into_iter()
            .filter_map(|Owned { owner, mut item }| {
                let Some(execution_id) = resolve(&owner) else {
                    warn!(incident = %item.id, owner = %owner.node(), "Dropping incident of a removed activity instance");
                    return None;
                };
                item.execution_id = execution_id;
                Some(item)
            })
            .collect();

        self.instance.executions = tree;
        self.instance.variables = variables;
        self.instance.tasks = tasks;
        self.instance.event_subscriptions = subscriptions;
        self.instance.jobs = jobs;
        self.instance.incidents = incidents;
        self.instance
    }

    /// Tentative placement of the current layout; pins the assigned ids
    pub(crate) fn placement(&mut self) -> Placement {
        let (_, placement) = materialize(
            &self.root,
            &self.instance.id,
            &self.instance.process_definition_id,
        );
        self.root.pin(&placement);
        placement
    }

    pub(crate) fn node(&self, id: &str) -> Result<&LayoutNode, EngineError> {
        self.root
            .find(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(format!("activity instance '{}'", id)))
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Result<&mut LayoutNode, EngineError> {
        self.root
            .find_mut(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(format!("activity instance '{}'", id)))
    }

    pub(crate) fn parent_id(&self, id: &str) -> Option<ActivityInstanceId> {
        self.root.parent_of(id).map(|parent| parent.instance_id.clone())
    }

    pub(crate) fn add_child(&mut self, parent: &str, node: LayoutNode) -> Result<(), EngineError> {
        self.node_mut(parent)?.children.push(node);
        Ok(())
    }

    /// Detach a node and drop all state owned by its subtree
    pub(crate) fn remove_node(&mut self, id: &str) -> Result<LayoutNode, EngineError> {
        let node = self
            .root
            .remove(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(format!("activity instance '{}'", id)))?;
        let ids = node.subtree_ids();
        self.remove_owned_by(&ids);
        Ok(node)
    }

    pub(crate) fn remove_owned_by(&mut self, ids: &HashSet<ActivityInstanceId>) {
        let owned = |owner: &Owner| ids.contains(owner.node());
        self.tasks.retain(|t| !owned(&t.owner));
        self.variables.retain(|v| !owned(&v.owner));
        self.subscriptions.retain(|s| !owned(&s.owner));
        let removed_jobs: HashSet<JobId> = self
            .jobs
            .iter()
            .filter(|j| owned(&j.owner))
            .map(|j| j.item.id.clone())
            .collect();
        self.jobs.retain(|j| !owned(&j.owner));
        self.incidents.retain(|i| {
            !owned(&i.owner) && !removed_jobs.iter().any(|job| i.item.is_for_job(job))
        });
    }

    /// Remove a job together with its incidents
    pub(crate) fn remove_job(&mut self, job_id: &JobId) -> Option<Owned<Job>> {
        let index = self.jobs.iter().position(|j| j.item.id == *job_id)?;
        let job = self.jobs.remove(index);
        self.incidents.retain(|i| !i.item.is_for_job(job_id));
        Some(job)
    }

    /// Variables visible from a node, inner scopes shadowing outer ones
    pub(crate) fn visible_variables(&self, id: &str) -> HashMap<String, DataPacket> {
        let path = self.root.path_to(id).unwrap_or_default();
        let mut visible = HashMap::new();
        for node in &path {
            // branch-local state sits between the enclosing scope and the node's own scope
            for owner in [Owner::Branch(node.clone()), Owner::Scope(node.clone())] {
                for variable in self.variables.iter().filter(|v| v.owner == owner) {
                    visible.insert(variable.item.name.clone(), variable.item.value.clone());
                }
            }
        }
        visible
    }

    /// Set a variable local to an owner; a later write replaces an earlier one
    pub(crate) fn set_local_variable(&mut self, owner: Owner, name: &str, value: DataPacket) {
        let existing = self
            .variables
            .iter()
            .position(|v| v.owner == owner && v.item.name == name);
        let id = match existing {
            Some(index) => self.variables.remove(index).item.id,
            None => VariableId::generate(),
        };
        self.variables.push(Owned {
            owner,
            item: VariableInstance {
                id,
                name: name.to_string(),
                value,
                execution_id: ExecutionId::new(""),
                activity_instance_id: ActivityInstanceId::new(""),
                process_instance_id: self.instance.id.clone(),
            },
        });
    }

    /// Set a variable where it is visible from `id`, or on the process instance otherwise
    pub(crate) fn set_variable_from(&mut self, id: &str, name: &str, value: DataPacket) {
        let path = self.root.path_to(id).unwrap_or_default();
        for node in path.iter().rev() {
            let holder = self.variables.iter().position(|v| {
                v.item.name == name
                    && matches!(&v.owner, Owner::Scope(o) | Owner::Branch(o) if o == node)
            });
            if let Some(index) = holder {
                self.variables[index].item.value = value;
                return;
            }
        }
        let root = self.root.instance_id.clone();
        self.set_local_variable(Owner::Scope(root), name, value);
    }

    /// Owner for state set on an execution by id
    pub(crate) fn owner_of_execution(&mut self, execution_id: &ExecutionId) -> Result<Owner, EngineError> {
        let placement = self.placement();
        if let Some((node, _)) = placement
            .scope_execution
            .iter()
            .find(|(_, execution)| *execution == execution_id)
        {
            return Ok(Owner::Scope(node.clone()));
        }
        if let Some((node, _)) = placement
            .branch_execution
            .iter()
            .find(|(_, execution)| *execution == execution_id)
        {
            return Ok(Owner::Branch(node.clone()));
        }
        Err(EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Create a user task for a node
    pub(crate) fn create_task(&mut self, node: &ActivityInstanceId, activity: &ActivityDefinition, now: DateTime<Utc>) {
        self.tasks.push(Owned {
            owner: Owner::Leaf(node.clone()),
            item: Task {
                id: TaskId::generate(),
                name: activity.name.clone(),
                task_definition_key: activity.id.clone(),
                activity_instance_id: node.clone(),
                execution_id: ExecutionId::new(""),
                process_instance_id: self.instance.id.clone(),
                process_definition_id: self.instance.process_definition_id.clone(),
                assignee: None,
                created_at: now,
            },
        });
    }

    /// Create the subscription or timer job a catching activity waits on
    pub(crate) fn create_trigger(
        &mut self,
        activity: &ActivityDefinition,
        owner: Owner,
        context: &ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        let now = context.clock.now();
        match &activity.event {
            Some(EventDefinition::Timer(timer)) => {
                let due_date = timer.due_date(now)?;
                debug!(activity = %activity.id, %due_date, "Scheduling timer");
                self.jobs.push(Owned {
                    owner,
                    item: self.new_job(activity, JobKind::Timer, Some(due_date), context),
                });
            }
            Some(event) => {
                let event_name = event.event_name().unwrap_or_default().to_string();
                debug!(activity = %activity.id, event = %event_name, "Subscribing to event");
                self.subscriptions.push(Owned {
                    owner,
                    item: EventSubscription {
                        id: EventSubscriptionId::generate(),
                        event_type: event.event_type(),
                        event_name,
                        activity_id: activity.id.clone(),
                        execution_id: ExecutionId::new(""),
                        process_instance_id: self.instance.id.clone(),
                        process_definition_id: self.instance.process_definition_id.clone(),
                        created_at: now,
                    },
                });
            }
            None => {}
        }
        Ok(())
    }

    /// Create the async continuation job of a transition node
    pub(crate) fn create_async_job(
        &mut self,
        node: &ActivityInstanceId,
        activity: &ActivityDefinition,
        position: AsyncPosition,
        context: &ExecutionContext<'_>,
    ) {
        let job = self.new_job(activity, JobKind::AsyncContinuation(position), None, context);
        self.jobs.push(Owned {
            owner: Owner::Leaf(node.clone()),
            item: job,
        });
    }

    fn new_job(
        &self,
        activity: &ActivityDefinition,
        kind: JobKind,
        due_date: Option<DateTime<Utc>>,
        context: &ExecutionContext<'_>,
    ) -> Job {
        Job {
            id: JobId::generate(),
            kind,
            activity_id: activity.id.clone(),
            execution_id: ExecutionId::new(""),
            process_instance_id: self.instance.id.clone(),
            process_definition_id: self.instance.process_definition_id.clone(),
            due_date,
            retries: context.config.default_job_retries,
            priority: activity
                .job_priority
                .unwrap_or(context.config.default_job_priority),
            exception_message: None,
        }
    }

    /// Book a failed attempt of a job; raises an incident when retries run out
    pub(crate) fn fail_job(&mut self, job_id: &JobId, message: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.item.id == *job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        job.item.retries = job.item.retries.saturating_sub(1);
        job.item.exception_message = Some(message.to_string());
        if job.item.retries > 0 {
            return Ok(());
        }
        let incident = Incident {
            id: IncidentId::generate(),
            incident_type: FAILED_JOB_INCIDENT.to_string(),
            configuration: job.item.id.0.clone(),
            message: Some(message.to_string()),
            activity_id: job.item.activity_id.clone(),
            execution_id: job.item.execution_id.clone(),
            process_instance_id: job.item.process_instance_id.clone(),
            process_definition_id: job.item.process_definition_id.clone(),
            created_at: now,
        };
        let owner = job.owner.clone();
        warn!(job = %job_id, activity = %incident.activity_id, "Job out of retries, raising incident");
        self.instance.record_event(Box::new(IncidentCreated {
            process_instance_id: self.instance.id.clone(),
            incident_id: incident.id.clone(),
            job_id: job_id.clone(),
            activity_id: incident.activity_id.clone(),
            timestamp: now,
        }));
        self.incidents.push(Owned {
            owner,
            item: incident,
        });
        Ok(())
    }

    /// Invoke the listeners an activity declares for a lifecycle event
    pub(crate) fn invoke_listeners(
        &mut self,
        node: &ActivityInstanceId,
        activity: &ActivityDefinition,
        event: ListenerEvent,
        context: &ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        if context.skip_custom_listeners {
            return Ok(());
        }
        let names: Vec<String> = activity.listeners_for(event).map(str::to_string).collect();
        if names.is_empty() {
            return Ok(());
        }
        let delegate_context = self.delegate_context(node, &activity.id, Some(event));
        for name in names {
            let listener = context.delegates.listener(&name)?;
            listener
                .notify(&delegate_context)
                .map_err(|message| EngineError::ListenerFailed {
                    listener: name.clone(),
                    activity_id: activity.id.to_string(),
                    message,
                })?;
        }
        Ok(())
    }

    pub(crate) fn delegate_context(
        &mut self,
        node: &ActivityInstanceId,
        activity_id: &ActivityId,
        event: Option<ListenerEvent>,
    ) -> DelegateContext {
        let placement = self.placement();
        DelegateContext {
            process_instance_id: self.instance.id.clone(),
            process_definition_id: self.instance.process_definition_id.clone(),
            activity_id: activity_id.clone(),
            activity_instance_id: node.clone(),
            execution_id: placement.representative.get(node).cloned(),
            event,
            variables: self.visible_variables(node),
        }
    }

    /// Apply input parameters of a scope node, reading from its parent
    pub(crate) fn apply_inputs(
        &mut self,
        node: &ActivityInstanceId,
        activity: &ActivityDefinition,
        context: &ExecutionContext<'_>,
    ) {
        if context.skip_io_mappings || activity.input_parameters.is_empty() {
            return;
        }
        let source = self
            .parent_id(node)
            .map(|parent| self.visible_variables(&parent))
            .unwrap_or_default();
        for parameter in &activity.input_parameters {
            let value = evaluate_parameter(parameter, &source);
            self.set_local_variable(Owner::Scope(node.clone()), &parameter.name, value);
        }
    }

    /// Apply output parameters of a scope node, writing to `target`
    pub(crate) fn apply_outputs(
        &mut self,
        node: &ActivityInstanceId,
        activity: &ActivityDefinition,
        target: Owner,
        context: &ExecutionContext<'_>,
    ) {
        if context.skip_io_mappings || activity.output_parameters.is_empty() {
            return;
        }
        let source = self.visible_variables(node);
        for parameter in &activity.output_parameters {
            let value = evaluate_parameter(parameter, &source);
            self.set_local_variable(target.clone(), &parameter.name, value);
        }
    }
}

fn evaluate_parameter(parameter: &IoParameter, source: &HashMap<String, DataPacket>) -> DataPacket {
    match &parameter.source {
        IoSource::Value(value) => value.clone(),
        IoSource::Variable(name) => source.get(name).cloned().unwrap_or_else(DataPacket::null),
    }
}

fn index_depths(node: &LayoutNode, depth: usize, depths: &mut HashMap<ActivityInstanceId, usize>) {
    depths.insert(node.instance_id.clone(), depth);
    for child in &node.children {
        index_depths(child, depth + 1, depths);
    }
}

/// Branch-local state sits between the parent scope and the node's own scope
fn owner_rank(depths: &HashMap<ActivityInstanceId, usize>, owner: &Owner) -> usize {
    match owner {
        Owner::Branch(node) => depths.get(node).map_or(0, |depth| depth * 2),
        Owner::Scope(node) | Owner::Leaf(node) => {
            depths.get(node).map_or(0, |depth| depth * 2 + 1)
        }
    }
}

fn orphan(kind: &str, id: &str, execution: &ExecutionId) -> EngineError {
    EngineError::StateStoreError(format!(
        "{} '{}' references execution '{}' which does not hold its activity",
        kind, id, execution
    ))
}
