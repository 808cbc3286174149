//! Token interpreter driving process instances between wait states
//!
//! Work is queued as [`Operation`]s on an agenda and executed until the
//! instance reaches its next wait state (user task, event trigger, async job)
//! or ends. All effects go through the [`WorkingState`].

use crate::application::working_state::{ExecutionContext, Owner, WorkingState};
use crate::domain::events::{ProcessInstanceEnded, ProcessInstanceStarted};
use crate::domain::execution::{AsyncPosition, TransitionState};
use crate::domain::ids::{ActivityId, ActivityInstanceId, EventSubscriptionId, JobId, TaskId};
use crate::domain::job::JobKind;
use crate::domain::layout::{LayoutNode, NodeState};
use crate::domain::process_definition::{ActivityDefinition, ActivityKind, ListenerEvent};
use crate::domain::process_instance::ProcessInstanceStatus;
use crate::{DataPacket, EngineError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Operation {
    /// Arrive at an activity, possibly parking before it
    Enter {
        parent: ActivityInstanceId,
        activity: ActivityId,
        flow: Option<String>,
    },
    /// Instantiate an activity and run its behaviour
    Activate {
        parent: ActivityInstanceId,
        activity: ActivityId,
    },
    /// End an activity instance and continue after it
    Leave(ActivityInstanceId),
    /// Follow the outgoing sequence flows of an activity
    TakeOutgoing {
        parent: ActivityInstanceId,
        activity: ActivityId,
    },
    /// End a scope whose last child has left
    CompleteScope(ActivityInstanceId),
    /// Instantiate an event sub process and enter its start event
    StartEventSubProcess {
        scope: ActivityInstanceId,
        start_event: ActivityId,
    },
}

/// Interpreter over one working state
pub(crate) struct Interpreter<'s, 'c> {
    state: &'s mut WorkingState,
    context: &'s ExecutionContext<'c>,
    agenda: VecDeque<Operation>,
}

impl<'s, 'c> Interpreter<'s, 'c> {
    pub(crate) fn new(state: &'s mut WorkingState, context: &'s ExecutionContext<'c>) -> Self {
        Self {
            state,
            context,
            agenda: VecDeque::new(),
        }
    }

    /// Start a freshly created instance at the none start event of the process
    pub(crate) fn start(mut self, variables: HashMap<String, DataPacket>) -> Result<(), EngineError> {
        let definition = self.state.definition.clone();
        let root = self.state.root.instance_id.clone();
        let root_activity = definition.require(definition.root_id())?.clone();
        let start = definition
            .none_start_event(definition.root_id())
            .ok_or_else(|| {
                EngineError::BadUserRequest(format!(
                    "Process definition '{}' has no none start event",
                    definition.id
                ))
            })?
            .id
            .clone();

        for (name, value) in sorted(variables) {
            self.state
                .set_local_variable(Owner::Scope(root.clone()), &name, value);
        }
        for trigger in definition.scope_triggers(definition.root_id()) {
            self.state
                .create_trigger(trigger, Owner::Scope(root.clone()), self.context)?;
        }
        self.state
            .invoke_listeners(&root, &root_activity, ListenerEvent::Start, self.context)?;

        let now = self.context.clock.now();
        self.state.instance.record_event(Box::new(ProcessInstanceStarted {
            process_instance_id: self.state.instance.id.clone(),
            process_definition_id: definition.id.clone(),
            timestamp: now,
        }));
        self.agenda.push_back(Operation::Enter {
            parent: root,
            activity: start,
            flow: None,
        });
        self.run()
    }

    /// Complete a user task and continue after it
    pub(crate) fn complete_task(
        mut self,
        task_id: &TaskId,
        variables: HashMap<String, DataPacket>,
    ) -> Result<(), EngineError> {
        let index = self
            .state
            .tasks
            .iter()
            .position(|task| task.item.id == *task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let node = self.state.tasks.remove(index).owner.node().clone();
        for (name, value) in sorted(variables) {
            self.state.set_variable_from(&node, &name, value);
        }
        self.agenda.push_back(Operation::Leave(node));
        self.run()
    }

    /// Deliver an event to the activity holding the subscription
    pub(crate) fn trigger_subscription(
        mut self,
        subscription_id: &EventSubscriptionId,
        variables: HashMap<String, DataPacket>,
    ) -> Result<(), EngineError> {
        let subscription = self
            .state
            .subscriptions
            .iter()
            .find(|s| s.item.id == *subscription_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::BadUserRequest(format!(
                    "Event subscription '{}' does not exist",
                    subscription_id
                ))
            })?;
        let activity = self
            .state
            .definition
            .require(&subscription.item.activity_id)?
            .clone();
        for (name, value) in sorted(variables) {
            self.state
                .set_variable_from(subscription.owner.node(), &name, value);
        }
        if !activity.cancel_activity && !activity.has_own_trigger() {
            trace!(activity = %activity.id, "Non-interrupting trigger keeps its subscription");
        } else {
            self.state
                .subscriptions
                .retain(|s| s.item.id != *subscription_id);
        }
        self.trigger(&activity, subscription.owner)?;
        self.run()
    }

    /// Execute a job: fire a timer or continue past an async boundary
    pub(crate) fn execute_job(mut self, job_id: &JobId) -> Result<(), EngineError> {
        let job = self
            .state
            .remove_job(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        let activity = self.state.definition.require(&job.item.activity_id)?.clone();
        debug!(job = %job_id, activity = %activity.id, kind = ?job.item.kind, "Executing job");

        match job.item.kind {
            JobKind::Timer => self.trigger(&activity, job.owner)?,
            JobKind::AsyncContinuation(position) => {
                let node = job.owner.node().clone();
                let parent = self.parent_of(&node)?;
                self.state.remove_node(&node)?;
                let operation = match position {
                    AsyncPosition::Before => Operation::Activate {
                        parent,
                        activity: activity.id.clone(),
                    },
                    AsyncPosition::After => Operation::TakeOutgoing {
                        parent,
                        activity: activity.id.clone(),
                    },
                };
                self.agenda.push_back(operation);
            }
        }
        self.run()
    }

    fn trigger(&mut self, activity: &ActivityDefinition, owner: Owner) -> Result<(), EngineError> {
        let node = owner.node().clone();
        match activity.kind {
            ActivityKind::BoundaryEvent => {
                let parent = self.parent_of(&node)?;
                if activity.cancel_activity {
                    debug!(boundary = %activity.id, host = %node, "Interrupting boundary event");
                    self.cancel(&node)?;
                }
                self.agenda.push_back(Operation::Enter {
                    parent,
                    activity: activity.id.clone(),
                    flow: None,
                });
            }
            ActivityKind::StartEvent => {
                if activity.cancel_activity {
                    debug!(start_event = %activity.id, scope = %node, "Interrupting event sub process");
                    let children: Vec<ActivityInstanceId> = self
                        .state
                        .node(&node)?
                        .children
                        .iter()
                        .map(|child| child.instance_id.clone())
                        .collect();
                    for child in children {
                        self.cancel(&child)?;
                    }
                    let definition = self.state.definition.clone();
                    let is_start = |id: &ActivityId| {
                        definition
                            .activity(id)
                            .is_some_and(|a| a.kind == ActivityKind::StartEvent)
                    };
                    let scope_owner = Owner::Scope(node.clone());
                    self.state
                        .subscriptions
                        .retain(|s| s.owner != scope_owner || !is_start(&s.item.activity_id));
                    let jobs: Vec<JobId> = self
                        .state
                        .jobs
                        .iter()
                        .filter(|j| j.owner == scope_owner && is_start(&j.item.activity_id))
                        .map(|j| j.item.id.clone())
                        .collect();
                    for job in jobs {
                        self.state.remove_job(&job);
                    }
                }
                self.agenda.push_back(Operation::StartEventSubProcess {
                    scope: node,
                    start_event: activity.id.clone(),
                });
            }
            _ => {
                self.state.subscriptions.retain(|s| s.owner != owner);
                self.agenda.push_back(Operation::Leave(node));
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), EngineError> {
        while let Some(operation) = self.agenda.pop_front() {
            trace!(?operation, "Executing operation");
            match operation {
                Operation::Enter {
                    parent,
                    activity,
                    flow,
                } => self.enter(parent, activity, flow)?,
                Operation::Activate { parent, activity } => {
                    self.activate(&parent, &activity)?;
                }
                Operation::Leave(node) => self.leave(&node)?,
                Operation::TakeOutgoing { parent, activity } => {
                    let outgoing = self.state.definition.outgoing(&activity);
                    if outgoing.is_empty() {
                        self.agenda.push_back(Operation::CompleteScope(parent));
                    } else {
                        for flow in outgoing {
                            self.agenda.push_back(Operation::Enter {
                                parent: parent.clone(),
                                activity: flow.target.clone(),
                                flow: Some(flow.id.clone()),
                            });
                        }
                    }
                }
                Operation::CompleteScope(scope) => self.complete_scope(&scope)?,
                Operation::StartEventSubProcess { scope, start_event } => {
                    let container = self
                        .state
                        .definition
                        .flow_scope(&start_event)
                        .cloned()
                        .ok_or_else(|| {
                            EngineError::ValidationError(format!(
                                "Start event '{}' has no event sub process",
                                start_event
                            ))
                        })?;
                    let event_sub_process = self.activate(&scope, &container)?;
                    self.agenda.push_back(Operation::Enter {
                        parent: event_sub_process,
                        activity: start_event,
                        flow: None,
                    });
                }
            }
        }
        Ok(())
    }

    fn enter(
        &mut self,
        parent: ActivityInstanceId,
        activity: ActivityId,
        flow: Option<String>,
    ) -> Result<(), EngineError> {
        let definition = self.state.definition.clone();
        let activity = definition.require(&activity)?;
        if !activity.async_before {
            self.agenda.push_back(Operation::Activate {
                parent,
                activity: activity.id.clone(),
            });
            return Ok(());
        }
        let id = new_instance_id(&activity.id);
        self.state.add_child(
            &parent,
            LayoutNode::leaf(
                id.clone(),
                activity.id.clone(),
                NodeState::Transition(TransitionState {
                    position: AsyncPosition::Before,
                    sequence_flow: flow,
                }),
            ),
        )?;
        self.state
            .create_async_job(&id, activity, AsyncPosition::Before, self.context);
        Ok(())
    }

    /// Create the activity instance, then run the activity's behaviour
    fn activate(
        &mut self,
        parent: &str,
        activity: &ActivityId,
    ) -> Result<ActivityInstanceId, EngineError> {
        let definition = self.state.definition.clone();
        let activity = definition.require(activity)?;
        let id = new_instance_id(&activity.id);
        let node = if activity.is_scope {
            LayoutNode::scope(id.clone(), activity.id.clone())
        } else {
            LayoutNode::leaf(id.clone(), activity.id.clone(), NodeState::Active)
        };
        self.state.add_child(parent, node)?;
        if activity.is_scope {
            self.state.apply_inputs(&id, activity, self.context);
            for trigger in definition.scope_triggers(&activity.id) {
                self.state
                    .create_trigger(trigger, Owner::Scope(id.clone()), self.context)?;
            }
        }
        self.state
            .invoke_listeners(&id, activity, ListenerEvent::Start, self.context)?;

        match activity.kind {
            ActivityKind::UserTask => {
                let now = self.context.clock.now();
                self.state.create_task(&id, activity, now);
            }
            ActivityKind::ReceiveTask | ActivityKind::IntermediateCatchEvent
                if activity.event.is_some() =>
            {
                self.state
                    .create_trigger(activity, Owner::Leaf(id.clone()), self.context)?;
            }
            ActivityKind::ReceiveTask => {}
            ActivityKind::ServiceTask => {
                self.execute_service(&id, activity)?;
                self.agenda.push_back(Operation::Leave(id.clone()));
            }
            ActivityKind::ParallelGateway => self.join(&id, parent, activity)?,
            ActivityKind::SubProcess => match definition.none_start_event(&activity.id) {
                Some(start) => self.agenda.push_back(Operation::Enter {
                    parent: id.clone(),
                    activity: start.id.clone(),
                    flow: None,
                }),
                None => self.agenda.push_back(Operation::CompleteScope(id.clone())),
            },
            ActivityKind::EventSubProcess => {}
            ActivityKind::Process
            | ActivityKind::StartEvent
            | ActivityKind::EndEvent
            | ActivityKind::BoundaryEvent
            | ActivityKind::IntermediateCatchEvent => {
                self.agenda.push_back(Operation::Leave(id.clone()));
            }
        }
        Ok(id)
    }

    fn execute_service(
        &mut self,
        id: &ActivityInstanceId,
        activity: &ActivityDefinition,
    ) -> Result<(), EngineError> {
        let name = activity.delegate.as_deref().ok_or_else(|| {
            EngineError::ValidationError(format!("Service task '{}' has no delegate", activity.id))
        })?;
        let delegate = self.context.delegates.service(name)?;
        let delegate_context = self.state.delegate_context(id, &activity.id, None);
        let results = delegate
            .execute(&delegate_context)
            .map_err(|message| EngineError::DelegateFailed {
                delegate: name.to_string(),
                activity_id: activity.id.to_string(),
                message,
            })?;
        for (variable, value) in sorted(results) {
            self.state.set_variable_from(id, &variable, value);
        }
        Ok(())
    }

    fn join(
        &mut self,
        id: &ActivityInstanceId,
        parent: &str,
        gateway: &ActivityDefinition,
    ) -> Result<(), EngineError> {
        let incoming = self.state.definition.incoming(&gateway.id).len();
        if incoming <= 1 {
            self.agenda.push_back(Operation::Leave(id.clone()));
            return Ok(());
        }
        self.state.node_mut(id)?.state = NodeState::Waiting;
        let arrived: Vec<ActivityInstanceId> = self
            .state
            .node(parent)?
            .children
            .iter()
            .filter(|child| child.activity_id == gateway.id && child.state == NodeState::Waiting)
            .map(|child| child.instance_id.clone())
            .collect();
        trace!(gateway = %gateway.id, arrived = arrived.len(), incoming, "Token arrived at join");
        if arrived.len() < incoming {
            return Ok(());
        }
        for other in arrived.iter().filter(|other| *other != id).take(incoming - 1) {
            self.state.remove_node(other)?;
        }
        self.state.node_mut(id)?.state = NodeState::Active;
        self.agenda.push_back(Operation::Leave(id.clone()));
        Ok(())
    }

    fn leave(&mut self, id: &ActivityInstanceId) -> Result<(), EngineError> {
        let definition = self.state.definition.clone();
        let node = self.state.node(id)?;
        let is_scope = node.is_scope;
        let activity = definition.require(&node.activity_id)?;
        let parent = self.parent_of(id)?;

        self.state
            .invoke_listeners(id, activity, ListenerEvent::End, self.context)?;
        if is_scope {
            self.state
                .apply_outputs(id, activity, Owner::Scope(parent.clone()), self.context);
        }
        self.state.remove_node(id)?;

        if activity.async_after {
            let transition = new_instance_id(&activity.id);
            // a single outgoing flow is the one the token will take
            let outgoing = definition.outgoing(&activity.id);
            let sequence_flow = match outgoing.as_slice() {
                [flow] => Some(flow.id.clone()),
                _ => None,
            };
            self.state.add_child(
                &parent,
                LayoutNode::leaf(
                    transition.clone(),
                    activity.id.clone(),
                    NodeState::Transition(TransitionState {
                        position: AsyncPosition::After,
                        sequence_flow,
                    }),
                ),
            )?;
            self.state
                .create_async_job(&transition, activity, AsyncPosition::After, self.context);
        } else {
            self.agenda.push_back(Operation::TakeOutgoing {
                parent,
                activity: activity.id.clone(),
            });
        }
        Ok(())
    }

    fn complete_scope(&mut self, scope: &ActivityInstanceId) -> Result<(), EngineError> {
        let Some(node) = self.state.root.find(scope) else {
            return Ok(());
        };
        if !node.children.is_empty() {
            return Ok(());
        }
        if *scope != self.state.root.instance_id {
            self.agenda.push_back(Operation::Leave(scope.clone()));
            return Ok(());
        }

        let definition = self.state.definition.clone();
        let root_activity = definition.require(definition.root_id())?;
        self.state
            .invoke_listeners(scope, root_activity, ListenerEvent::End, self.context)?;
        self.state.root.children.clear();
        self.state.tasks.clear();
        self.state.variables.clear();
        self.state.subscriptions.clear();
        self.state.jobs.clear();
        self.state.incidents.clear();
        self.state.instance.status = ProcessInstanceStatus::Ended;
        debug!(process_instance = %self.state.instance.id, "Process instance ended");
        let now = self.context.clock.now();
        self.state.instance.record_event(Box::new(ProcessInstanceEnded {
            process_instance_id: self.state.instance.id.clone(),
            timestamp: now,
        }));
        self.agenda.clear();
        Ok(())
    }

    /// End a subtree without taking any outgoing flow
    fn cancel(&mut self, id: &ActivityInstanceId) -> Result<(), EngineError> {
        let definition = self.state.definition.clone();
        let node = self.state.node(id)?;
        let children: Vec<ActivityInstanceId> = node
            .children
            .iter()
            .map(|child| child.instance_id.clone())
            .collect();
        let activity_id = node.activity_id.clone();
        for child in children {
            self.cancel(&child)?;
        }
        let activity = definition.require(&activity_id)?;
        self.state
            .invoke_listeners(id, activity, ListenerEvent::End, self.context)?;
        self.state.remove_node(id)?;
        Ok(())
    }

    fn parent_of(&self, id: &str) -> Result<ActivityInstanceId, EngineError> {
        self.state.parent_id(id).ok_or_else(|| {
            EngineError::ExecutionNotFound(format!("parent of activity instance '{}'", id))
        })
    }
}

/// Activity instance ids take the form `<activityId>:<uuid>`
pub(crate) fn new_instance_id(activity: &ActivityId) -> ActivityInstanceId {
    ActivityInstanceId::new(format!("{}:{}", activity, Uuid::new_v4()))
}

fn sorted(variables: HashMap<String, DataPacket>) -> BTreeMap<String, DataPacket> {
    variables.into_iter().collect()
}
