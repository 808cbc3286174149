use crate::domain::ids::{ActivityId, ProcessDefinitionId};
use crate::{DataPacket, EngineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Kind of a flow node or scope in a process definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    /// The process itself (root scope)
    Process,
    /// Start event (none or event-triggered inside an event sub process)
    StartEvent,
    /// End event
    EndEvent,
    /// User task, waits for task completion
    UserTask,
    /// Receive task, waits for a message
    ReceiveTask,
    /// Service task, invokes a delegate
    ServiceTask,
    /// Intermediate catching event
    IntermediateCatchEvent,
    /// Boundary event attached to an activity
    BoundaryEvent,
    /// Parallel gateway (fork and/or join)
    ParallelGateway,
    /// Embedded sub process
    SubProcess,
    /// Event sub process
    EventSubProcess,
}

impl ActivityKind {
    /// Canonical type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ActivityKind::Process => "process",
            ActivityKind::StartEvent => "startEvent",
            ActivityKind::EndEvent => "noneEndEvent",
            ActivityKind::UserTask => "userTask",
            ActivityKind::ReceiveTask => "receiveTask",
            ActivityKind::ServiceTask => "serviceTask",
            ActivityKind::IntermediateCatchEvent => "intermediateCatchEvent",
            ActivityKind::BoundaryEvent => "boundaryEvent",
            ActivityKind::ParallelGateway => "parallelGateway",
            ActivityKind::SubProcess => "subProcess",
            ActivityKind::EventSubProcess => "eventSubProcess",
        }
    }

    /// Whether activities of this kind always own a scope execution
    pub fn is_always_scope(&self) -> bool {
        matches!(
            self,
            ActivityKind::Process | ActivityKind::SubProcess | ActivityKind::EventSubProcess
        )
    }

    /// Whether the kind is a catching event node
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            ActivityKind::StartEvent
                | ActivityKind::BoundaryEvent
                | ActivityKind::IntermediateCatchEvent
        )
    }
}

/// Event trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Message correlation
    Message,
    /// Broadcast signal
    Signal,
    /// Timer job
    Timer,
    /// Conditional event
    Conditional,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Message => "message",
            EventType::Signal => "signal",
            EventType::Timer => "timer",
            EventType::Conditional => "conditional",
        };
        f.write_str(name)
    }
}

/// When a timer fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerDefinition {
    /// Relative to the moment the timer is created
    Duration(std::time::Duration),
    /// Absolute point in time
    Date(DateTime<Utc>),
}

impl TimerDefinition {
    /// Compute the due date relative to `now`
    pub fn due_date(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
        match self {
            TimerDefinition::Date(date) => Ok(*date),
            TimerDefinition::Duration(duration) => chrono::Duration::from_std(*duration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| {
                    EngineError::ValidationError(format!(
                        "Timer duration {:?} is out of range",
                        duration
                    ))
                }),
        }
    }
}

/// Event definition of a catching node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventDefinition {
    /// Message with a name
    Message(String),
    /// Signal with a name
    Signal(String),
    /// Timer
    Timer(TimerDefinition),
    /// Condition expression
    Conditional(String),
}

impl EventDefinition {
    /// Trigger type of this definition
    pub fn event_type(&self) -> EventType {
        match self {
            EventDefinition::Message(_) => EventType::Message,
            EventDefinition::Signal(_) => EventType::Signal,
            EventDefinition::Timer(_) => EventType::Timer,
            EventDefinition::Conditional(_) => EventType::Conditional,
        }
    }

    /// Subscription name, absent for timers
    pub fn event_name(&self) -> Option<&str> {
        match self {
            EventDefinition::Message(name)
            | EventDefinition::Signal(name)
            | EventDefinition::Conditional(name) => Some(name),
            EventDefinition::Timer(_) => None,
        }
    }
}

/// Lifecycle point an execution listener is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerEvent {
    /// Activity instance started
    Start,
    /// Activity instance ended
    End,
}

impl fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerEvent::Start => f.write_str("start"),
            ListenerEvent::End => f.write_str("end"),
        }
    }
}

/// Execution listener attached to an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDefinition {
    /// Lifecycle event
    pub event: ListenerEvent,
    /// Name under which the listener is registered
    pub delegate: String,
}

/// Source of an input/output parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IoSource {
    /// Constant value
    Value(DataPacket),
    /// Value of a variable visible from the activity
    Variable(String),
}

/// Input or output parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoParameter {
    /// Target variable name
    pub name: String,
    /// Where the value comes from
    pub source: IoSource,
}

/// Sequence flow between two flow nodes of the same scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    /// Flow id
    pub id: String,
    /// Source node
    pub source: ActivityId,
    /// Target node
    pub target: ActivityId,
}

/// A flow node, sub process, or the process itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    /// Activity id, unique within the definition
    pub id: ActivityId,
    /// Display name
    pub name: Option<String>,
    /// Activity kind
    pub kind: ActivityKind,
    /// Enclosing scope; `None` only for the process root
    pub flow_scope: Option<ActivityId>,
    /// Host activity of a boundary event
    pub attached_to: Option<ActivityId>,
    /// Interrupting boundary / event sub process start
    pub cancel_activity: bool,
    /// Event definition of catching nodes
    pub event: Option<EventDefinition>,
    /// Asynchronous continuation before the activity
    pub async_before: bool,
    /// Asynchronous continuation after the activity
    pub async_after: bool,
    /// Priority of jobs created for this activity
    pub job_priority: Option<i64>,
    /// Service delegate name
    pub delegate: Option<String>,
    /// Execution listeners
    pub listeners: Vec<ListenerDefinition>,
    /// Input parameters, applied on scope entry
    pub input_parameters: Vec<IoParameter>,
    /// Output parameters, applied on scope exit
    pub output_parameters: Vec<IoParameter>,
    /// Whether instances own a scope execution; computed on build
    pub is_scope: bool,
}

impl ActivityDefinition {
    fn new(id: ActivityId, kind: ActivityKind, flow_scope: Option<ActivityId>) -> Self {
        Self {
            id,
            name: None,
            kind,
            flow_scope,
            attached_to: None,
            cancel_activity: true,
            event: None,
            async_before: false,
            async_after: false,
            job_priority: None,
            delegate: None,
            listeners: Vec::new(),
            input_parameters: Vec::new(),
            output_parameters: Vec::new(),
            is_scope: kind.is_always_scope(),
        }
    }

    /// Detailed type name, distinguishing event flavours
    pub fn type_name(&self) -> &'static str {
        let event = self.event.as_ref().map(EventDefinition::event_type);
        match (self.kind, event) {
            (ActivityKind::BoundaryEvent, Some(EventType::Message)) => "boundaryMessage",
            (ActivityKind::BoundaryEvent, Some(EventType::Signal)) => "boundarySignal",
            (ActivityKind::BoundaryEvent, Some(EventType::Timer)) => "boundaryTimer",
            (ActivityKind::BoundaryEvent, Some(EventType::Conditional)) => "boundaryConditional",
            (ActivityKind::StartEvent, Some(EventType::Message)) => "messageStartEvent",
            (ActivityKind::StartEvent, Some(EventType::Signal)) => "signalStartEvent",
            (ActivityKind::StartEvent, Some(EventType::Timer)) => "startTimerEvent",
            (ActivityKind::StartEvent, Some(EventType::Conditional)) => "conditionalStartEvent",
            (ActivityKind::IntermediateCatchEvent, Some(EventType::Message)) => {
                "intermediateMessageCatch"
            }
            (ActivityKind::IntermediateCatchEvent, Some(EventType::Signal)) => {
                "intermediateSignalCatch"
            }
            (ActivityKind::IntermediateCatchEvent, Some(EventType::Timer)) => "intermediateTimer",
            (ActivityKind::IntermediateCatchEvent, Some(EventType::Conditional)) => {
                "intermediateConditionalCatch"
            }
            (kind, _) => kind.type_name(),
        }
    }

    /// Listener names registered for a lifecycle event, in declaration order
    pub fn listeners_for(&self, event: ListenerEvent) -> impl Iterator<Item = &str> {
        self.listeners
            .iter()
            .filter(move |listener| listener.event == event)
            .map(|listener| listener.delegate.as_str())
    }

    /// Whether this node waits for a trigger of its own (receive task, catch event)
    pub fn has_own_trigger(&self) -> bool {
        self.event.is_some()
            && matches!(
                self.kind,
                ActivityKind::ReceiveTask | ActivityKind::IntermediateCatchEvent
            )
    }
}

/// Immutable process definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Definition id
    pub id: ProcessDefinitionId,
    /// Definition key, shared by all versions
    pub key: String,
    /// Version within the key
    pub version: u32,
    /// Display name
    pub name: Option<String>,
    root_id: ActivityId,
    activities: Vec<ActivityDefinition>,
    sequence_flows: Vec<SequenceFlow>,
}

impl ProcessDefinition {
    /// Start building a definition with the given key
    pub fn builder(key: impl Into<String>) -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder::new(key)
    }

    /// Id of the root activity (the process itself)
    pub fn root_id(&self) -> &ActivityId {
        &self.root_id
    }

    /// All activities in declaration order, root first
    pub fn activities(&self) -> &[ActivityDefinition] {
        &self.activities
    }

    /// All sequence flows
    pub fn sequence_flows(&self) -> &[SequenceFlow] {
        &self.sequence_flows
    }

    /// Look up an activity by id
    pub fn activity(&self, id: &str) -> Option<&ActivityDefinition> {
        self.activities.iter().find(|activity| activity.id == *id)
    }

    /// Look up an activity, failing when the definition does not contain it
    pub fn require(&self, id: &str) -> Result<&ActivityDefinition, EngineError> {
        self.activity(id).ok_or_else(|| {
            EngineError::ValidationError(format!(
                "Activity '{}' does not exist in process definition '{}'",
                id, self.id
            ))
        })
    }

    /// Whether `id` names the process root
    pub fn is_root(&self, id: &str) -> bool {
        self.root_id == *id
    }

    /// Flow scope of an activity
    pub fn flow_scope(&self, id: &str) -> Option<&ActivityId> {
        self.activity(id).and_then(|activity| activity.flow_scope.as_ref())
    }

    /// Proper ancestors of an activity, innermost first, ending with the root
    pub fn ancestors(&self, id: &str) -> Vec<ActivityId> {
        let mut chain = Vec::new();
        let mut current = self.flow_scope(id);
        while let Some(scope) = current {
            chain.push(scope.clone());
            current = self.flow_scope(scope.as_str());
        }
        chain
    }

    /// Whether `ancestor` strictly encloses `id`
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        self.ancestors(id).iter().any(|scope| scope == ancestor)
    }

    /// Child activities of a scope in declaration order
    pub fn children(&self, scope: &str) -> impl Iterator<Item = &ActivityDefinition> + '_ {
        let scope = scope.to_string();
        self.activities
            .iter()
            .filter(move |activity| activity.flow_scope.as_deref() == Some(scope.as_str()))
    }

    /// Scope whose instance must exist for the activity's trigger to be active
    pub fn event_scope(&self, id: &str) -> Option<ActivityId> {
        let activity = self.activity(id)?;
        match activity.kind {
            ActivityKind::BoundaryEvent => activity.attached_to.clone(),
            ActivityKind::StartEvent if activity.event.is_some() => {
                let container = self.activity(activity.flow_scope.as_deref()?)?;
                if container.kind == ActivityKind::EventSubProcess {
                    container.flow_scope.clone()
                } else {
                    None
                }
            }
            ActivityKind::IntermediateCatchEvent | ActivityKind::ReceiveTask
                if activity.event.is_some() =>
            {
                Some(activity.id.clone())
            }
            _ => None,
        }
    }

    /// Whether the activity carries a trigger that lives as long as its event scope
    pub fn has_persistent_trigger(&self, id: &str) -> bool {
        self.activity(id).is_some_and(|activity| activity.event.is_some())
            && self.event_scope(id).is_some()
    }

    /// Boundary events and event sub process starts that activate with a scope
    pub fn scope_triggers(&self, scope: &str) -> Vec<&ActivityDefinition> {
        self.activities
            .iter()
            .filter(|activity| {
                matches!(
                    activity.kind,
                    ActivityKind::BoundaryEvent | ActivityKind::StartEvent
                ) && activity.event.is_some()
                    && self.event_scope(activity.id.as_str()).as_deref() == Some(scope)
            })
            .collect()
    }

    /// The none start event of a scope
    pub fn none_start_event(&self, scope: &str) -> Option<&ActivityDefinition> {
        self.children(scope)
            .find(|activity| activity.kind == ActivityKind::StartEvent && activity.event.is_none())
    }

    /// First start event of an event sub process
    pub fn event_sub_process_start(&self, event_sub_process: &str) -> Option<&ActivityDefinition> {
        self.children(event_sub_process)
            .find(|activity| activity.kind == ActivityKind::StartEvent)
    }

    /// Outgoing sequence flows of a node
    pub fn outgoing(&self, id: &str) -> Vec<&SequenceFlow> {
        self.sequence_flows
            .iter()
            .filter(|flow| flow.source == *id)
            .collect()
    }

    /// Incoming sequence flows of a node
    pub fn incoming(&self, id: &str) -> Vec<&SequenceFlow> {
        self.sequence_flows
            .iter()
            .filter(|flow| flow.target == *id)
            .collect()
    }
}

/// Fluent builder for process definitions
///
/// Nodes added in succession are connected by sequence flows. Nested scopes are
/// built inside closures, and modifiers apply to the most recently added node.
#[derive(Debug, Clone)]
pub struct ProcessDefinitionBuilder {
    key: String,
    name: Option<String>,
    version: u32,
    activities: Vec<ActivityDefinition>,
    flows: Vec<SequenceFlow>,
    scope: ActivityId,
    cursor: Option<ActivityId>,
    last: Option<ActivityId>,
    errors: Vec<String>,
}

impl ProcessDefinitionBuilder {
    /// Create a builder for a process with the given key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let root_id = ActivityId::new(key.clone());
        Self {
            key,
            name: None,
            version: 1,
            activities: vec![ActivityDefinition::new(
                root_id.clone(),
                ActivityKind::Process,
                None,
            )],
            flows: Vec::new(),
            scope: root_id,
            cursor: None,
            last: None,
            errors: Vec::new(),
        }
    }

    /// Key of the process being built
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Set the version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the process display name
    pub fn process_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn add(mut self, id: &str, kind: ActivityKind, connect: bool) -> Self {
        let id = ActivityId::new(id);
        let activity = ActivityDefinition::new(id.clone(), kind, Some(self.scope.clone()));
        self.activities.push(activity);
        if connect {
            if let Some(source) = self.cursor.take() {
                self.push_flow(source, id.clone());
            }
        }
        self.cursor = Some(id.clone());
        self.last = Some(id);
        self
    }

    fn push_flow(&mut self, source: ActivityId, target: ActivityId) {
        let id = format!("flow_{}_{}", source, target);
        self.flows.push(SequenceFlow { id, source, target });
    }

    /// Start event without trigger
    pub fn start_event(self, id: &str) -> Self {
        self.add(id, ActivityKind::StartEvent, true)
    }

    /// Start event with a trigger, used inside event sub processes
    pub fn event_start(mut self, id: &str, event: EventDefinition) -> Self {
        self = self.add(id, ActivityKind::StartEvent, true);
        self.with_last(|activity| activity.event = Some(event))
    }

    /// End event
    pub fn end_event(self, id: &str) -> Self {
        self.add(id, ActivityKind::EndEvent, true)
    }

    /// User task
    pub fn user_task(self, id: &str) -> Self {
        self.add(id, ActivityKind::UserTask, true)
    }

    /// Receive task waiting for a message
    pub fn receive_task(mut self, id: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        self = self.add(id, ActivityKind::ReceiveTask, true);
        self.with_last(|activity| activity.event = Some(EventDefinition::Message(message)))
    }

    /// Service task invoking a registered delegate
    pub fn service_task(mut self, id: &str, delegate: impl Into<String>) -> Self {
        let delegate = delegate.into();
        self = self.add(id, ActivityKind::ServiceTask, true);
        self.with_last(|activity| activity.delegate = Some(delegate))
    }

    /// Intermediate catching event
    pub fn intermediate_catch_event(mut self, id: &str, event: EventDefinition) -> Self {
        self = self.add(id, ActivityKind::IntermediateCatchEvent, true);
        self.with_last(|activity| activity.event = Some(event))
    }

    /// Parallel gateway
    pub fn parallel_gateway(self, id: &str) -> Self {
        self.add(id, ActivityKind::ParallelGateway, true)
    }

    /// Embedded sub process; `body` builds the content
    pub fn sub_process(mut self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        self = self.add(id, ActivityKind::SubProcess, true);
        self.nested(id, body)
    }

    /// Event sub process; not connected to the surrounding flow
    pub fn event_sub_process(mut self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        let resume = self.cursor.clone();
        self = self.add(id, ActivityKind::EventSubProcess, false);
        self = self.nested(id, body);
        self.cursor = resume;
        self
    }

    fn nested(mut self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        let outer_scope = std::mem::replace(&mut self.scope, ActivityId::new(id));
        self.cursor = None;
        self = body(self);
        self.scope = outer_scope;
        self.cursor = Some(ActivityId::new(id));
        self.last = Some(ActivityId::new(id));
        self
    }

    /// Boundary event attached to an existing activity; following nodes continue from it
    pub fn boundary_event(mut self, id: &str, attached_to: &str, event: EventDefinition) -> Self {
        let flow_scope = match self.activities.iter().find(|a| a.id == *attached_to) {
            Some(host) => host.flow_scope.clone(),
            None => {
                self.errors.push(format!(
                    "Boundary event '{}' is attached to unknown activity '{}'",
                    id, attached_to
                ));
                Some(self.scope.clone())
            }
        };
        let activity_id = ActivityId::new(id);
        let mut activity =
            ActivityDefinition::new(activity_id.clone(), ActivityKind::BoundaryEvent, flow_scope);
        activity.attached_to = Some(ActivityId::new(attached_to));
        activity.event = Some(event);
        self.activities.push(activity);
        self.cursor = Some(activity_id.clone());
        self.last = Some(activity_id);
        self
    }

    /// Continue building from an existing node
    pub fn move_to(mut self, id: &str) -> Self {
        self.cursor = Some(ActivityId::new(id));
        self.last = Some(ActivityId::new(id));
        self
    }

    /// Connect the current node to an existing one and continue from there
    pub fn connect_to(mut self, id: &str) -> Self {
        let target = ActivityId::new(id);
        match self.cursor.take() {
            Some(source) => self.push_flow(source, target.clone()),
            None => self
                .errors
                .push(format!("Cannot connect to '{}': no current node", id)),
        }
        self.cursor = Some(target);
        self
    }

    fn with_last(mut self, apply: impl FnOnce(&mut ActivityDefinition)) -> Self {
        let Some(last) = self.last.clone() else {
            self.errors
                .push("Modifier used before any node was added".to_string());
            return self;
        };
        if let Some(activity) = self.activities.iter_mut().find(|a| a.id == last) {
            apply(activity);
        }
        self
    }

    /// Display name of the last node
    pub fn name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_last(|activity| activity.name = Some(name))
    }

    /// Mark the last node asynchronous before
    pub fn async_before(self) -> Self {
        self.with_last(|activity| activity.async_before = true)
    }

    /// Mark the last node asynchronous after
    pub fn async_after(self) -> Self {
        self.with_last(|activity| activity.async_after = true)
    }

    /// Make the last boundary event or event start non-interrupting
    pub fn non_interrupting(self) -> Self {
        self.with_last(|activity| activity.cancel_activity = false)
    }

    /// Job priority of the last node
    pub fn job_priority(self, priority: i64) -> Self {
        self.with_last(|activity| activity.job_priority = Some(priority))
    }

    /// Attach an execution listener to the last node
    pub fn listener(self, event: ListenerEvent, delegate: impl Into<String>) -> Self {
        let delegate = delegate.into();
        self.with_last(|activity| {
            activity
                .listeners
                .push(ListenerDefinition { event, delegate })
        })
    }

    /// Constant input parameter on the last node
    pub fn input_value(self, name: impl Into<String>, value: impl Into<DataPacket>) -> Self {
        let parameter = IoParameter {
            name: name.into(),
            source: IoSource::Value(value.into()),
        };
        self.with_last(|activity| activity.input_parameters.push(parameter))
    }

    /// Input parameter copying a variable into the last node's scope
    pub fn input_variable(self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        let parameter = IoParameter {
            name: name.into(),
            source: IoSource::Variable(variable.into()),
        };
        self.with_last(|activity| activity.input_parameters.push(parameter))
    }

    /// Constant output parameter on the last node
    pub fn output_value(self, name: impl Into<String>, value: impl Into<DataPacket>) -> Self {
        let parameter = IoParameter {
            name: name.into(),
            source: IoSource::Value(value.into()),
        };
        self.with_last(|activity| activity.output_parameters.push(parameter))
    }

    /// Output parameter copying a local variable into the enclosing scope
    pub fn output_variable(self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        let parameter = IoParameter {
            name: name.into(),
            source: IoSource::Variable(variable.into()),
        };
        self.with_last(|activity| activity.output_parameters.push(parameter))
    }

    /// Change an already declared activity
    pub fn modify(mut self, id: &str, apply: impl FnOnce(&mut ActivityDefinition)) -> Self {
        match self.activities.iter_mut().find(|a| a.id == *id) {
            Some(activity) => apply(activity),
            None => self
                .errors
                .push(format!("Cannot modify unknown activity '{}'", id)),
        }
        self
    }

    /// Remove an activity and every sequence flow touching it
    pub fn remove(mut self, id: &str) -> Self {
        self.activities.retain(|a| a.id != *id);
        self.flows.retain(|f| f.source != *id && f.target != *id);
        self
    }

    /// Validate and produce the definition
    pub fn build(self) -> Result<ProcessDefinition, EngineError> {
        let mut errors = self.errors;
        let mut activities = self.activities;

        let mut seen = HashSet::new();
        for activity in &activities {
            if !seen.insert(activity.id.clone()) {
                errors.push(format!("Duplicate activity id '{}'", activity.id));
            }
        }
        for flow in &self.flows {
            for endpoint in [&flow.source, &flow.target] {
                if !seen.contains(endpoint) {
                    errors.push(format!(
                        "Sequence flow '{}' references unknown activity '{}'",
                        flow.id, endpoint
                    ));
                }
            }
        }

        let hosts: HashSet<ActivityId> = activities
            .iter()
            .filter_map(|a| a.attached_to.clone())
            .collect();
        for host in &hosts {
            match activities.iter().find(|a| a.id == *host) {
                Some(activity)
                    if matches!(
                        activity.kind,
                        ActivityKind::UserTask
                            | ActivityKind::ReceiveTask
                            | ActivityKind::ServiceTask
                            | ActivityKind::SubProcess
                    ) => {}
                Some(activity) => errors.push(format!(
                    "Boundary events cannot be attached to {} '{}'",
                    activity.kind.type_name(),
                    host
                )),
                None => {}
            }
        }

        for activity in activities
            .iter()
            .filter(|a| a.kind == ActivityKind::EventSubProcess)
        {
            let has_trigger = activities.iter().any(|a| {
                a.kind == ActivityKind::StartEvent
                    && a.event.is_some()
                    && a.flow_scope.as_ref() == Some(&activity.id)
            });
            if !has_trigger {
                errors.push(format!(
                    "Event sub process '{}' needs a start event with an event definition",
                    activity.id
                ));
            }
        }

        if !errors.is_empty() {
            return Err(EngineError::ValidationError(errors.join("; ")));
        }

        for activity in activities.iter_mut() {
            activity.is_scope = activity.kind.is_always_scope()
                || hosts.contains(&activity.id)
                || !activity.input_parameters.is_empty()
                || !activity.output_parameters.is_empty();
        }

        let root_id = ActivityId::new(self.key.clone());
        Ok(ProcessDefinition {
            id: ProcessDefinitionId(format!("{}:{}:{}", self.key, self.version, Uuid::new_v4())),
            key: self.key,
            version: self.version,
            name: self.name,
            root_id,
            activities,
            sequence_flows: self.flows,
        })
    }
}
