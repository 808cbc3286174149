//! Fixture process models.
//!
//! Every model is built under the key [`ProcessModels::PROCESS_KEY`], so
//! deploying two of them yields two versions of the same process whose root
//! activities share an id.

use cascade_engine::domain::process_definition::{
    EventDefinition, ProcessDefinitionBuilder, TimerDefinition,
};
use std::time::Duration;

/// Catalogue of fixture process models.
pub struct ProcessModels;

impl ProcessModels {
    /// Key and root activity id of every fixture
    pub const PROCESS_KEY: &'static str = "Process";

    fn process() -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder::new(Self::PROCESS_KEY)
    }

    /// Message event definition
    pub fn message(name: &str) -> EventDefinition {
        EventDefinition::Message(name.to_string())
    }

    /// Signal event definition
    pub fn signal(name: &str) -> EventDefinition {
        EventDefinition::Signal(name.to_string())
    }

    /// Conditional event definition
    pub fn conditional(condition: &str) -> EventDefinition {
        EventDefinition::Conditional(condition.to_string())
    }

    /// Timer firing the given number of minutes after it is created
    pub fn timer_minutes(minutes: u64) -> EventDefinition {
        EventDefinition::Timer(TimerDefinition::Duration(Duration::from_secs(minutes * 60)))
    }

    /// startEvent -> userTask -> endEvent
    pub fn one_task_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .user_task("userTask")
            .end_event("endEvent")
    }

    /// userTask wrapped in subProcess
    pub fn subprocess_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .sub_process("subProcess", |sub| {
                sub.start_event("subProcessStart")
                    .user_task("userTask")
                    .end_event("subProcessEnd")
            })
            .end_event("endEvent")
    }

    /// userTask wrapped in innerSubProcess wrapped in outerSubProcess
    pub fn double_subprocess_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .sub_process("outerSubProcess", |outer| {
                outer
                    .start_event("outerSubProcessStart")
                    .sub_process("innerSubProcess", |inner| {
                        inner
                            .start_event("innerSubProcessStart")
                            .user_task("userTask")
                            .end_event("innerSubProcessEnd")
                    })
                    .end_event("outerSubProcessEnd")
            })
            .end_event("endEvent")
    }

    /// fork -> userTask1 | userTask2 -> join
    pub fn parallel_gateway_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .parallel_gateway("fork")
            .user_task("userTask1")
            .parallel_gateway("join")
            .end_event("endEvent")
            .move_to("fork")
            .user_task("userTask2")
            .connect_to("join")
    }

    /// The parallel gateway process wrapped in subProcess
    pub fn parallel_gateway_subprocess_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .sub_process("subProcess", |sub| {
                sub.start_event("subProcessStart")
                    .parallel_gateway("fork")
                    .user_task("userTask1")
                    .parallel_gateway("join")
                    .end_event("subProcessEnd")
                    .move_to("fork")
                    .user_task("userTask2")
                    .connect_to("join")
            })
            .end_event("endEvent")
    }

    /// fork -> subProcess(userTask1) | userTask2 -> join
    pub fn parallel_task_and_subprocess_process() -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .parallel_gateway("fork")
            .sub_process("subProcess", |sub| {
                sub.start_event("subProcessStart")
                    .user_task("userTask1")
                    .end_event("subProcessEnd")
            })
            .parallel_gateway("join")
            .end_event("endEvent")
            .move_to("fork")
            .user_task("userTask2")
            .connect_to("join")
    }

    /// One-task process whose task is a scope through an input mapping
    pub fn scope_task_process() -> ProcessDefinitionBuilder {
        Self::one_task_process()
            .move_to("userTask")
            .input_value("taskInput", "input")
    }

    /// startEvent -> receiveTask(message) -> endEvent
    pub fn receive_task_process(message: &str) -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .receive_task("receiveTask", message)
            .end_event("endEvent")
    }

    /// startEvent -> catch(event) -> userTask -> endEvent
    pub fn intermediate_catch_process(event: EventDefinition) -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .intermediate_catch_event("catch", event)
            .user_task("userTask")
            .end_event("endEvent")
    }

    /// startEvent -> serviceTask(delegate) -> userTask -> endEvent
    pub fn service_task_process(delegate: &str) -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .service_task("serviceTask", delegate)
            .user_task("userTask")
            .end_event("endEvent")
    }

    /// One-task process with an interrupting boundary event on userTask
    pub fn user_task_with_boundary(event: EventDefinition) -> ProcessDefinitionBuilder {
        Self::one_task_process()
            .boundary_event("boundary", "userTask", event)
            .user_task("afterBoundaryTask")
            .end_event("afterBoundaryEnd")
    }

    /// Sub process with an interrupting boundary event on subProcess
    pub fn subprocess_with_boundary(event: EventDefinition) -> ProcessDefinitionBuilder {
        Self::subprocess_process()
            .boundary_event("boundary", "subProcess", event)
            .user_task("afterBoundaryTask")
            .end_event("afterBoundaryEnd")
    }

    /// One-task process with an interrupting event sub process at process level
    pub fn event_subprocess_process(event: EventDefinition) -> ProcessDefinitionBuilder {
        Self::one_task_process().event_sub_process("eventSubProcess", |sub| {
            sub.event_start("eventSubProcessStart", event)
                .user_task("eventSubProcessTask")
                .end_event("eventSubProcessEnd")
        })
    }

    /// Sub process containing an interrupting event sub process
    pub fn subprocess_with_event_subprocess(event: EventDefinition) -> ProcessDefinitionBuilder {
        Self::process()
            .start_event("startEvent")
            .sub_process("subProcess", |sub| {
                sub.start_event("subProcessStart")
                    .user_task("userTask")
                    .end_event("subProcessEnd")
                    .event_sub_process("eventSubProcess", |event_sub| {
                        event_sub
                            .event_start("eventSubProcessStart", event)
                            .user_task("eventSubProcessTask")
                            .end_event("eventSubProcessEnd")
                    })
            })
            .end_event("endEvent")
    }
}
