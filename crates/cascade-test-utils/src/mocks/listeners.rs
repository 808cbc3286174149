//! Recording and failing execution listeners.

use cascade_engine::domain::process_definition::ListenerEvent;
use cascade_engine::{DataPacket, DelegateContext, ExecutionListener};
use parking_lot::Mutex;
use std::collections::HashMap;

/// One recorded listener call
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerInvocation {
    /// Activity the listener fired for
    pub activity_id: String,
    /// Activity instance the listener fired for
    pub activity_instance_id: String,
    /// Start or end
    pub event: ListenerEvent,
    /// Variables visible at the time of the call
    pub variables: HashMap<String, DataPacket>,
}

/// Listener that records every call in order
#[derive(Debug, Default)]
pub struct RecordingListener {
    invocations: Mutex<Vec<ListenerInvocation>>,
}

impl RecordingListener {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far
    pub fn invocations(&self) -> Vec<ListenerInvocation> {
        self.invocations.lock().clone()
    }

    /// Activity ids of the calls for one event, in call order
    pub fn activities_for(&self, event: ListenerEvent) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .filter(|invocation| invocation.event == event)
            .map(|invocation| invocation.activity_id.clone())
            .collect()
    }

    /// Number of calls for an activity and event
    pub fn count(&self, activity_id: &str, event: ListenerEvent) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|invocation| invocation.activity_id == activity_id && invocation.event == event)
            .count()
    }

    /// Forget all recorded calls
    pub fn clear(&self) {
        self.invocations.lock().clear();
    }
}

impl ExecutionListener for RecordingListener {
    fn notify(&self, context: &DelegateContext) -> Result<(), String> {
        let Some(event) = context.event else {
            return Err("listener invoked without a lifecycle event".to_string());
        };
        self.invocations.lock().push(ListenerInvocation {
            activity_id: context.activity_id.to_string(),
            activity_instance_id: context.activity_instance_id.to_string(),
            event,
            variables: context.variables.clone(),
        });
        Ok(())
    }
}

/// Listener that always fails with the given message
#[derive(Debug, Clone)]
pub struct FailingListener {
    message: String,
}

impl FailingListener {
    /// Create a listener failing with `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ExecutionListener for FailingListener {
    fn notify(&self, _context: &DelegateContext) -> Result<(), String> {
        Err(self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_engine::{ActivityId, ActivityInstanceId, ProcessDefinitionId, ProcessInstanceId};

    fn context(activity: &str, event: ListenerEvent) -> DelegateContext {
        DelegateContext {
            process_instance_id: ProcessInstanceId::new("pi"),
            process_definition_id: ProcessDefinitionId::new("Process:1"),
            activity_id: ActivityId::new(activity),
            activity_instance_id: ActivityInstanceId::new(format!("{}:1", activity)),
            execution_id: None,
            event: Some(event),
            variables: HashMap::new(),
        }
    }

    #[test]
    fn test_recording_listener_keeps_order() {
        let listener = RecordingListener::new();
        listener.notify(&context("outer", ListenerEvent::Start)).unwrap();
        listener.notify(&context("inner", ListenerEvent::Start)).unwrap();
        listener.notify(&context("inner", ListenerEvent::End)).unwrap();

        assert_eq!(listener.activities_for(ListenerEvent::Start), vec!["outer", "inner"]);
        assert_eq!(listener.count("inner", ListenerEvent::End), 1);

        listener.clear();
        assert!(listener.invocations().is_empty());
    }

    #[test]
    fn test_failing_listener() {
        let listener = FailingListener::new("boom");
        assert_eq!(
            listener.notify(&context("task", ListenerEvent::End)),
            Err("boom".to_string())
        );
    }
}
