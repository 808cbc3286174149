//! Domain event recorder.

use async_trait::async_trait;
use cascade_engine::domain::events::DomainEvent;
use cascade_engine::{DomainEventHandler, EngineError, ProcessInstanceId};
use parking_lot::Mutex;

/// Event handler remembering the type and instance of every dispatched event
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<(String, ProcessInstanceId)>>,
    rejected_prefix: Option<String>,
}

impl RecordingEventHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that still records, but fails events whose type starts with `prefix`
    pub fn rejecting(prefix: impl Into<String>) -> Self {
        Self {
            events: Mutex::default(),
            rejected_prefix: Some(prefix.into()),
        }
    }

    /// Event types in dispatch order
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|(kind, _)| kind.clone()).collect()
    }

    /// Number of dispatched events of a type for one instance
    pub fn count_for(&self, event_type: &str, process_instance_id: &ProcessInstanceId) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(kind, id)| kind == event_type && id == process_instance_id)
            .count()
    }

    /// Forget all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl DomainEventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), EngineError> {
        let event_type = event.event_type();
        self.events
            .lock()
            .push((event_type.to_string(), event.process_instance_id().clone()));
        match &self.rejected_prefix {
            Some(prefix) if event_type.starts_with(prefix.as_str()) => {
                Err(EngineError::Other(format!("handler rejected {}", event_type)))
            }
            _ => Ok(()),
        }
    }
}
