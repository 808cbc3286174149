//! Registry of execution listeners and service task delegates

use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ExecutionId, ProcessDefinitionId, ProcessInstanceId,
};
use crate::domain::process_definition::ListenerEvent;
use crate::{DataPacket, EngineError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a listener or delegate sees of the running instance
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateContext {
    /// Process instance
    pub process_instance_id: ProcessInstanceId,
    /// Definition the activity belongs to
    pub process_definition_id: ProcessDefinitionId,
    /// Activity being started, ended or executed
    pub activity_id: ActivityId,
    /// Activity instance
    pub activity_instance_id: ActivityInstanceId,
    /// Execution representing the activity instance
    pub execution_id: Option<ExecutionId>,
    /// Lifecycle event for listeners; `None` for service delegates
    pub event: Option<ListenerEvent>,
    /// Variables visible from the activity instance
    pub variables: HashMap<String, DataPacket>,
}

/// Execution listener invoked on activity start and end
pub trait ExecutionListener: Send + Sync {
    /// React to the lifecycle event; an error aborts the surrounding operation
    fn notify(&self, context: &DelegateContext) -> Result<(), String>;
}

impl<F> ExecutionListener for F
where
    F: Fn(&DelegateContext) -> Result<(), String> + Send + Sync,
{
    fn notify(&self, context: &DelegateContext) -> Result<(), String> {
        self(context)
    }
}

/// Behaviour of a service task
pub trait ServiceDelegate: Send + Sync {
    /// Execute the task and return variables to set
    fn execute(&self, context: &DelegateContext) -> Result<HashMap<String, DataPacket>, String>;
}

impl<F> ServiceDelegate for F
where
    F: Fn(&DelegateContext) -> Result<HashMap<String, DataPacket>, String> + Send + Sync,
{
    fn execute(&self, context: &DelegateContext) -> Result<HashMap<String, DataPacket>, String> {
        self(context)
    }
}

/// Named listeners and delegates, resolved when a definition references them
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    listeners: HashMap<String, Arc<dyn ExecutionListener>>,
    services: HashMap<String, Arc<dyn ServiceDelegate>>,
}

impl fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut listeners: Vec<&String> = self.listeners.keys().collect();
        let mut services: Vec<&String> = self.services.keys().collect();
        listeners.sort();
        services.sort();
        f.debug_struct("DelegateRegistry")
            .field("listeners", &listeners)
            .field("services", &services)
            .finish()
    }
}

impl DelegateRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution listener
    pub fn with_listener(
        mut self,
        name: impl Into<String>,
        listener: Arc<dyn ExecutionListener>,
    ) -> Self {
        self.listeners.insert(name.into(), listener);
        self
    }

    /// Register a service task delegate
    pub fn with_service(mut self, name: impl Into<String>, delegate: Arc<dyn ServiceDelegate>) -> Self {
        self.services.insert(name.into(), delegate);
        self
    }

    /// Resolve a listener by name
    pub fn listener(&self, name: &str) -> Result<Arc<dyn ExecutionListener>, EngineError> {
        self.listeners
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::DelegateNotFound(name.to_string()))
    }

    /// Resolve a service delegate by name
    pub fn service(&self, name: &str) -> Result<Arc<dyn ServiceDelegate>, EngineError> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::DelegateNotFound(name.to_string()))
    }
}
