use crate::application::migration::report::{
    MigratingProcessInstanceValidationReport, MigrationPlanValidationReport,
};
use thiserror::Error;

/// Error type for the Cascade process engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Process definition not found
    #[error("Process definition not found: {0}")]
    ProcessDefinitionNotFound(String),

    /// Process instance not found
    #[error("Process instance not found: {0}")]
    ProcessInstanceNotFound(String),

    /// Execution not found inside a process instance
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// No process instance waits for the delivered event
    #[error("No process instance waits for {event_type} '{name}'")]
    NoMatchingSubscription {
        /// Event type (message, signal, conditional)
        event_type: String,
        /// Event name
        name: String,
    },

    /// The caller passed arguments that cannot be served
    #[error("{0}")]
    BadUserRequest(String),

    /// A process model failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The migration plan is invalid for its source and target definitions
    #[error("{0}")]
    MigrationPlanValidation(MigrationPlanValidationReport),

    /// The plan cannot be applied to a concrete instance's activity instances
    #[error("{0}")]
    MigrationInstructionInstanceValidation(MigratingProcessInstanceValidationReport),

    /// The plan cannot be applied to a concrete instance's transition instances
    #[error("{0}")]
    MigratingProcessInstanceValidation(MigratingProcessInstanceValidationReport),

    /// An execution listener failed
    #[error("Listener '{listener}' failed on activity '{activity_id}': {message}")]
    ListenerFailed {
        /// Registered listener name
        listener: String,
        /// Activity the listener was attached to
        activity_id: String,
        /// Failure message reported by the listener
        message: String,
    },

    /// A service task delegate failed
    #[error("Delegate '{delegate}' failed on activity '{activity_id}': {message}")]
    DelegateFailed {
        /// Registered delegate name
        delegate: String,
        /// Activity executing the delegate
        activity_id: String,
        /// Failure message reported by the delegate
        message: String,
    },

    /// A listener or delegate name is not registered
    #[error("No delegate registered under '{0}'")]
    DelegateNotFound(String),

    /// Concurrent modification detected while saving an aggregate
    #[error("Process instance '{instance_id}' was updated by another transaction (expected revision {expected}, found {actual})")]
    OptimisticLockConflict {
        /// Process instance id
        instance_id: String,
        /// Revision the caller loaded
        expected: u64,
        /// Revision found in the store
        actual: u64,
    },

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// True when the failure is a revision conflict worth retrying
    pub fn is_optimistic_lock_conflict(&self) -> bool {
        matches!(self, EngineError::OptimisticLockConflict { .. })
    }

    /// Validation report for instance-level migration failures, if any
    pub fn instance_report(&self) -> Option<&MigratingProcessInstanceValidationReport> {
        match self {
            EngineError::MigrationInstructionInstanceValidation(report)
            | EngineError::MigratingProcessInstanceValidation(report) => Some(report),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::ConfigurationError(err.to_string())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}
