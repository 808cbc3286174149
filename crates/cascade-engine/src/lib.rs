//!
//! Cascade Engine - Process runtime for the Cascade Platform
//!
//! This crate executes process definitions, keeps the execution tree of each
//! running instance and migrates running instances between versions of a
//! definition while preserving their identity and state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - process definitions, instances and their state
pub mod domain;

/// Application services - interpretation, runtime and migration
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

/// Engine configuration
pub mod config;

pub use config::EngineConfig;
pub use error::EngineError;
pub use types::DataPacket;

pub use application::delegates::{
    DelegateContext, DelegateRegistry, ExecutionListener, ServiceDelegate,
};
pub use application::migration::{
    MigratingActivityInstanceValidationReport, MigratingProcessInstanceValidationReport,
    MigratingTransitionInstanceValidationReport, MigrationBatchResult, MigrationInstruction,
    MigrationInstructionValidationReport, MigrationPlan, MigrationPlanBuilder,
    MigrationPlanExecutionBuilder, MigrationPlanValidationReport,
};
pub use application::runtime_service::{DomainEventHandler, LoggingEventHandler, RuntimeService};

pub use domain::activity_instance::{ActivityInstance, TransitionInstance};
pub use domain::clock::{Clock, MockClock, SystemClock};
pub use domain::ids::{
    ActivityId, ActivityInstanceId, EventSubscriptionId, ExecutionId, IncidentId, JobId,
    ProcessDefinitionId, ProcessInstanceId, TaskId, VariableId,
};
pub use domain::process_definition::{
    ActivityKind, EventDefinition, EventType, ProcessDefinition, ProcessDefinitionBuilder,
};
pub use domain::process_instance::{ProcessInstance, ProcessInstanceStatus};
pub use domain::repository::{ProcessDefinitionRepository, ProcessInstanceRepository};
