//! Process instance migration
//!
//! A [`plan::MigrationPlan`] is validated once against its source and target
//! definitions. Executing it matches each instance against the plan, then
//! transforms the instance in one step that either fully succeeds or leaves the
//! stored instance untouched.

/// Instructions, plans and plan validation
pub mod plan;

/// Validation reports
pub mod report;

/// Batch execution
pub mod service;

pub(crate) mod event_trigger;
pub(crate) mod executor;
pub(crate) mod jobs;
pub(crate) mod matcher;

pub use plan::{MigrationInstruction, MigrationPlan, MigrationPlanBuilder};
pub use report::{
    MigratingActivityInstanceValidationReport, MigratingProcessInstanceValidationReport,
    MigratingTransitionInstanceValidationReport, MigrationInstructionValidationReport,
    MigrationPlanValidationReport,
};
pub use service::{MigrationBatchResult, MigrationPlanExecutionBuilder};
