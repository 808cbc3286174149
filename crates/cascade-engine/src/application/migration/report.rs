//! Aggregated validation reports
//!
//! Validation never stops at the first problem. Failures are collected per
//! instruction (plan level) or per activity and transition instance (instance
//! level) and surfaced together.

use crate::application::migration::plan::MigrationInstruction;
use crate::domain::ids::{
    ActivityId, ActivityInstanceId, ProcessDefinitionId, ProcessInstanceId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures of one instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInstructionValidationReport {
    /// Offending instruction
    pub instruction: MigrationInstruction,
    /// Failure messages
    pub failures: Vec<String>,
}

/// Plan-level report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlanValidationReport {
    /// Source definition of the plan
    pub source_process_definition_id: ProcessDefinitionId,
    /// Target definition of the plan
    pub target_process_definition_id: ProcessDefinitionId,
    /// Reports of instructions that failed
    pub instruction_reports: Vec<MigrationInstructionValidationReport>,
}

impl MigrationPlanValidationReport {
    /// Whether any instruction failed
    pub fn has_failures(&self) -> bool {
        !self.instruction_reports.is_empty()
    }

    /// Failures recorded for the instruction mapping `source_activity_id`
    pub fn failures_for(&self, source_activity_id: &str) -> Vec<&str> {
        self.instruction_reports
            .iter()
            .filter(|report| report.instruction.source_activity_id == *source_activity_id)
            .flat_map(|report| report.failures.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for MigrationPlanValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Migration plan for process definition '{}' to '{}' is not valid:",
            self.source_process_definition_id, self.target_process_definition_id
        )?;
        for report in &self.instruction_reports {
            write!(f, "\n\t Migration instruction {} is not valid:", report.instruction)?;
            for failure in &report.failures {
                write!(f, "\n\t\t{}", failure)?;
            }
        }
        Ok(())
    }
}

/// Failures of one activity instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratingActivityInstanceValidationReport {
    /// Activity instance
    pub activity_instance_id: ActivityInstanceId,
    /// Activity the instance runs in the source definition
    pub source_scope_id: ActivityId,
    /// Instruction that applied, if any
    pub instruction: Option<MigrationInstruction>,
    /// Failure messages
    pub failures: Vec<String>,
}

/// Failures of one transition instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratingTransitionInstanceValidationReport {
    /// Transition instance
    pub transition_instance_id: ActivityInstanceId,
    /// Activity the transition instance is parked at
    pub source_scope_id: ActivityId,
    /// Instruction that applied, if any
    pub instruction: Option<MigrationInstruction>,
    /// Failure messages
    pub failures: Vec<String>,
}

/// Instance-level report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratingProcessInstanceValidationReport {
    /// Instance being validated
    pub process_instance_id: ProcessInstanceId,
    /// Activity instance reports with failures
    pub activity_instance_reports: Vec<MigratingActivityInstanceValidationReport>,
    /// Transition instance reports with failures
    pub transition_instance_reports: Vec<MigratingTransitionInstanceValidationReport>,
    /// Failures not tied to a single activity or transition instance
    pub failures: Vec<String>,
}

impl MigratingProcessInstanceValidationReport {
    pub(crate) fn new(process_instance_id: ProcessInstanceId) -> Self {
        Self {
            process_instance_id,
            activity_instance_reports: Vec::new(),
            transition_instance_reports: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether anything failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
            || !self.activity_instance_reports.is_empty()
            || !self.transition_instance_reports.is_empty()
    }

    /// Failures of activity instances of a source activity
    pub fn activity_failures(&self, source_scope_id: &str) -> Vec<&str> {
        self.activity_instance_reports
            .iter()
            .filter(|report| report.source_scope_id == *source_scope_id)
            .flat_map(|report| report.failures.iter().map(String::as_str))
            .collect()
    }

    /// Failures of transition instances of a source activity
    pub fn transition_failures(&self, source_scope_id: &str) -> Vec<&str> {
        self.transition_instance_reports
            .iter()
            .filter(|report| report.source_scope_id == *source_scope_id)
            .flat_map(|report| report.failures.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for MigratingProcessInstanceValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot migrate process instance '{}':", self.process_instance_id)?;
        for failure in &self.failures {
            write!(f, "\n\t{}", failure)?;
        }
        for report in &self.activity_instance_reports {
            write!(
                f,
                "\n\tCannot migrate activity instance '{}':",
                report.activity_instance_id
            )?;
            for failure in &report.failures {
                write!(f, "\n\t\t{}", failure)?;
            }
        }
        for report in &self.transition_instance_reports {
            write!(
                f,
                "\n\tCannot migrate transition instance '{}':",
                report.transition_instance_id
            )?;
            for failure in &report.failures {
                write!(f, "\n\t\t{}", failure)?;
            }
        }
        Ok(())
    }
}
