//! Migration plans and their definition-level validation

use crate::application::migration::report::{
    MigrationInstructionValidationReport, MigrationPlanValidationReport,
};
use crate::domain::ids::{ActivityId, ProcessDefinitionId};
use crate::domain::process_definition::{ActivityDefinition, ProcessDefinition};
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps one source activity to a target activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInstruction {
    /// Activity in the source definition
    pub source_activity_id: ActivityId,
    /// Activity in the target definition
    pub target_activity_id: ActivityId,
    /// Recompute the event trigger from the target activity
    pub update_event_trigger: bool,
}

impl MigrationInstruction {
    /// Instruction keeping the existing event trigger
    pub fn new(source: impl Into<ActivityId>, target: impl Into<ActivityId>) -> Self {
        Self {
            source_activity_id: source.into(),
            target_activity_id: target.into(),
            update_event_trigger: false,
        }
    }
}

impl fmt::Display for MigrationInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' -> '{}'",
            self.source_activity_id, self.target_activity_id
        )?;
        if self.update_event_trigger {
            f.write_str(" (update event trigger)")?;
        }
        Ok(())
    }
}

/// Validated, immutable mapping between two definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Definition instances are migrated from
    pub source_process_definition_id: ProcessDefinitionId,
    /// Definition instances are migrated to
    pub target_process_definition_id: ProcessDefinitionId,
    /// Instructions in declaration order
    pub instructions: Vec<MigrationInstruction>,
}

impl MigrationPlan {
    /// Instruction for a source activity
    pub fn instruction_for(&self, source_activity_id: &str) -> Option<&MigrationInstruction> {
        self.instructions
            .iter()
            .find(|instruction| instruction.source_activity_id == *source_activity_id)
    }
}

/// Collects instructions; everything is validated together in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct MigrationPlanBuilder {
    source: Arc<ProcessDefinition>,
    target: Arc<ProcessDefinition>,
    instructions: Vec<MigrationInstruction>,
}

impl MigrationPlanBuilder {
    /// Builder for a plan between two definitions
    pub fn new(source: Arc<ProcessDefinition>, target: Arc<ProcessDefinition>) -> Self {
        Self {
            source,
            target,
            instructions: Vec::new(),
        }
    }

    /// Map a source activity to a target activity
    pub fn map_activities(mut self, source: &str, target: &str) -> Self {
        self.instructions.push(MigrationInstruction::new(source, target));
        self
    }

    /// Recompute the event trigger of the previously added instruction
    pub fn update_event_trigger(mut self) -> Self {
        match self.instructions.last_mut() {
            Some(instruction) => instruction.update_event_trigger = true,
            None => warn!("update_event_trigger called before any instruction was added"),
        }
        self
    }

    /// Map every activity to the equally named target activity where both scopes match
    pub fn map_equal_activities(mut self) -> Self {
        let candidates = self.equal_activity_candidates();
        let mut all = self.instructions.clone();
        all.extend(candidates.iter().cloned());

        let accepted: Vec<MigrationInstruction> = candidates
            .into_iter()
            .filter(|candidate| self.validate(candidate, &all).is_empty())
            .collect();
        debug!(
            count = accepted.len(),
            source = %self.source.id,
            target = %self.target.id,
            "Generated instructions for equal activities"
        );
        self.instructions.extend(accepted);
        self
    }

    /// Validate all instructions and produce the plan
    pub fn build(self) -> Result<MigrationPlan, EngineError> {
        let instruction_reports: Vec<MigrationInstructionValidationReport> = self
            .instructions
            .iter()
            .filter_map(|instruction| {
                let failures = self.validate(instruction, &self.instructions);
                (!failures.is_empty()).then(|| MigrationInstructionValidationReport {
                    instruction: instruction.clone(),
                    failures,
                })
            })
            .collect();

        if !instruction_reports.is_empty() {
            return Err(EngineError::MigrationPlanValidation(
                MigrationPlanValidationReport {
                    source_process_definition_id: self.source.id.clone(),
                    target_process_definition_id: self.target.id.clone(),
                    instruction_reports,
                },
            ));
        }
        Ok(MigrationPlan {
            source_process_definition_id: self.source.id.clone(),
            target_process_definition_id: self.target.id.clone(),
            instructions: self.instructions,
        })
    }

    /// Top-down over scopes that map onto each other
    fn equal_activity_candidates(&self) -> Vec<MigrationInstruction> {
        let mut candidates = Vec::new();
        let mut scopes = vec![(
            self.source.root_id().clone(),
            self.target.root_id().clone(),
        )];
        while let Some((source_scope, target_scope)) = scopes.pop() {
            for child in self.source.children(&source_scope) {
                let Some(target) = self.target.activity(&child.id) else {
                    continue;
                };
                if target.flow_scope.as_ref() != Some(&target_scope) {
                    continue;
                }
                if self.instructions.iter().any(|i| i.source_activity_id == child.id) {
                    continue;
                }
                candidates.push(MigrationInstruction::new(child.id.clone(), target.id.clone()));
                if self.source.children(&child.id).next().is_some() {
                    scopes.push((child.id.clone(), target.id.clone()));
                }
            }
        }
        candidates
    }

    fn validate(&self, instruction: &MigrationInstruction, all: &[MigrationInstruction]) -> Vec<String> {
        let mut failures = Vec::new();
        let source_id = &instruction.source_activity_id;
        let target_id = &instruction.target_activity_id;

        if source_id.is_empty() {
            failures.push("Source activity id is empty".to_string());
        }
        if target_id.is_empty() {
            failures.push("Target activity id is empty".to_string());
        }
        let source = lookup(&self.source, source_id);
        let target = lookup(&self.target, target_id);
        if source.is_none() && !source_id.is_empty() {
            failures.push(format!("Source activity '{}' does not exist", source_id));
        }
        if target.is_none() && !target_id.is_empty() {
            failures.push(format!("Target activity '{}' does not exist", target_id));
        }
        let (Some(source), Some(target)) = (source, target) else {
            return failures;
        };

        let mappings = all
            .iter()
            .filter(|other| other.source_activity_id == *source_id)
            .count();
        if mappings > 1 {
            failures.push(format!(
                "There are multiple mappings for source activity id '{}'",
                source_id
            ));
        }

        if source.kind != target.kind {
            failures.push(format!(
                "Activities have incompatible types ({} is not compatible with {})",
                source.kind.type_name(),
                target.kind.type_name()
            ));
        } else if source.kind.is_event() && source.type_name() != target.type_name() {
            failures.push(format!(
                "Events are not of the same type ({} != {})",
                source.type_name(),
                target.type_name()
            ));
        }

        if let Some(failure) = self.validate_event_scope(source, target, all) {
            failures.push(failure);
        }
        if let Some(failure) = self.validate_closest_mapped_ancestor(source, target, all) {
            failures.push(failure);
        }

        if instruction.update_event_trigger && !self.target.has_persistent_trigger(&target.id) {
            failures.push(
                "Cannot update event trigger because the activity does not define a persistent event trigger"
                    .to_string(),
            );
        }
        failures
    }

    /// Boundary events and event sub process starts must keep their event scope together
    fn validate_event_scope(
        &self,
        source: &ActivityDefinition,
        target: &ActivityDefinition,
        all: &[MigrationInstruction],
    ) -> Option<String> {
        let source_scope = self.source.event_scope(&source.id)?;
        if source_scope == source.id {
            return None;
        }
        let target_scope = self
            .target
            .event_scope(&target.id)
            .unwrap_or_else(|| self.target.root_id().clone());
        let mapped = if self.source.is_root(&source_scope) {
            self.target.is_root(&target_scope)
        } else {
            all.iter().any(|other| {
                other.source_activity_id == source_scope && other.target_activity_id == target_scope
            })
        };
        (!mapped).then(|| {
            format!(
                "The source activity's event scope ({}) must be mapped to the target activity's event scope ({})",
                source_scope, target_scope
            )
        })
    }

    fn validate_closest_mapped_ancestor(
        &self,
        source: &ActivityDefinition,
        target: &ActivityDefinition,
        all: &[MigrationInstruction],
    ) -> Option<String> {
        let (ancestor, mapped_to) = self.source.ancestors(&source.id).into_iter().find_map(|scope| {
            all.iter()
                .find(|other| other.source_activity_id == scope)
                .map(|other| (scope, other.target_activity_id.clone()))
        })?;
        if self.target.is_ancestor(&mapped_to, &target.id) {
            return None;
        }
        Some(format!(
            "The closest mapped ancestor '{}' is mapped to scope '{}' which is not an ancestor of target scope '{}'",
            ancestor, mapped_to, target.id
        ))
    }
}

/// Mappable activities; the process root is implicitly mapped and never named
fn lookup<'d>(definition: &'d ProcessDefinition, id: &str) -> Option<&'d ActivityDefinition> {
    definition.activity(id).filter(|activity| !definition.is_root(&activity.id))
}
