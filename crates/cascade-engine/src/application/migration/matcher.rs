//! Pairs the live activity and transition instances of one process instance
//! with plan instructions

use crate::application::migration::plan::{MigrationInstruction, MigrationPlan};
use crate::application::migration::report::{
    MigratingActivityInstanceValidationReport, MigratingProcessInstanceValidationReport,
    MigratingTransitionInstanceValidationReport,
};
use crate::application::working_state::WorkingState;
use crate::domain::execution::AsyncPosition;
use crate::domain::ids::{ActivityId, ActivityInstanceId};
use crate::domain::layout::LayoutNode;
use crate::domain::process_definition::{ActivityDefinition, ActivityKind, ProcessDefinition};
use crate::EngineError;
use std::collections::HashMap;
use tracing::debug;

/// Instance-level result of matching a plan
#[derive(Debug, Clone, Default)]
pub(crate) struct MigratingProcessInstance {
    /// Target activity of every migrating node, the root included
    pub(crate) targets: HashMap<ActivityInstanceId, ActivityId>,
    /// Instruction each migrating node follows
    pub(crate) instructions: HashMap<ActivityInstanceId, MigrationInstruction>,
}

impl MigratingProcessInstance {
    pub(crate) fn target_of(&self, node: &str) -> Option<&ActivityId> {
        self.targets.get(node)
    }

    pub(crate) fn instruction_of(&self, node: &str) -> Option<&MigrationInstruction> {
        self.instructions.get(node)
    }
}

/// Match every node of the instance's layout; fails with the full report
pub(crate) fn match_instance(
    state: &WorkingState,
    plan: &MigrationPlan,
    target: &ProcessDefinition,
) -> Result<MigratingProcessInstance, EngineError> {
    if state.instance.process_definition_id != plan.source_process_definition_id {
        return Err(EngineError::BadUserRequest(format!(
            "Process instance '{}' is an instance of process definition '{}' but the migration plan migrates from '{}'",
            state.instance.id,
            state.instance.process_definition_id,
            plan.source_process_definition_id
        )));
    }

    let mut matcher = Matcher {
        source: &state.definition,
        target,
        plan,
        result: MigratingProcessInstance::default(),
        report: MigratingProcessInstanceValidationReport::new(state.instance.id.clone()),
    };
    matcher
        .result
        .targets
        .insert(state.root.instance_id.clone(), target.root_id().clone());
    for child in &state.root.children {
        matcher.visit(child, &state.root.instance_id);
    }

    let Matcher { result, report, .. } = matcher;
    if !report.has_failures() {
        debug!(
            process_instance = %state.instance.id,
            migrating = result.targets.len(),
            "Matched migrating instance"
        );
        return Ok(result);
    }
    if report.transition_instance_reports.is_empty() {
        Err(EngineError::MigrationInstructionInstanceValidation(report))
    } else {
        Err(EngineError::MigratingProcessInstanceValidation(report))
    }
}

struct Matcher<'a> {
    source: &'a ProcessDefinition,
    target: &'a ProcessDefinition,
    plan: &'a MigrationPlan,
    result: MigratingProcessInstance,
    report: MigratingProcessInstanceValidationReport,
}

impl Matcher<'_> {
    /// `migrating_parent` is the closest ancestor node that migrates
    fn visit(&mut self, node: &LayoutNode, migrating_parent: &ActivityInstanceId) {
        let instruction = self.plan.instruction_for(&node.activity_id).cloned();
        let is_leaf = node.children.is_empty();

        let next_parent = match &instruction {
            Some(instruction) => {
                let failures = self.validate(node, instruction, migrating_parent);
                if failures.is_empty() {
                    self.result
                        .targets
                        .insert(node.instance_id.clone(), instruction.target_activity_id.clone());
                    self.result
                        .instructions
                        .insert(node.instance_id.clone(), instruction.clone());
                } else {
                    self.fail(node, Some(instruction.clone()), failures);
                }
                node.instance_id.clone()
            }
            None if is_leaf => {
                self.fail(
                    node,
                    None,
                    vec!["There is no migration instruction for this instance's activity".to_string()],
                );
                migrating_parent.clone()
            }
            None => migrating_parent.clone(),
        };

        for child in &node.children {
            self.visit(child, &next_parent);
        }
    }

    fn validate(
        &self,
        node: &LayoutNode,
        instruction: &MigrationInstruction,
        migrating_parent: &ActivityInstanceId,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        let (Some(source), Some(target)) = (
            self.source.activity(&node.activity_id),
            self.target.activity(&instruction.target_activity_id),
        ) else {
            failures.push("Instruction references an unknown activity".to_string());
            return failures;
        };

        match node.transition() {
            Some(transition) => {
                match transition.position {
                    AsyncPosition::Before if !target.async_before => {
                        failures.push("Target activity is not asyncBefore".to_string());
                    }
                    AsyncPosition::After if !target.async_after => {
                        failures.push("Target activity is not asyncAfter".to_string());
                    }
                    _ => {}
                }
                if self.instantiates_process(source, transition.position)
                    && !self.target.flow_scope(&target.id).is_some_and(|s| self.target.is_root(s))
                {
                    failures.push(
                        "A transition instance that instantiates the process can only be migrated to a process-level flow node"
                            .to_string(),
                    );
                }
                if transition.position == AsyncPosition::After {
                    if let Some(flow) = &transition.sequence_flow {
                        let outgoing = self.target.outgoing(&target.id);
                        if outgoing.len() > 1 && !outgoing.iter().any(|f| f.id == *flow) {
                            failures.push(
                                "Transition instance is assigned to a sequence flow that cannot be matched in the target activity"
                                    .to_string(),
                            );
                        }
                    }
                }
            }
            None if !supports_activity_instance(source) => {
                failures.push(
                    "The type of the source activity is not supported for activity instance migration"
                        .to_string(),
                );
            }
            None => {}
        }

        let Some(parent_target) = self.result.target_of(migrating_parent) else {
            // the parent failed itself and carries the report
            return failures;
        };
        let flow_scope = self.target.flow_scope(&target.id);
        let grand_scope = flow_scope.and_then(|scope| self.target.flow_scope(scope));
        if flow_scope != Some(parent_target) && grand_scope != Some(parent_target) {
            failures.push(
                "Parent activity instance must be migrated to the parent or grandparent scope"
                    .to_string(),
            );
        }
        failures
    }

    /// Token parked before the none start event of the process
    fn instantiates_process(&self, source: &ActivityDefinition, position: AsyncPosition) -> bool {
        position == AsyncPosition::Before
            && source.kind == ActivityKind::StartEvent
            && source.flow_scope.as_deref() == Some(self.source.root_id().as_str())
    }

    fn fail(
        &mut self,
        node: &LayoutNode,
        instruction: Option<MigrationInstruction>,
        failures: Vec<String>,
    ) {
        if node.is_transition() {
            self.report
                .transition_instance_reports
                .push(MigratingTransitionInstanceValidationReport {
                    transition_instance_id: node.instance_id.clone(),
                    source_scope_id: node.activity_id.clone(),
                    instruction,
                    failures,
                });
        } else {
            self.report
                .activity_instance_reports
                .push(MigratingActivityInstanceValidationReport {
                    activity_instance_id: node.instance_id.clone(),
                    source_scope_id: node.activity_id.clone(),
                    instruction,
                    failures,
                });
        }
    }
}

/// Activity kinds whose instances can wait and therefore migrate
fn supports_activity_instance(activity: &ActivityDefinition) -> bool {
    matches!(
        activity.kind,
        ActivityKind::UserTask
            | ActivityKind::ReceiveTask
            | ActivityKind::ServiceTask
            | ActivityKind::IntermediateCatchEvent
            | ActivityKind::ParallelGateway
            | ActivityKind::SubProcess
            | ActivityKind::EventSubProcess
    )
}
