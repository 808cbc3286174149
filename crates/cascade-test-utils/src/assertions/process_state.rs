//! Assertion utilities for activity-instance trees and process instance state.

use cascade_engine::{ActivityInstance, DataPacket, ProcessInstance};
use thiserror::Error;

/// Error type for process state validation failures
#[derive(Debug, Error, PartialEq)]
pub enum ProcessStateValidationError {
    #[error("Activity tree mismatch: expected {expected:?}, got {actual:?}")]
    TreeMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Expected {expected} instances of '{activity_id}', got {actual}")]
    InstanceCount {
        activity_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Activity instance '{0}' not found")]
    MissingActivityInstance(String),

    #[error("Parent of '{child}' is {actual:?}, expected '{expected}'")]
    ParentMismatch {
        child: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("Variable '{name}': expected {expected:?}, got {actual:?}")]
    VariableMismatch {
        name: String,
        expected: DataPacket,
        actual: Option<DataPacket>,
    },
}

/// Path of every node below `tree`, sorted.
///
/// Activity instances render as `Process/subProcess/userTask`; transition
/// instances carry a `~` suffix, as in `Process/userTask~`.
pub fn activity_paths(tree: &ActivityInstance) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(tree, tree.activity_id.to_string(), &mut paths);
    paths.sort();
    paths
}

fn collect_paths(node: &ActivityInstance, prefix: String, out: &mut Vec<String>) {
    for transition in &node.child_transition_instances {
        out.push(format!("{}/{}~", prefix, transition.activity_id));
    }
    for child in &node.child_activity_instances {
        let path = format!("{}/{}", prefix, child.activity_id);
        out.push(path.clone());
        collect_paths(child, path, out);
    }
}

/// Asserts that the tree consists of exactly the given paths, in any order.
pub fn assert_activity_tree(
    tree: &ActivityInstance,
    expected: &[&str],
) -> Result<(), ProcessStateValidationError> {
    let actual = activity_paths(tree);
    let mut expected: Vec<String> = expected.iter().map(|path| path.to_string()).collect();
    expected.sort();
    if actual != expected {
        return Err(ProcessStateValidationError::TreeMismatch { expected, actual });
    }
    Ok(())
}

/// Asserts the number of activity instances of an activity anywhere in the tree.
pub fn assert_activity_instance_count(
    tree: &ActivityInstance,
    activity_id: &str,
    expected: usize,
) -> Result<(), ProcessStateValidationError> {
    let actual = tree.activity_instances(activity_id).len();
    if actual != expected {
        return Err(ProcessStateValidationError::InstanceCount {
            activity_id: activity_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Asserts that the single instance of `child` sits directly below the single instance of `parent`.
pub fn assert_parent(
    tree: &ActivityInstance,
    child: &str,
    parent: &str,
) -> Result<(), ProcessStateValidationError> {
    let child_instance = single(tree, child)?;
    let parent_instance = single(tree, parent)?;
    let actual = child_instance
        .parent_activity_instance_id
        .as_ref()
        .map(|id| id.to_string());
    if actual.as_deref() != Some(parent_instance.id.as_str()) {
        return Err(ProcessStateValidationError::ParentMismatch {
            child: child.to_string(),
            expected: parent_instance.id.to_string(),
            actual,
        });
    }
    Ok(())
}

/// The only activity instance of an activity
pub fn single<'a>(
    tree: &'a ActivityInstance,
    activity_id: &str,
) -> Result<&'a ActivityInstance, ProcessStateValidationError> {
    let instances = tree.activity_instances(activity_id);
    match instances.as_slice() {
        [only] => Ok(*only),
        [] => Err(ProcessStateValidationError::MissingActivityInstance(
            activity_id.to_string(),
        )),
        many => Err(ProcessStateValidationError::InstanceCount {
            activity_id: activity_id.to_string(),
            expected: 1,
            actual: many.len(),
        }),
    }
}

/// Asserts the value of a process-level variable.
pub fn assert_variable(
    instance: &ProcessInstance,
    name: &str,
    expected: DataPacket,
) -> Result<(), ProcessStateValidationError> {
    let actual = instance.variable(name).map(|variable| variable.value.clone());
    if actual.as_ref() != Some(&expected) {
        return Err(ProcessStateValidationError::VariableMismatch {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_engine::{ActivityId, ActivityInstanceId, ExecutionId};

    fn node(activity: &str, parent: Option<&str>, children: Vec<ActivityInstance>) -> ActivityInstance {
        ActivityInstance {
            id: ActivityInstanceId::new(format!("{}:1", activity)),
            activity_id: ActivityId::new(activity),
            parent_activity_instance_id: parent.map(ActivityInstanceId::new),
            execution_ids: vec![ExecutionId::new(format!("{}-execution", activity))],
            child_activity_instances: children,
            child_transition_instances: Vec::new(),
        }
    }

    fn tree() -> ActivityInstance {
        node(
            "Process",
            None,
            vec![node(
                "subProcess",
                Some("Process:1"),
                vec![node("userTask", Some("subProcess:1"), Vec::new())],
            )],
        )
    }

    #[test]
    fn test_activity_paths() {
        assert_eq!(
            activity_paths(&tree()),
            vec!["Process/subProcess", "Process/subProcess/userTask"]
        );
        assert!(assert_activity_tree(&tree(), &["Process/subProcess/userTask", "Process/subProcess"]).is_ok());
    }

    #[test]
    fn test_parent_mismatch_is_reported() {
        assert!(assert_parent(&tree(), "userTask", "subProcess").is_ok());
        assert!(matches!(
            assert_parent(&tree(), "subProcess", "userTask"),
            Err(ProcessStateValidationError::ParentMismatch { .. })
        ));
        assert_eq!(
            assert_activity_instance_count(&tree(), "userTask", 2),
            Err(ProcessStateValidationError::InstanceCount {
                activity_id: "userTask".to_string(),
                expected: 2,
                actual: 1,
            })
        );
    }
}
