//! Migrations that introduce scopes the source instance did not have

use cascade_engine::domain::execution::ExecutionTree;
use cascade_engine::domain::process_definition::ListenerEvent;
use cascade_engine::{ActivityId, DataPacket, EngineError};
use cascade_test_utils::assertions::{activity_paths, assert_activity_tree, assert_parent, single};
use cascade_test_utils::{FailingListener, ProcessModels, TestEngine, RECORDING_LISTENER};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test]
async fn test_add_subprocess_around_task() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::subprocess_process()).await;
    let instance = engine.start(&source).await;
    let task_before = instance.tasks_at("userTask")[0].clone();
    let task_instance_before = single(&engine.tree(&instance.id).await, "userTask")
        .unwrap()
        .id
        .clone();

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    assert_eq!(migrated.process_definition_id, target.id);
    let tree = migrated.activity_instance_tree().unwrap();
    assert_activity_tree(&tree, &["Process/subProcess", "Process/subProcess/userTask"]).unwrap();
    assert_parent(&tree, "userTask", "subProcess").unwrap();
    assert_eq!(single(&tree, "userTask").unwrap().id, task_instance_before);

    let task = migrated.tasks_at("userTask")[0];
    assert_eq!(task.id, task_before.id);
    assert_eq!(task.activity_instance_id, task_instance_before);
    assert_eq!(task.process_definition_id, target.id);
    assert_eq!(
        engine.events.count_for("migration.scope_created", &instance.id),
        1
    );
    assert_eq!(
        engine.events.count_for("process_instance.migrated", &instance.id),
        1
    );
}

#[tokio::test]
async fn test_added_subprocess_completes_like_a_started_one() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::subprocess_process()).await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    engine.migrate_one(plan, &instance.id).await.unwrap();
    engine.complete_task_at(&instance.id, "userTask").await;

    assert!(engine.instance(&instance.id).await.is_ended());
}

#[tokio::test]
async fn test_added_scope_runs_start_listener_and_inputs() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine
        .deploy(
            ProcessModels::subprocess_process()
                .move_to("subProcess")
                .listener(ListenerEvent::Start, RECORDING_LISTENER)
                .input_value("scopeInput", "created"),
        )
        .await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let tree = migrated.activity_instance_tree().unwrap();
    let sub_process = single(&tree, "subProcess").unwrap();
    let invocations = engine.listener.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].activity_id, "subProcess");
    assert_eq!(invocations[0].event, ListenerEvent::Start);
    assert_eq!(invocations[0].activity_instance_id, sub_process.id.to_string());
    assert_eq!(
        invocations[0].variables.get("scopeInput"),
        Some(&DataPacket::from("created"))
    );

    let scope_variables = migrated.variables_on(&sub_process.execution_ids[0]);
    assert_eq!(scope_variables.len(), 1);
    assert_eq!(scope_variables[0].name, "scopeInput");
}

#[tokio::test]
async fn test_two_new_scope_levels_are_rejected() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::double_subprocess_process()).await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let err = engine.migrate_one(plan, &instance.id).await.unwrap_err();

    match &err {
        EngineError::MigrationInstructionInstanceValidation(report) => {
            assert_eq!(report.process_instance_id, instance.id);
            assert_eq!(
                report.activity_failures("userTask"),
                vec!["Parent activity instance must be migrated to the parent or grandparent scope"]
            );
        }
        other => panic!("expected an instance validation error, got {:?}", other),
    }
    assert!(err
        .to_string()
        .contains("Parent activity instance must be migrated to the parent or grandparent scope"));

    let unchanged = engine.instance(&instance.id).await;
    assert_eq!(unchanged.process_definition_id, source.id);
    assert_eq!(
        activity_paths(&unchanged.activity_instance_tree().unwrap()),
        vec!["Process/userTask"]
    );
}

#[tokio::test]
async fn test_add_outer_scope_around_mapped_subprocess() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::subprocess_process()).await;
    let target = engine.deploy(ProcessModels::double_subprocess_process()).await;
    let instance = engine.start(&source).await;
    let sub_process_before = single(&engine.tree(&instance.id).await, "subProcess")
        .unwrap()
        .id
        .clone();

    let plan = engine
        .plan(&source, &target, |plan| {
            plan.map_activities("subProcess", "innerSubProcess")
                .map_activities("userTask", "userTask")
        })
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let tree = migrated.activity_instance_tree().unwrap();
    assert_activity_tree(
        &tree,
        &[
            "Process/outerSubProcess",
            "Process/outerSubProcess/innerSubProcess",
            "Process/outerSubProcess/innerSubProcess/userTask",
        ],
    )
    .unwrap();
    assert_eq!(single(&tree, "innerSubProcess").unwrap().id, sub_process_before);
    assert_parent(&tree, "innerSubProcess", "outerSubProcess").unwrap();
}

#[tokio::test]
async fn test_concurrent_tasks_share_one_added_scope() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::parallel_gateway_process()).await;
    let target = engine
        .deploy(ProcessModels::parallel_gateway_subprocess_process())
        .await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| {
            plan.map_activities("userTask1", "userTask1")
                .map_activities("userTask2", "userTask2")
        })
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let tree = migrated.activity_instance_tree().unwrap();
    assert_activity_tree(
        &tree,
        &[
            "Process/subProcess",
            "Process/subProcess/userTask1",
            "Process/subProcess/userTask2",
        ],
    )
    .unwrap();
    assert_eq!(
        engine.events.count_for("migration.scope_created", &instance.id),
        1
    );

    engine.complete_task_at(&instance.id, "userTask1").await;
    engine.complete_task_at(&instance.id, "userTask2").await;
    assert!(engine.instance(&instance.id).await.is_ended());
}

#[tokio::test]
async fn test_add_boundary_event_to_task() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("Message")))
        .await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let subscriptions = migrated.subscriptions_at("boundary");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].event_name, "Message");
    assert_eq!(subscriptions[0].process_definition_id, target.id);

    let correlated = engine
        .runtime
        .correlate_message("Message", HashMap::new())
        .await
        .unwrap();
    assert_eq!(correlated, instance.id);

    let after = engine.instance(&instance.id).await;
    assert!(after.tasks_at("userTask").is_empty());
    assert_eq!(after.tasks_at("afterBoundaryTask").len(), 1);
}

#[tokio::test]
async fn test_add_event_subprocess_subscription() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine
        .deploy(ProcessModels::event_subprocess_process(ProcessModels::signal("Signal")))
        .await;
    let instance = engine.start(&source).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();
    assert_eq!(migrated.subscriptions_at("eventSubProcessStart").len(), 1);

    let delivered = engine
        .runtime
        .signal_event_received("Signal", HashMap::new())
        .await
        .unwrap();
    assert_eq!(delivered, vec![instance.id.clone()]);

    let after = engine.instance(&instance.id).await;
    assert!(after.tasks_at("userTask").is_empty());
    assert_eq!(after.tasks_at("eventSubProcessTask").len(), 1);
}

#[tokio::test]
async fn test_added_scope_is_a_compacted_child_execution() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::subprocess_process()).await;
    let instance = engine.start(&source).await;
    assert_eq!(instance.executions.len(), 1);

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let executions = &migrated.executions;
    assert_eq!(executions.len(), 2);
    let root = executions.root().unwrap();
    assert_eq!(root.id, instance.executions.root().unwrap().id);
    assert!(root.is_scope && !root.is_concurrent);
    assert_eq!(root.activity_id, None);

    let scope = executions.children(&root.id)[0];
    assert!(scope.is_scope && !scope.is_concurrent);
    assert_eq!(scope.scope_activity_id.as_deref(), Some("subProcess"));
    assert_eq!(scope.activity_id.as_deref(), Some("userTask"));
    assert_eq!(executions.parent_scope(&scope.id).unwrap().id, root.id);
    assert_eq!(migrated.tasks_at("userTask")[0].execution_id, scope.id);
}

#[tokio::test]
async fn test_failing_start_listener_on_added_scope_leaves_instance_untouched() {
    let engine = TestEngine::builder()
        .with_listener("failing", Arc::new(FailingListener::new("scope rejected")))
        .build();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine
        .deploy(
            ProcessModels::subprocess_process()
                .move_to("subProcess")
                .listener(ListenerEvent::Start, "failing"),
        )
        .await;
    let instance = engine.start(&source).await;
    let before = engine.instance(&instance.id).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let err = engine.migrate_one(plan, &instance.id).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::ListenerFailed {
            listener: "failing".to_string(),
            activity_id: "subProcess".to_string(),
            message: "scope rejected".to_string(),
        }
    );
    let after = engine.instance(&instance.id).await;
    assert_eq!(after.executions, before.executions);
    assert_eq!(after.process_definition_id, source.id);
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.tasks, before.tasks);
}

#[tokio::test]
async fn test_instance_at_a_non_waiting_activity_is_rejected() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::one_task_process()).await;
    let started = engine.start(&source).await;

    // an instance stuck at its end event, as an external store could hold it
    let mut stuck = engine.instance(&started.id).await;
    let executions = stuck
        .executions
        .executions()
        .iter()
        .cloned()
        .map(|mut execution| {
            if execution.activity_id.as_deref() == Some("userTask") {
                execution.activity_id = Some(ActivityId::new("endEvent"));
            }
            execution
        })
        .collect();
    stuck.executions = ExecutionTree::from_executions(executions);
    stuck.tasks.clear();
    engine.instances.save(&stuck).await.unwrap();

    let plan = engine
        .plan(&source, &target, |plan| plan.map_equal_activities())
        .await
        .unwrap();
    let err = engine.migrate_one(plan, &started.id).await.unwrap_err();

    match err {
        EngineError::MigrationInstructionInstanceValidation(report) => assert_eq!(
            report.activity_failures("endEvent"),
            vec!["The type of the source activity is not supported for activity instance migration"]
        ),
        other => panic!("expected an instance validation error, got {:?}", other),
    }
}
