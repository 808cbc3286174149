//! Event subscriptions and timers across a migration

use cascade_engine::domain::job::FAILED_JOB_INCIDENT;
use cascade_engine::domain::process_definition::{ListenerEvent, ProcessDefinitionBuilder};
use cascade_engine::{
    Clock, EngineConfig, EngineError, MigrationPlan, ProcessDefinition, ProcessInstanceId,
};
use cascade_test_utils::{FailingListener, ProcessModels, TestEngine};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

/// Engine whose timer jobs raise an incident on their first failure
fn single_retry_engine() -> TestEngine {
    TestEngine::builder()
        .with_config(EngineConfig {
            default_job_retries: 1,
            ..EngineConfig::default()
        })
        .with_listener("failing", Arc::new(FailingListener::new("boundary rejected")))
        .build()
}

/// Fire the boundary timer into its failing start listener until an incident is raised
async fn fail_boundary_timer(
    engine: &TestEngine,
    model: ProcessDefinitionBuilder,
) -> (Arc<ProcessDefinition>, ProcessInstanceId) {
    let source = engine
        .deploy(model.move_to("boundary").listener(ListenerEvent::Start, "failing"))
        .await;
    let instance = engine.start(&source).await;
    let err = engine.execute_job_at(&instance.id, "boundary").await.unwrap_err();
    assert!(matches!(err, EngineError::ListenerFailed { .. }));

    let failed = engine.instance(&instance.id).await;
    assert_eq!(failed.jobs_at("boundary")[0].retries, 0);
    assert_eq!(failed.incidents.len(), 1);
    assert_eq!(failed.incidents[0].incident_type, FAILED_JOB_INCIDENT);
    (source, instance.id)
}

async fn boundary_plan(
    engine: &TestEngine,
    source: &ProcessDefinition,
    target: &ProcessDefinition,
    update_event_trigger: bool,
) -> MigrationPlan {
    engine
        .plan(source, target, |plan| {
            let plan = plan
                .map_activities("userTask", "userTask")
                .map_activities("boundary", "boundary");
            if update_event_trigger {
                plan.update_event_trigger()
            } else {
                plan
            }
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_boundary_message_keeps_its_name() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("Message")))
        .await;
    let target = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("NewMessage")))
        .await;
    let instance = engine.start(&source).await;
    let subscription = instance.subscriptions_at("boundary")[0].clone();

    let plan = boundary_plan(&engine, &source, &target, false).await;
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let migrated_subscription = migrated.subscriptions_at("boundary")[0];
    assert_eq!(migrated_subscription.id, subscription.id);
    assert_eq!(migrated_subscription.event_name, "Message");
    assert_eq!(migrated_subscription.process_definition_id, target.id);

    engine
        .runtime
        .correlate_message("Message", HashMap::new())
        .await
        .unwrap();
    assert_eq!(
        engine.instance(&instance.id).await.tasks_at("afterBoundaryTask").len(),
        1
    );
}

#[tokio::test]
async fn test_boundary_message_takes_target_name_on_update() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("Message")))
        .await;
    let target = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("NewMessage")))
        .await;
    let instance = engine.start(&source).await;
    let subscription = instance.subscriptions_at("boundary")[0].clone();

    let plan = boundary_plan(&engine, &source, &target, true).await;
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let migrated_subscription = migrated.subscriptions_at("boundary")[0];
    assert_eq!(migrated_subscription.id, subscription.id);
    assert_eq!(migrated_subscription.event_name, "NewMessage");
    assert!(engine
        .runtime
        .correlate_message("Message", HashMap::new())
        .await
        .is_err());
    engine
        .runtime
        .correlate_message("NewMessage", HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_subprocess_boundary_follows_its_host() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::subprocess_with_boundary(ProcessModels::signal("Signal")))
        .await;
    let target = engine
        .deploy(ProcessModels::subprocess_with_boundary(ProcessModels::signal("Signal")))
        .await;
    let instance = engine.start(&source).await;
    let subscription = instance.subscriptions_at("boundary")[0].id.clone();

    let plan = engine
        .plan(&source, &target, |plan| plan.map_equal_activities())
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    assert_eq!(migrated.subscriptions_at("boundary")[0].id, subscription);
    let delivered = engine
        .runtime
        .signal_event_received("Signal", HashMap::new())
        .await
        .unwrap();
    assert_eq!(delivered, vec![instance.id.clone()]);
    let after = engine.instance(&instance.id).await;
    assert!(after.tasks_at("userTask").is_empty());
    assert_eq!(after.tasks_at("afterBoundaryTask").len(), 1);
}

#[tokio::test]
async fn test_unmapped_boundary_is_removed() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("Message")))
        .await;
    let target = engine.deploy(ProcessModels::one_task_process()).await;
    let instance = engine.start(&source).await;
    assert_eq!(instance.event_subscriptions.len(), 1);

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    assert!(migrated.event_subscriptions.is_empty());
    assert_eq!(migrated.tasks_at("userTask").len(), 1);
}

#[tokio::test]
async fn test_boundary_timer_keeps_due_date() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(10)))
        .await;
    let target = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(60)))
        .await;
    let instance = engine.start(&source).await;
    let timer = instance.jobs_at("boundary")[0].clone();
    engine.clock.advance(chrono::Duration::minutes(5));

    let plan = boundary_plan(&engine, &source, &target, false).await;
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let migrated_timer = migrated.jobs_at("boundary")[0];
    assert_eq!(migrated_timer.id, timer.id);
    assert_eq!(migrated_timer.due_date, timer.due_date);
    assert_eq!(migrated_timer.process_definition_id, target.id);
}

#[tokio::test]
async fn test_boundary_timer_is_rescheduled_on_update() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(10)))
        .await;
    let target = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(60)))
        .await;
    let instance = engine.start(&source).await;
    let timer = instance.jobs_at("boundary")[0].clone();
    engine.clock.advance(chrono::Duration::minutes(5));

    let plan = boundary_plan(&engine, &source, &target, true).await;
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let migrated_timer = migrated.jobs_at("boundary")[0];
    assert_eq!(migrated_timer.id, timer.id);
    assert_eq!(
        migrated_timer.due_date,
        Some(engine.clock.now() + chrono::Duration::minutes(60))
    );

    engine.execute_job_at(&instance.id, "boundary").await.unwrap();
    assert_eq!(
        engine.instance(&instance.id).await.tasks_at("afterBoundaryTask").len(),
        1
    );
}

#[tokio::test]
async fn test_event_subprocess_start_trigger_update() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::event_subprocess_process(ProcessModels::message("Message")))
        .await;
    let target = engine
        .deploy(ProcessModels::event_subprocess_process(ProcessModels::message("NewMessage")))
        .await;
    let instance = engine.start(&source).await;
    let subscription = instance.subscriptions_at("eventSubProcessStart")[0].id.clone();

    let plan = engine
        .plan(&source, &target, |plan| {
            plan.map_activities("userTask", "userTask")
                .map_activities("eventSubProcessStart", "eventSubProcessStart")
                .update_event_trigger()
        })
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    let migrated_subscription = migrated.subscriptions_at("eventSubProcessStart")[0];
    assert_eq!(migrated_subscription.id, subscription);
    assert_eq!(migrated_subscription.event_name, "NewMessage");

    engine
        .runtime
        .correlate_message("NewMessage", HashMap::new())
        .await
        .unwrap();
    let after = engine.instance(&instance.id).await;
    assert!(after.tasks_at("userTask").is_empty());
    assert_eq!(after.tasks_at("eventSubProcessTask").len(), 1);
}

#[tokio::test]
async fn test_receive_task_message_name() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::receive_task_process("Message")).await;
    let target = engine
        .deploy(ProcessModels::receive_task_process("NewMessage"))
        .await;
    let kept = engine.start(&source).await;
    let updated = engine.start(&source).await;

    let keep_plan = engine
        .plan(&source, &target, |plan| plan.map_activities("receiveTask", "receiveTask"))
        .await
        .unwrap();
    let update_plan = engine
        .plan(&source, &target, |plan| {
            plan.map_activities("receiveTask", "receiveTask")
                .update_event_trigger()
        })
        .await
        .unwrap();
    let kept = engine.migrate_one(keep_plan, &kept.id).await.unwrap();
    let updated = engine.migrate_one(update_plan, &updated.id).await.unwrap();

    assert_eq!(kept.subscriptions_at("receiveTask")[0].event_name, "Message");
    assert_eq!(updated.subscriptions_at("receiveTask")[0].event_name, "NewMessage");

    let correlated = engine
        .runtime
        .correlate_message("NewMessage", HashMap::new())
        .await
        .unwrap();
    assert_eq!(correlated, updated.id);
    assert!(engine.instance(&updated.id).await.is_ended());
}

#[tokio::test]
async fn test_intermediate_timer_migrates_with_its_job() {
    let engine = TestEngine::new();
    let source = engine
        .deploy(ProcessModels::intermediate_catch_process(ProcessModels::timer_minutes(10)))
        .await;
    let target = engine
        .deploy(ProcessModels::intermediate_catch_process(ProcessModels::timer_minutes(10)))
        .await;
    let instance = engine.start(&source).await;
    let job = instance.jobs_at("catch")[0].id.clone();

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("catch", "catch"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    assert_eq!(migrated.jobs_at("catch")[0].id, job);
    engine.execute_job_at(&instance.id, "catch").await.unwrap();
    assert_eq!(engine.instance(&instance.id).await.tasks_at("userTask").len(), 1);
}

#[tokio::test]
async fn test_failed_timer_of_unmapped_boundary_drops_its_incident() {
    let engine = single_retry_engine();
    let (source, id) = fail_boundary_timer(
        &engine,
        ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(10)),
    )
    .await;
    let target = engine.deploy(ProcessModels::one_task_process()).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &id).await.unwrap();

    assert!(migrated.jobs.is_empty());
    assert!(migrated.incidents.is_empty());
    assert_eq!(migrated.tasks_at("userTask").len(), 1);
}

#[tokio::test]
async fn test_failed_timer_of_removed_scope_drops_its_incident() {
    let engine = single_retry_engine();
    let (source, id) = fail_boundary_timer(
        &engine,
        ProcessModels::subprocess_with_boundary(ProcessModels::timer_minutes(10)),
    )
    .await;
    let target = engine.deploy(ProcessModels::one_task_process()).await;

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &id).await.unwrap();

    assert!(migrated.jobs.is_empty());
    assert!(migrated.incidents.is_empty());
    assert_eq!(migrated.executions.len(), 1);
}
