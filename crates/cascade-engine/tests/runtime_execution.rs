//! Plain process execution: tokens, tasks, events, jobs and variables

use cascade_engine::domain::job::FAILED_JOB_INCIDENT;
use cascade_engine::domain::process_definition::ListenerEvent;
use cascade_engine::{
    Clock, DataPacket, DelegateContext, EngineConfig, EngineError, ServiceDelegate,
};
use cascade_test_utils::assertions::{activity_paths, assert_activity_tree};
use cascade_test_utils::{ProcessModels, TestEngine, RECORDING_LISTENER};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test]
async fn test_start_and_complete_one_task_process() {
    let engine = TestEngine::new();
    let definition = engine.deploy(ProcessModels::one_task_process()).await;
    let instance = engine.start(&definition).await;

    let tree = engine.tree(&instance.id).await;
    assert_eq!(tree.id.0, instance.id.0);
    assert_activity_tree(&tree, &["Process/userTask"]).unwrap();
    assert_eq!(
        engine.events.count_for("process_instance.started", &instance.id),
        1
    );

    engine.complete_task_at(&instance.id, "userTask").await;

    let ended = engine.instance(&instance.id).await;
    assert!(ended.is_ended());
    assert!(ended.tasks.is_empty());
    assert_eq!(
        engine.events.count_for("process_instance.ended", &instance.id),
        1
    );
}

#[tokio::test]
async fn test_start_by_key_uses_latest_version() {
    let engine = TestEngine::new();
    engine.deploy(ProcessModels::one_task_process()).await;
    let latest = engine.deploy(ProcessModels::subprocess_process()).await;

    let instance = engine
        .runtime
        .start_process_instance_by_key(ProcessModels::PROCESS_KEY, HashMap::new())
        .await
        .unwrap();

    assert_eq!(instance.process_definition_id, latest.id);
    assert_activity_tree(
        &instance.activity_instance_tree().unwrap(),
        &["Process/subProcess", "Process/subProcess/userTask"],
    )
    .unwrap();
}

#[tokio::test]
async fn test_unknown_key_is_reported() {
    let engine = TestEngine::new();
    let err = engine
        .runtime
        .start_process_instance_by_key("unknown", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProcessDefinitionNotFound(_)));
}

#[tokio::test]
async fn test_parallel_gateway_joins_both_branches() {
    let engine = TestEngine::new();
    let definition = engine.deploy(ProcessModels::parallel_gateway_process()).await;
    let instance = engine.start(&definition).await;
    assert_activity_tree(
        &engine.tree(&instance.id).await,
        &["Process/userTask1", "Process/userTask2"],
    )
    .unwrap();

    engine.complete_task_at(&instance.id, "userTask1").await;
    let waiting = engine.instance(&instance.id).await;
    assert!(!waiting.is_ended());
    assert_eq!(waiting.tasks.len(), 1);
    assert_eq!(waiting.tasks[0].task_definition_key, "userTask2");

    engine.complete_task_at(&instance.id, "userTask2").await;
    assert!(engine.instance(&instance.id).await.is_ended());
}

#[tokio::test]
async fn test_listeners_see_scope_start_and_end() {
    let engine = TestEngine::new();
    let model = ProcessModels::subprocess_process()
        .move_to("subProcess")
        .listener(ListenerEvent::Start, RECORDING_LISTENER)
        .listener(ListenerEvent::End, RECORDING_LISTENER);
    let definition = engine.deploy(model).await;
    let instance = engine.start(&definition).await;

    assert_eq!(engine.listener.count("subProcess", ListenerEvent::Start), 1);
    assert_eq!(engine.listener.count("subProcess", ListenerEvent::End), 0);

    engine.complete_task_at(&instance.id, "userTask").await;
    assert_eq!(engine.listener.count("subProcess", ListenerEvent::End), 1);
}

#[tokio::test]
async fn test_service_task_sets_variables() {
    let enrich: Arc<dyn ServiceDelegate> = Arc::new(
        |context: &DelegateContext| -> Result<HashMap<String, DataPacket>, String> {
            let order = context
                .variables
                .get("order")
                .cloned()
                .ok_or_else(|| "order missing".to_string())?;
            Ok(HashMap::from([("echo".to_string(), order)]))
        },
    );
    let engine = TestEngine::builder().with_service("enrich", enrich).build();
    let definition = engine
        .deploy(ProcessModels::service_task_process("enrich"))
        .await;

    let instance = engine
        .start_with(
            &definition,
            HashMap::from([("order".to_string(), DataPacket::from("A-1"))]),
        )
        .await;

    assert_activity_tree(&engine.tree(&instance.id).await, &["Process/userTask"]).unwrap();
    let stored = engine.instance(&instance.id).await;
    assert_eq!(stored.variable("echo").unwrap().value, DataPacket::from("A-1"));
}

#[tokio::test]
async fn test_missing_delegate_fails_start() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::service_task_process("unregistered"))
        .await;
    let err = engine
        .runtime
        .start_process_instance_by_id(&definition.id, HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::DelegateNotFound("unregistered".to_string()));
}

#[tokio::test]
async fn test_message_boundary_interrupts_host() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::message("Cancel")))
        .await;
    let instance = engine.start(&definition).await;
    assert_eq!(engine.instance(&instance.id).await.subscriptions_at("boundary").len(), 1);

    let receiver = engine
        .runtime
        .correlate_message("Cancel", HashMap::new())
        .await
        .unwrap();

    assert_eq!(receiver, instance.id);
    let after = engine.instance(&instance.id).await;
    assert_activity_tree(&after.activity_instance_tree().unwrap(), &["Process/afterBoundaryTask"])
        .unwrap();
    assert!(after.subscriptions_at("boundary").is_empty());
    assert!(after.tasks_at("userTask").is_empty());
}

#[tokio::test]
async fn test_unmatched_message_is_rejected() {
    let engine = TestEngine::new();
    let err = engine
        .runtime
        .correlate_message("Nobody", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::NoMatchingSubscription {
            event_type: "message".to_string(),
            name: "Nobody".to_string(),
        }
    );
}

#[tokio::test]
async fn test_timer_boundary_fires_through_its_job() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::user_task_with_boundary(ProcessModels::timer_minutes(10)))
        .await;
    let instance = engine.start(&definition).await;

    let job = engine.instance(&instance.id).await.jobs_at("boundary")[0].clone();
    assert_eq!(
        job.due_date,
        Some(engine.clock.now() + chrono::Duration::minutes(10))
    );

    engine.execute_job_at(&instance.id, "boundary").await.unwrap();
    assert_activity_tree(&engine.tree(&instance.id).await, &["Process/afterBoundaryTask"])
        .unwrap();
}

#[tokio::test]
async fn test_signal_reaches_every_waiting_instance() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::event_subprocess_process(ProcessModels::signal("Alarm")))
        .await;
    let first = engine.start(&definition).await;
    let second = engine.start(&definition).await;

    let mut received = engine
        .runtime
        .signal_event_received("Alarm", HashMap::new())
        .await
        .unwrap();
    received.sort();
    let mut expected = vec![first.id.clone(), second.id.clone()];
    expected.sort();

    assert_eq!(received, expected);
    for id in [&first.id, &second.id] {
        assert_activity_tree(
            &engine.tree(id).await,
            &["Process/eventSubProcess", "Process/eventSubProcess/eventSubProcessTask"],
        )
        .unwrap();
    }
}

#[tokio::test]
async fn test_receive_task_waits_for_its_message() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::receive_task_process("Payment"))
        .await;
    let instance = engine.start(&definition).await;
    assert_activity_tree(&engine.tree(&instance.id).await, &["Process/receiveTask"]).unwrap();

    engine
        .runtime
        .correlate_message(
            "Payment",
            HashMap::from([("amount".to_string(), DataPacket::from(30))]),
        )
        .await
        .unwrap();

    assert!(engine.instance(&instance.id).await.is_ended());
}

#[tokio::test]
async fn test_async_before_parks_token_until_job_runs() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::one_task_process().move_to("userTask").async_before())
        .await;
    let instance = engine.start(&definition).await;

    assert_eq!(
        activity_paths(&engine.tree(&instance.id).await),
        vec!["Process/userTask~"]
    );
    let job = engine.instance(&instance.id).await.jobs_at("userTask")[0].clone();
    assert_eq!(job.retries, EngineConfig::default().default_job_retries);

    engine.execute_job_at(&instance.id, "userTask").await.unwrap();
    let after = engine.instance(&instance.id).await;
    assert!(after.jobs.is_empty());
    assert_eq!(after.tasks_at("userTask").len(), 1);
}

#[tokio::test]
async fn test_failing_job_loses_retries_then_raises_incident() {
    let failing: Arc<dyn ServiceDelegate> =
        Arc::new(|_: &DelegateContext| -> Result<HashMap<String, DataPacket>, String> {
            Err("backend down".to_string())
        });
    let config = EngineConfig {
        default_job_retries: 2,
        ..EngineConfig::default()
    };
    let engine = TestEngine::builder()
        .with_config(config)
        .with_service("failing", failing)
        .build();
    let definition = engine
        .deploy(
            ProcessModels::service_task_process("failing")
                .move_to("serviceTask")
                .async_before(),
        )
        .await;
    let instance = engine.start(&definition).await;

    let err = engine
        .execute_job_at(&instance.id, "serviceTask")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DelegateFailed { .. }));
    let once = engine.instance(&instance.id).await;
    let job = once.jobs_at("serviceTask")[0].clone();
    assert_eq!(job.retries, 1);
    assert!(job
        .exception_message
        .as_deref()
        .is_some_and(|message| message.contains("backend down")));
    assert!(once.incidents.is_empty());

    engine
        .execute_job_at(&instance.id, "serviceTask")
        .await
        .unwrap_err();
    let twice = engine.instance(&instance.id).await;
    assert_eq!(twice.jobs_at("serviceTask")[0].retries, 0);
    assert_eq!(twice.incidents.len(), 1);
    assert_eq!(twice.incidents[0].incident_type, FAILED_JOB_INCIDENT);
    assert!(twice.incidents[0].is_for_job(&job.id));
    assert_eq!(
        engine.events.count_for("incident.created", &instance.id),
        1
    );
}

#[tokio::test]
async fn test_set_variable_updates_in_place() {
    let engine = TestEngine::new();
    let definition = engine.deploy(ProcessModels::one_task_process()).await;
    let instance = engine
        .start_with(
            &definition,
            HashMap::from([("count".to_string(), DataPacket::from(1))]),
        )
        .await;
    let original = engine.instance(&instance.id).await.variable("count").unwrap().id.clone();

    engine
        .runtime
        .set_variable(&instance.id, "count", DataPacket::from(2))
        .await
        .unwrap();

    let stored = engine.instance(&instance.id).await;
    let count = stored.variable("count").unwrap();
    assert_eq!(count.value, DataPacket::from(2));
    assert_eq!(count.id, original);
}

#[tokio::test]
async fn test_business_key_survives_migration() {
    let engine = TestEngine::new();
    let source = engine.deploy(ProcessModels::one_task_process()).await;
    let target = engine.deploy(ProcessModels::subprocess_process()).await;
    let instance = engine
        .runtime
        .start_process_instance_with_business_key(&source.id, "order-42", HashMap::new())
        .await
        .unwrap();
    assert_eq!(instance.business_key.as_deref(), Some("order-42"));

    let plan = engine
        .plan(&source, &target, |plan| plan.map_activities("userTask", "userTask"))
        .await
        .unwrap();
    let migrated = engine.migrate_one(plan, &instance.id).await.unwrap();

    assert_eq!(migrated.business_key.as_deref(), Some("order-42"));
    assert_eq!(migrated.process_definition_id, target.id);
}

#[tokio::test]
async fn test_conditional_catch_continues_when_triggered() {
    let engine = TestEngine::new();
    let definition = engine
        .deploy(ProcessModels::intermediate_catch_process(
            ProcessModels::conditional("approved"),
        ))
        .await;
    let instance = engine.start(&definition).await;
    assert_activity_tree(&engine.tree(&instance.id).await, &["Process/catch"]).unwrap();

    let triggered = engine
        .runtime
        .trigger_conditional_event("approved", HashMap::new())
        .await
        .unwrap();

    assert_eq!(triggered, vec![instance.id.clone()]);
    assert_activity_tree(&engine.tree(&instance.id).await, &["Process/userTask"]).unwrap();
}
