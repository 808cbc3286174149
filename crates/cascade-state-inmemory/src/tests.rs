use crate::InMemoryStateStoreProvider;
use cascade_engine::{
    domain::ids::ProcessInstanceId,
    domain::process_definition::ProcessDefinition,
    domain::process_instance::ProcessInstance,
    EngineError,
};
use chrono::Utc;

fn definition(version: u32) -> ProcessDefinition {
    ProcessDefinition::builder("Process")
        .version(version)
        .start_event("startEvent")
        .user_task("userTask")
        .end_event("endEvent")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_process_instance_repository() -> Result<(), EngineError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, _) = provider.create_repositories();

    let definition = definition(1);
    let instance = ProcessInstance::new(definition.id.clone(), None, Utc::now());

    // First save moves the revision from 0 to 1
    let revision = instance_repo.save(&instance).await?;
    assert_eq!(revision, 1);

    let found = instance_repo.find_by_id(&instance.id).await?.unwrap();
    assert_eq!(found.id, instance.id);
    assert_eq!(found.revision, 1);

    let ids = instance_repo.list_instances(Some(&definition.id)).await?;
    assert_eq!(ids, vec![instance.id.clone()]);

    instance_repo.delete(&instance.id).await?;
    assert!(instance_repo.find_by_id(&instance.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_stale_revision_is_rejected() -> Result<(), EngineError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, _) = provider.create_repositories();

    let instance = ProcessInstance::new(definition(1).id, None, Utc::now());
    instance_repo.save(&instance).await?;

    // Saving the same loaded copy twice means someone else won the race
    let mut loaded = instance_repo.find_by_id(&instance.id).await?.unwrap();
    instance_repo.save(&loaded).await?;
    loaded.business_key = Some("stale".to_string());
    let err = instance_repo.save(&loaded).await.unwrap_err();

    assert!(err.is_optimistic_lock_conflict());
    assert_eq!(
        err,
        EngineError::OptimisticLockConflict {
            instance_id: instance.id.to_string(),
            expected: 1,
            actual: 2,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_save_all_writes_nothing_on_conflict() -> Result<(), EngineError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, _) = provider.create_repositories();

    let first = ProcessInstance::new(definition(1).id, None, Utc::now());
    let second = ProcessInstance::new(definition(1).id, None, Utc::now());
    instance_repo.save(&first).await?;
    instance_repo.save(&second).await?;

    let first_loaded = instance_repo.find_by_id(&first.id).await?.unwrap();
    let second_loaded = instance_repo.find_by_id(&second.id).await?.unwrap();
    // `second` moves on behind the batch's back
    instance_repo.save(&second_loaded).await?;

    let result = instance_repo
        .save_all(&[first_loaded.clone(), second_loaded])
        .await;
    assert!(result.unwrap_err().is_optimistic_lock_conflict());

    let first_after = instance_repo.find_by_id(&first.id).await?.unwrap();
    assert_eq!(first_after.revision, first_loaded.revision);
    Ok(())
}

#[tokio::test]
async fn test_missing_instance() -> Result<(), EngineError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, _) = provider.create_repositories();

    let found = instance_repo
        .find_by_id(&ProcessInstanceId::new("unknown"))
        .await?;
    assert!(found.is_none());
    Ok(())
}

#[tokio::test]
async fn test_process_definition_repository() -> Result<(), EngineError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, definition_repo) = provider.create_repositories();

    let v1 = definition_repo.save(definition(1)).await?;
    let v2 = definition_repo.save(definition(2)).await?;

    let found = definition_repo.find_by_id(&v1.id).await?.unwrap();
    assert_eq!(found.version, 1);

    let latest = definition_repo.find_latest_by_key("Process").await?.unwrap();
    assert_eq!(latest.id, v2.id);
    assert!(definition_repo.find_latest_by_key("Other").await?.is_none());

    assert_eq!(definition_repo.list_definitions().await?.len(), 2);
    Ok(())
}
