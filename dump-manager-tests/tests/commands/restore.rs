//! Restore orchestration: pick a key, retrieve it, restore, always close

use dump_manager::error::TaskError;
use dump_manager::run_restore;
use test_utils::fixtures::{backup_name, RecordingStore, ScriptedService, StoreOp};
use test_utils::{ResultAssertions, TestContext};

fn seeded(ctx: &TestContext) -> RecordingStore {
    RecordingStore::new()
        .with_object(&backup_name("db", 1, ".sql"), b"first")
        .with_object(&backup_name("db", 2, ".sql"), b"second")
        .with_object(&backup_name("other", 1, ".sql"), b"other")
        .retrieving_into(&ctx.create_subdir("downloads"))
}

#[tokio::test]
async fn test_restore_latest_of_prefix() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir());
    let store = seeded(&ctx);

    run_restore(&service, &store, None, "db").await.assert_ok();

    let restored = service.restored();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].1, b"second");
    assert_eq!(
        store.ops(),
        vec![
            StoreOp::List(String::new()),
            StoreOp::Retrieve(backup_name("db", 2, ".sql")),
            StoreOp::Close,
        ]
    );
}

#[tokio::test]
async fn test_explicit_key_skips_lookup() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir());
    let store = seeded(&ctx);
    let key = backup_name("db", 1, ".sql");

    run_restore(&service, &store, Some(&key), "db").await.assert_ok();

    assert_eq!(service.restored()[0].1, b"first");
    assert!(!store.ops().iter().any(|op| matches!(op, StoreOp::List(_))));
}

#[tokio::test]
async fn test_no_backup_found() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir());
    let store = seeded(&ctx);

    let result = run_restore(&service, &store, None, "missing").await;

    assert!(matches!(result, Err(TaskError::FindLatest(_))));
    assert!(service.restored().is_empty());
}

#[tokio::test]
async fn test_restore_failure_still_closes_store() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).failing_restore();
    let store = seeded(&ctx);

    let result = run_restore(&service, &store, None, "").await;

    assert!(matches!(result, Err(TaskError::SourceRestore { .. })));
    assert!(store.closed());
}

#[tokio::test]
async fn test_retrieve_failure_still_closes_store() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir());
    let store = seeded(&ctx);

    let result = run_restore(&service, &store, Some("gone.sql"), "").await;

    assert!(matches!(result, Err(TaskError::SinkRetrieve { .. })));
    assert!(store.closed());
    assert!(service.restored().is_empty());
}
