//! Backup orchestration: store every artifact, then prune its family

use dump_manager::error::TaskError;
use dump_manager::run_backup;
use test_utils::fixtures::{RecordingStore, ScriptedService, StoreOp};
use test_utils::{ResultAssertions, TestContext};

#[tokio::test]
async fn test_backup_stores_then_prunes_each_artifact() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir())
        .produces("", "cluster", ".sql")
        .produces("app", "app", ".sql.gz");
    let store = RecordingStore::new();

    run_backup(&service, &store, 3).await.assert_ok();

    assert_eq!(
        store.ops(),
        vec![
            StoreOp::Store {
                dir_prefix: String::new(),
                filename: "cluster-20240101000001.sql".to_string(),
            },
            StoreOp::List(String::new()),
            StoreOp::Store {
                dir_prefix: "app".to_string(),
                filename: "app-20240101000001.sql.gz".to_string(),
            },
            StoreOp::List("app".to_string()),
        ]
    );
    assert_eq!(
        store.object("app/app-20240101000001.sql.gz").as_deref(),
        Some("run 1 of app".as_bytes())
    );
}

#[tokio::test]
async fn test_repeated_backups_keep_newest() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
    let store = RecordingStore::new().with_object("notes.txt", b"keep me");

    for _ in 0..5 {
        run_backup(&service, &store, 2).await.assert_ok();
    }

    assert_eq!(service.runs(), 5);
    assert_eq!(
        store.keys(),
        vec!["db-20240101000004.sql", "db-20240101000005.sql", "notes.txt"]
    );
}

#[tokio::test]
async fn test_keep_zero_retains_everything() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
    let store = RecordingStore::new();

    for _ in 0..4 {
        run_backup(&service, &store, 0).await.assert_ok();
    }

    assert_eq!(store.keys().len(), 4);
}

#[tokio::test]
async fn test_backup_failure_touches_no_store() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir())
        .produces("", "db", ".sql")
        .failing_backup();
    let store = RecordingStore::new();

    let result = run_backup(&service, &store, 3).await;

    assert!(matches!(result, Err(TaskError::SourceBackup { .. })));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn test_prune_listing_failure_aborts_after_first_store() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir())
        .produces("a", "a", ".sql")
        .produces("b", "b", ".sql");
    let store = RecordingStore::new().failing_listing();

    let result = run_backup(&service, &store, 3).await;

    assert!(matches!(result, Err(TaskError::SinkPrune(_))));
    assert_eq!(store.keys(), vec!["a/a-20240101000001.sql"]);
}

#[tokio::test]
async fn test_failed_deletion_does_not_fail_backup() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
    let store = RecordingStore::new()
        .with_object("db-20230101000000.sql", b"old")
        .failing_delete("db-20230101000000.sql");

    run_backup(&service, &store, 1).await.assert_ok();

    assert_eq!(
        store.keys(),
        vec!["db-20230101000000.sql", "db-20240101000001.sql"]
    );
}
