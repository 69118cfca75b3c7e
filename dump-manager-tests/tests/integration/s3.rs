//! S3 store over an in-memory object store

use dump_manager::stores::s3::S3Store;
use dump_manager::{run_backup, run_restore};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use test_utils::fixtures::ScriptedService;
use test_utils::{ResultAssertions, Store, TestContext};

async fn object_keys(objects: &InMemory) -> Vec<String> {
    use futures::StreamExt;
    let mut keys = Vec::new();
    let mut listing = objects.list(None);
    while let Some(meta) = listing.next().await {
        keys.push(meta.unwrap().location.to_string());
    }
    keys.sort();
    keys
}

#[tokio::test]
async fn test_backups_are_uploaded_pruned_and_restored() {
    let ctx = TestContext::new();
    let objects = Arc::new(InMemory::new());
    let store = S3Store::with_object_store(objects.clone(), "backups", &ctx.create_subdir("downloads"), false);
    let service = ScriptedService::new(ctx.work_dir()).produces("app", "app", ".sql.gz");

    for _ in 0..3 {
        run_backup(&service, &store, 2).await.assert_ok();
    }

    assert_eq!(
        object_keys(&objects).await,
        vec![
            "backups/app/app-20240101000002.sql.gz",
            "backups/app/app-20240101000003.sql.gz",
        ]
    );
    assert!(ctx.list_files("work/app").is_empty());

    let key = store.find_latest_backup("app", "app").await.assert_ok();
    assert_eq!(key, "backups/app/app-20240101000003.sql.gz");

    run_restore(&service, &store, Some(&key), "").await.assert_ok();

    let restored = service.restored();
    assert_eq!(restored[0].1, b"run 3 of app");
    // The download is removed when the store is closed
    assert!(!restored[0].0.exists());
}

#[tokio::test]
async fn test_foreign_objects_survive_pruning() {
    let ctx = TestContext::new();
    let objects = Arc::new(InMemory::new());
    objects
        .put(&ObjectPath::from("backups/README"), "hello".into())
        .await
        .unwrap();
    let store = S3Store::with_object_store(objects.clone(), "backups", ctx.temp_dir(), false);
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");

    for _ in 0..2 {
        run_backup(&service, &store, 1).await.assert_ok();
    }

    assert_eq!(
        object_keys(&objects).await,
        vec!["backups/README", "backups/db-20240101000002.sql"]
    );
}
