//! Tarball service through the filesystem store

use dump_manager::utils::executor::RealExecutor;
use dump_manager::{build_service, build_store, run_backup, run_restore};
use std::fs;
use std::sync::Arc;
use test_utils::{ConfigBuilder, ResultAssertions, Service, ServiceKind, Store, StoreKind, TarballConfig};

#[tokio::test]
async fn test_backup_then_restore_round_trip() {
    let builder = ConfigBuilder::tarball();
    let root = builder.temp_path();
    let config = builder.build();
    let data = root.join("data");

    let service = build_service(ServiceKind::Tarball, &config, Arc::new(RealExecutor::new()));
    let store = build_store(StoreKind::Filesystem, &config).assert_ok();

    run_backup(service.as_ref(), store.as_ref(), 3).await.assert_ok();

    let stored: Vec<String> = fs::read_dir(root.join("store"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("data-backup-"));
    assert!(stored[0].ends_with(".tar.gz"));

    fs::write(data.join("test.txt"), "changed").unwrap();
    fs::write(data.join("stray.txt"), "stray").unwrap();

    run_restore(service.as_ref(), store.as_ref(), None, "data-backup").await.assert_ok();

    assert_eq!(fs::read_to_string(data.join("test.txt")).unwrap(), "test");
    assert!(!data.join("stray.txt").exists());
}

#[tokio::test]
async fn test_per_directory_backups_land_in_partitions() {
    let builder = ConfigBuilder::new();
    let root = builder.temp_path();
    let sites = root.join("sites");
    for site in ["alpha", "beta", "scratch"] {
        fs::create_dir_all(sites.join(site)).unwrap();
        fs::write(sites.join(site).join("index.html"), site).unwrap();
    }
    fs::write(sites.join("loose-file"), "ignored").unwrap();

    let config = builder
        .with_tarball(TarballConfig {
            path: sites.clone(),
            backup_per_dir: true,
            exclude_dirs: vec!["scratch".to_string()],
            ..Default::default()
        })
        .build();

    let service = build_service(ServiceKind::Tarball, &config, Arc::new(RealExecutor::new()));
    let store = build_store(StoreKind::Filesystem, &config).assert_ok();

    let results = service.backup().await.assert_ok();
    let partitions: Vec<&str> = results.iter().map(|r| r.dir_prefix.as_str()).collect();
    assert_eq!(partitions, vec!["alpha", "beta"]);

    run_backup(service.as_ref(), store.as_ref(), 1).await.assert_ok();
    assert!(root.join("store/alpha").is_dir());
    assert!(root.join("store/beta").is_dir());
    assert!(!root.join("store/scratch").exists());

    let key = store.find_latest_backup("beta", "sites_beta-backup").await.assert_ok();
    fs::write(sites.join("beta/index.html"), "broken").unwrap();
    fs::write(sites.join("alpha/index.html"), "untouched").unwrap();

    run_restore(service.as_ref(), store.as_ref(), Some(&key), "").await.assert_ok();

    assert_eq!(fs::read_to_string(sites.join("beta/index.html")).unwrap(), "beta");
    assert_eq!(fs::read_to_string(sites.join("alpha/index.html")).unwrap(), "untouched");
}

#[tokio::test]
async fn test_missing_source_directory_fails_cleanly() {
    let builder = ConfigBuilder::new();
    let root = builder.temp_path();
    let config = builder
        .with_tarball(TarballConfig {
            path: root.join("does-not-exist"),
            name: "ghost".to_string(),
            ..Default::default()
        })
        .build();

    let service = build_service(ServiceKind::Tarball, &config, Arc::new(RealExecutor::new()));
    service.backup().await.assert_err();

    let leftovers: Vec<_> = fs::read_dir(root.join("work")).unwrap().collect();
    assert!(leftovers.is_empty());
}
