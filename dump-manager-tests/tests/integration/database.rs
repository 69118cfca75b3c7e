//! Database services end to end: dump, compress, store, retrieve, restore

use dump_manager::utils::executor::RealExecutor;
use dump_manager::{build_service, build_store, run_backup, run_restore};
use std::sync::Arc;
use test_utils::{
    ConfigBuilder, MockExecutor, MockResponse, PostgresConfig, ResultAssertions, Service,
    ServiceKind, StoreKind,
};

const DUMP: &str = "CREATE TABLE accounts (id int);\nINSERT INTO accounts VALUES (1);\n";

#[tokio::test]
async fn test_compressed_postgres_dump_round_trip() {
    let builder = ConfigBuilder::new().with(|config| {
        config.postgres = PostgresConfig {
            database: "shop".to_string(),
            name_as_prefix: true,
            compress: true,
            password: Some("s3cret".to_string()),
            ..Default::default()
        };
    });
    let root = builder.temp_path();
    let config = builder.build();

    let executor = MockExecutor::new().expect(
        "pg_dump",
        MockResponse::Success {
            stdout: DUMP.to_string(),
        },
    );
    let service = build_service(ServiceKind::Postgres, &config, Arc::new(executor.clone()));
    let store = build_store(StoreKind::Filesystem, &config).assert_ok();

    run_backup(service.as_ref(), store.as_ref(), 5).await.assert_ok();

    let stored: Vec<String> = std::fs::read_dir(root.join("store"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("shop-"));
    assert!(stored[0].ends_with(".sql.gz"));

    run_restore(service.as_ref(), store.as_ref(), None, "shop").await.assert_ok();

    let psql = executor.calls_to("psql");
    assert_eq!(psql.len(), 1);
    assert_eq!(String::from_utf8_lossy(&psql[0].stdin), DUMP);
    assert_eq!(psql[0].arg_after("-d"), Some("shop"));
    assert_eq!(psql[0].env_value("PGPASSWORD"), Some("s3cret"));
}

#[tokio::test]
async fn test_failed_dump_stores_nothing() {
    let config = ConfigBuilder::new()
        .with(|config| {
            config.postgres.database = "shop".to_string();
            config.postgres.compress = true;
        })
        .build();
    let store_root = config.filesystem.save_dir.clone().unwrap();

    let executor = MockExecutor::new().expect("pg_dump", MockResponse::Failure { exit_code: 1 });
    let service = build_service(ServiceKind::Postgres, &config, Arc::new(executor));
    let store = build_store(StoreKind::Filesystem, &config).assert_ok();

    run_backup(service.as_ref(), store.as_ref(), 5).await.assert_err();

    assert_eq!(std::fs::read_dir(&store_root).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(&config.global.save_dir).unwrap().count(), 0);
}

/// Needs a reachable server and client tools in /usr/bin
#[tokio::test]
#[ignore]
async fn test_live_postgres_cluster_dump() {
    let builder = ConfigBuilder::new().with(|config| {
        config.postgres.host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        config.postgres.user = std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string());
        config.postgres.password = std::env::var("PGPASSWORD").ok();
        config.postgres.compress = true;
    });
    let config = builder.build();

    let service = build_service(ServiceKind::Postgres, &config, Arc::new(RealExecutor::new()));
    let results = service.backup().await.assert_ok();

    assert_eq!(results.len(), 1);
    assert!(std::fs::metadata(&results[0].path).unwrap().len() > 0);
}
