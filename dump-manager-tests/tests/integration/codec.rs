//! Streaming gzip codec against real processes

use dump_manager::utils::codec::{run_from_file, run_to_compressed_file};
use dump_manager::utils::command::CommandSpec;
use dump_manager::utils::executor::RealExecutor;
use dump_manager::ServiceError;
use test_utils::{ResultAssertions, TestContext};

fn shell(script: &str) -> CommandSpec {
    CommandSpec::new("sh").args(["-c", script])
}

#[tokio::test]
async fn test_compress_then_feed_back() {
    let ctx = TestContext::new();
    let executor = RealExecutor::new();
    let dump = ctx.temp_dir().join("dump.sql.gz");

    run_to_compressed_file(&executor, &shell("seq 1 20000"), &dump)
        .await
        .assert_ok();
    assert!(dump.exists());

    let restored = ctx.temp_dir().join("restored.sql");
    let script = format!("cat > '{}'", restored.display());
    run_from_file(&executor, &shell(&script), &dump).await.assert_ok();

    let expected: String = (1..=20000).map(|n| format!("{}\n", n)).collect();
    assert_eq!(ctx.read_file("restored.sql").unwrap(), expected);
}

#[tokio::test]
async fn test_plain_file_is_fed_unchanged() {
    let ctx = TestContext::new();
    let plain = ctx.create_file("dump.sql", "CREATE TABLE t (id int);\n");
    let copy = ctx.temp_dir().join("copy.sql");

    let script = format!("cat > '{}'", copy.display());
    run_from_file(&RealExecutor::new(), &shell(&script), &plain)
        .await
        .assert_ok();

    assert_eq!(ctx.read_file("copy.sql").unwrap(), "CREATE TABLE t (id int);\n");
}

#[tokio::test]
async fn test_failed_dump_leaves_no_file() {
    let ctx = TestContext::new();
    let dump = ctx.temp_dir().join("broken.sql.gz");

    let result = run_to_compressed_file(&RealExecutor::new(), &shell("printf partial; exit 3"), &dump).await;

    match result {
        Err(ServiceError::Process(e)) => assert!(e.is_exit_status()),
        other => panic!("expected exit status failure, got {:?}", other),
    }
    assert!(!dump.exists());
}

#[tokio::test]
async fn test_consumer_exit_status_is_reported() {
    let ctx = TestContext::new();
    let plain = ctx.create_file("dump.sql", "SELECT 1;\n");

    let result = run_from_file(&RealExecutor::new(), &shell("cat > /dev/null; exit 2"), &plain).await;

    assert!(matches!(result, Err(ServiceError::Process(ref e)) if e.is_exit_status()));
}
