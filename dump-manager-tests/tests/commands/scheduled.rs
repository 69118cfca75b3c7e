//! Tasks driven by the scheduler

use async_trait::async_trait;
use dump_manager::error::TaskError;
use dump_manager::managers::scheduler::{JitterSource, Sleeper};
use dump_manager::{Schedule, Scheduler, Task, TaskKind};
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{RecordingStore, ScriptedService};
use test_utils::{ResultAssertions, TestContext};

struct NoJitter;

impl JitterSource for NoJitter {
    fn next_delay(&self, _max: u64) -> u64 {
        0
    }
}

/// Turns every wait into a millisecond
struct BriefSleeper;

#[async_trait]
impl Sleeper for BriefSleeper {
    async fn sleep(&self, _duration: Duration) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn fast_scheduler(schedule: Schedule) -> Scheduler {
    Scheduler::new(schedule, 1)
        .with_jitter_source(Arc::new(NoJitter))
        .with_sleeper(Arc::new(BriefSleeper))
}

#[tokio::test]
async fn test_once_runs_backup_and_returns() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
    let store = RecordingStore::new();
    let task = Task::new(Arc::new(service.clone()), Arc::new(store.clone()), TaskKind::Backup { keep: 2 });

    fast_scheduler(Schedule::Once)
        .run_until(
            move || {
                let task = task.clone();
                async move { task.run().await }
            },
            std::future::pending(),
        )
        .await
        .assert_ok();

    assert_eq!(service.runs(), 1);
    assert_eq!(store.keys(), vec!["db-20240101000001.sql"]);
}

#[tokio::test]
async fn test_once_surfaces_restore_failure() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir());
    let store = RecordingStore::new();
    let task = Task::new(
        Arc::new(service),
        Arc::new(store.clone()),
        TaskKind::Restore {
            key: None,
            prefix: "db".to_string(),
        },
    );

    let result = fast_scheduler(Schedule::Once)
        .run_until(
            move || {
                let task = task.clone();
                async move { task.run().await }
            },
            std::future::pending(),
        )
        .await;

    assert!(matches!(result, Err(TaskError::FindLatest(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recurring_backups_apply_retention() {
    let ctx = TestContext::new();
    let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
    let store = RecordingStore::new();
    let task = Task::new(Arc::new(service.clone()), Arc::new(store.clone()), TaskKind::Backup { keep: 2 });

    let shutdown = {
        let service = service.clone();
        async move {
            while service.runs() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    };

    fast_scheduler(Schedule::parse("* * * * * *").unwrap())
        .run_until(
            move || {
                let task = task.clone();
                async move { task.run().await }
            },
            shutdown,
        )
        .await
        .assert_ok();

    let runs = service.runs();
    assert!(runs >= 4);
    let keys = store.keys();
    assert!(!keys.is_empty());
    assert!(keys.contains(&format!("db-2024010100{:04}.sql", runs)));
}
