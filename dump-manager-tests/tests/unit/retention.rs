//! Unit tests for retention pruning and latest-backup lookup

use dump_manager::stores::retention::{backup_pattern, entries_to_prune, matching_entries};
use rstest::rstest;
use test_utils::fixtures::{backup_name, RecordingStore, StoreOp};
use test_utils::{ResultAssertions, Store, StoreEntry};

fn entries(names: &[&str]) -> Vec<StoreEntry> {
    names.iter().map(|n| StoreEntry::new(*n, *n)).collect()
}

#[rstest]
#[case("db", "db-20240101000000.sql", true)]
#[case("db", "db-20240101000000.sql.gz", true)]
#[case("db", "db-20240101000000", true)]
#[case("db", "db-2024010100000.sql", false)]
#[case("db", "dbx-20240101000000.sql", false)]
#[case("db", "notes.txt", false)]
#[case("a.b", "aXb-20240101000000.sql", false)]
#[case("", "anything-20240101000000.tar.gz", true)]
fn test_backup_pattern(#[case] prefix: &str, #[case] filename: &str, #[case] expected: bool) {
    let pattern = backup_pattern(prefix).assert_ok();
    assert_eq!(pattern.is_match(filename), expected, "{} vs {}", prefix, filename);
}

#[test]
fn test_matching_entries_sorted_oldest_first() {
    let listed = entries(&[
        "db-20240103000000.sql",
        "readme.md",
        "db-20240101000000.sql",
        "db-20240102000000.sql",
    ]);

    let sorted = matching_entries(listed, "db").assert_ok();
    let names: Vec<&str> = sorted.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(
        names,
        vec!["db-20240101000000.sql", "db-20240102000000.sql", "db-20240103000000.sql"]
    );
}

#[rstest]
#[case(5, 0, 0)]
#[case(5, 3, 2)]
#[case(5, 5, 0)]
#[case(2, 5, 0)]
fn test_entries_to_prune(#[case] total: usize, #[case] keep: usize, #[case] expected: usize) {
    let names: Vec<String> = (1..=total as u32).map(|d| backup_name("db", d, ".sql")).collect();
    let sorted: Vec<StoreEntry> = names.iter().map(|n| StoreEntry::new(n.as_str(), n.as_str())).collect();

    let doomed = entries_to_prune(&sorted, keep);
    assert_eq!(doomed.len(), expected);
    if expected > 0 {
        assert_eq!(doomed[0].filename, backup_name("db", 1, ".sql"));
    }
}

#[tokio::test]
async fn test_prune_only_touches_its_partition() {
    let mut store = RecordingStore::new();
    for day in 1..=4 {
        store = store
            .with_object(&format!("app/{}", backup_name("app", day, ".sql")), b"x")
            .with_object(&format!("other/{}", backup_name("app", day, ".sql")), b"y");
    }

    let report = store.remove_older_backups("app", "app", 2).await.assert_ok();

    assert_eq!(report.matched, 4);
    assert_eq!(report.deleted, 2);
    assert_eq!(
        store.keys(),
        vec![
            format!("app/{}", backup_name("app", 3, ".sql")),
            format!("app/{}", backup_name("app", 4, ".sql")),
            format!("other/{}", backup_name("app", 1, ".sql")),
            format!("other/{}", backup_name("app", 2, ".sql")),
            format!("other/{}", backup_name("app", 3, ".sql")),
            format!("other/{}", backup_name("app", 4, ".sql")),
        ]
    );
}

#[tokio::test]
async fn test_prune_skips_failed_deletion() {
    let oldest = backup_name("db", 1, ".sql");
    let store = RecordingStore::new()
        .with_object(&oldest, b"1")
        .with_object(&backup_name("db", 2, ".sql"), b"2")
        .with_object(&backup_name("db", 3, ".sql"), b"3")
        .failing_delete(&oldest);

    let report = store.remove_older_backups("", "db", 1).await.assert_ok();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 1);
    assert!(store.object(&oldest).is_some());
    assert!(store.object(&backup_name("db", 2, ".sql")).is_none());
}

#[tokio::test]
async fn test_keep_zero_does_not_list() {
    let store = RecordingStore::new().with_object(&backup_name("db", 1, ".sql"), b"1");

    let report = store.remove_older_backups("", "db", 0).await.assert_ok();

    assert_eq!(report.deleted, 0);
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn test_find_latest_across_families() {
    let store = RecordingStore::new()
        .with_object(&backup_name("alpha", 9, ".sql"), b"a")
        .with_object(&backup_name("beta", 3, ".sql"), b"b")
        .with_object("unrelated.bin", b"c");

    let any = store.find_latest_backup("", "").await.assert_ok();
    assert_eq!(any, backup_name("beta", 3, ".sql"));

    let alpha = store.find_latest_backup("", "alpha").await.assert_ok();
    assert_eq!(alpha, backup_name("alpha", 9, ".sql"));

    store.find_latest_backup("", "gamma").await.assert_err_contains("gamma");
    assert_eq!(store.ops()[0], StoreOp::List(String::new()));
}
