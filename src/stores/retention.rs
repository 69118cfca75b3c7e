//! Retention pruning and latest-backup lookup over a store listing.
//!
//! Artifact filenames embed a fixed-width timestamp
//! (`<name_prefix>-<YYYYMMDDHHMMSS>[.ext]`), so sorting one family by
//! filename sorts it chronologically. Entries that do not follow the pattern
//! are never counted or deleted.

use super::{Store, StoreEntry};
use crate::error::StoreError;
use regex::Regex;
use tracing::{debug, error, info};

/// Outcome of one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries belonging to the family
    pub matched: usize,
    pub deleted: usize,
    /// Deletions that failed and were skipped
    pub failed: usize,
}

/// Filename pattern of one backup family; an empty prefix matches any family
pub fn backup_pattern(name_prefix: &str) -> Result<Regex, StoreError> {
    let family = if name_prefix.is_empty() {
        ".+".to_string()
    } else {
        regex::escape(name_prefix)
    };
    Ok(Regex::new(&format!(r"^{}-\d{{14}}(\.[\w.]+)?$", family))?)
}

/// Entries of the family sorted oldest first
pub fn matching_entries(
    entries: Vec<StoreEntry>,
    name_prefix: &str,
) -> Result<Vec<StoreEntry>, StoreError> {
    let pattern = backup_pattern(name_prefix)?;
    let mut matched: Vec<StoreEntry> = entries
        .into_iter()
        .filter(|entry| pattern.is_match(&entry.filename))
        .collect();
    matched.sort();
    Ok(matched)
}

/// The oldest entries that exceed `keep`; nothing when `keep` is 0
pub fn entries_to_prune(sorted: &[StoreEntry], keep: usize) -> &[StoreEntry] {
    if keep == 0 || sorted.len() <= keep {
        return &[];
    }
    &sorted[..sorted.len() - keep]
}

/// Delete all but the `keep` newest backups of one family.
///
/// Listing failures abort; individual deletion failures are logged and
/// counted in the report.
pub async fn remove_older_backups<S>(
    store: &S,
    dir_prefix: &str,
    name_prefix: &str,
    keep: usize,
) -> Result<PruneReport, StoreError>
where
    S: Store + ?Sized,
{
    if keep == 0 {
        debug!("Backup pruning disabled");
        return Ok(PruneReport::default());
    }

    let entries = store.list_entries(dir_prefix).await?;
    let sorted = matching_entries(entries, name_prefix)?;
    let mut report = PruneReport {
        matched: sorted.len(),
        ..Default::default()
    };

    for entry in entries_to_prune(&sorted, keep) {
        debug!(key = %entry.key, "Marked to delete");
        match store.delete_entry(entry).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                error!("Failed to remove old backup {}: {}", entry.key, e);
                report.failed += 1;
            }
        }
    }

    if report.deleted > 0 || report.failed > 0 {
        info!(
            store = store.name(),
            dir_prefix,
            deleted = report.deleted,
            failed = report.failed,
            "Removed old backups"
        );
    }

    Ok(report)
}

/// Key of the newest backup of one family
pub async fn find_latest_backup<S>(
    store: &S,
    dir_prefix: &str,
    name_prefix: &str,
) -> Result<String, StoreError>
where
    S: Store + ?Sized,
{
    let entries = store.list_entries(dir_prefix).await?;
    let sorted = matching_entries(entries, name_prefix)?;

    sorted
        .into_iter()
        .last()
        .map(|entry| entry.key)
        .ok_or_else(|| StoreError::NoBackupFound {
            dir_prefix: dir_prefix.to_string(),
            name_prefix: name_prefix.to_string(),
        })
}
