//! Backup stores: where finished artifacts are kept
//!
//! A store addresses artifacts by a directory prefix (the partition) and a
//! filename. Pruning and latest-backup lookup are built once on top of the
//! listing and deletion primitives each backend provides.

pub mod filesystem;
pub mod retention;
pub mod s3;

use crate::config::Config;
use crate::error::StoreError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use filesystem::FilesystemStore;
pub use retention::PruneReport;
pub use s3::S3Store;

/// One listed artifact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoreEntry {
    /// Bare filename, used for pattern matching and ordering
    pub filename: String,
    /// Store-specific address accepted by `retrieve` and `delete_entry`
    pub key: String,
}

impl StoreEntry {
    pub fn new(key: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    /// Move a local artifact into the store under `dir_prefix/filename`
    async fn store(&self, path: &Path, dir_prefix: &str, filename: &str) -> Result<(), StoreError>;

    /// Make the artifact behind `key` available as a local file
    async fn retrieve(&self, key: &str) -> Result<PathBuf, StoreError>;

    /// Files directly under `dir_prefix`
    async fn list_entries(&self, dir_prefix: &str) -> Result<Vec<StoreEntry>, StoreError>;

    async fn delete_entry(&self, entry: &StoreEntry) -> Result<(), StoreError>;

    /// Release whatever `retrieve` materialized; fine to call without it
    async fn close(&self) -> Result<(), StoreError>;

    async fn remove_older_backups(
        &self,
        dir_prefix: &str,
        name_prefix: &str,
        keep: usize,
    ) -> Result<PruneReport, StoreError> {
        retention::remove_older_backups(self, dir_prefix, name_prefix, keep).await
    }

    async fn find_latest_backup(
        &self,
        dir_prefix: &str,
        name_prefix: &str,
    ) -> Result<String, StoreError> {
        retention::find_latest_backup(self, dir_prefix, name_prefix).await
    }
}

/// Available store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    S3,
    Filesystem,
}

impl StoreKind {
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::S3 => "s3",
            StoreKind::Filesystem => "filesystem",
        }
    }
}

/// Construct the store selected by `kind` from configuration
pub fn build_store(kind: StoreKind, config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    match kind {
        StoreKind::S3 => Ok(Arc::new(S3Store::from_config(
            &config.s3,
            &config.global.save_dir,
        )?)),
        StoreKind::Filesystem => {
            let root = config
                .filesystem
                .save_dir
                .clone()
                .unwrap_or_else(|| config.global.save_dir.clone());
            Ok(Arc::new(FilesystemStore::new(root)))
        }
    }
}
