//! Test fixtures and in-memory stand-ins for services and stores

use async_trait::async_trait;
use dump_manager::error::{ServiceError, StoreError};
use dump_manager::services::{BackupResult, BackupResults, Service};
use dump_manager::stores::{Store, StoreEntry};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Artifact filename for a family on a given day, e.g. `db-20240105000000.sql`
pub fn backup_name(prefix: &str, day: u32, extension: &str) -> String {
    format!("{}-202401{:02}000000{}", prefix, day, extension)
}

/// One operation observed by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Store { dir_prefix: String, filename: String },
    Retrieve(String),
    List(String),
    Delete(String),
    Close,
}

/// Store keeping artifacts in memory and recording every call.
///
/// Keys are `<dir_prefix>/<filename>`, or just the filename at the root.
#[derive(Clone, Default)]
pub struct RecordingStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    ops: Arc<Mutex<Vec<StoreOp>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    fail_listing: Arc<Mutex<bool>>,
    retrieve_dir: Arc<Mutex<Option<PathBuf>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing object
    pub fn with_object(self, key: &str, contents: &[u8]) -> Self {
        self.objects.lock().insert(key.to_string(), contents.to_vec());
        self
    }

    /// Make deleting `key` fail
    pub fn failing_delete(self, key: &str) -> Self {
        self.failing_deletes.lock().insert(key.to_string());
        self
    }

    pub fn failing_listing(self) -> Self {
        *self.fail_listing.lock() = true;
        self
    }

    /// Materialize retrieved objects as files in `dir`
    pub fn retrieving_into(self, dir: &Path) -> Self {
        *self.retrieve_dir.lock() = Some(dir.to_path_buf());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().clone()
    }

    pub fn closed(&self) -> bool {
        self.ops.lock().iter().any(|op| *op == StoreOp::Close)
    }

    fn key(dir_prefix: &str, filename: &str) -> String {
        if dir_prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", dir_prefix.trim_end_matches('/'), filename)
        }
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn store(&self, path: &Path, dir_prefix: &str, filename: &str) -> Result<(), StoreError> {
        self.ops.lock().push(StoreOp::Store {
            dir_prefix: dir_prefix.to_string(),
            filename: filename.to_string(),
        });
        let contents = std::fs::read(path).map_err(|e| StoreError::Store {
            path: path.to_path_buf(),
            dir_prefix: dir_prefix.to_string(),
            source: Box::new(e),
        })?;
        self.objects.lock().insert(Self::key(dir_prefix, filename), contents);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.ops.lock().push(StoreOp::Retrieve(key.to_string()));
        let contents = self.object(key).ok_or_else(|| StoreError::Retrieve {
            key: key.to_string(),
            source: "no such object".into(),
        })?;
        let dir = self
            .retrieve_dir
            .lock()
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let filename = key.rsplit('/').next().unwrap_or(key);
        let path = dir.join(filename);
        std::fs::write(&path, contents).map_err(|e| StoreError::Retrieve {
            key: key.to_string(),
            source: Box::new(e),
        })?;
        Ok(path)
    }

    async fn list_entries(&self, dir_prefix: &str) -> Result<Vec<StoreEntry>, StoreError> {
        self.ops.lock().push(StoreOp::List(dir_prefix.to_string()));
        if *self.fail_listing.lock() {
            return Err(StoreError::List {
                prefix: dir_prefix.to_string(),
                source: "listing disabled".into(),
            });
        }
        let objects = self.objects.lock();
        Ok(objects
            .keys()
            .filter_map(|key| {
                let (dir, filename) = match key.rsplit_once('/') {
                    Some((dir, filename)) => (dir, filename),
                    None => ("", key.as_str()),
                };
                (dir == dir_prefix.trim_end_matches('/')).then(|| StoreEntry::new(key.clone(), filename))
            })
            .collect())
    }

    async fn delete_entry(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        self.ops.lock().push(StoreOp::Delete(entry.key.clone()));
        if self.failing_deletes.lock().contains(&entry.key) {
            return Err(StoreError::Delete {
                key: entry.key.clone(),
                source: "permission denied".into(),
            });
        }
        self.objects.lock().remove(&entry.key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.ops.lock().push(StoreOp::Close);
        Ok(())
    }
}

/// Planned artifact of a [`ScriptedService`]
#[derive(Debug, Clone)]
struct Planned {
    dir_prefix: String,
    name_prefix: String,
    extension: String,
}

/// Service writing small artifacts into a work directory.
///
/// Each backup writes one file per planned artifact, named with a
/// per-call sequence number so consecutive runs sort in order.
#[derive(Clone)]
pub struct ScriptedService {
    work_dir: PathBuf,
    planned: Vec<Planned>,
    fail_backup: bool,
    fail_restore: bool,
    runs: Arc<AtomicUsize>,
    restored: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
}

impl ScriptedService {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            planned: Vec::new(),
            fail_backup: false,
            fail_restore: false,
            runs: Arc::new(AtomicUsize::new(0)),
            restored: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn produces(mut self, dir_prefix: &str, name_prefix: &str, extension: &str) -> Self {
        self.planned.push(Planned {
            dir_prefix: dir_prefix.to_string(),
            name_prefix: name_prefix.to_string(),
            extension: extension.to_string(),
        });
        self
    }

    pub fn failing_backup(mut self) -> Self {
        self.fail_backup = true;
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    /// Number of backup calls so far
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Paths and contents handed to restore
    pub fn restored(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.restored.lock().clone()
    }
}

#[async_trait]
impl Service for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_backup {
            return Err(ServiceError::InvalidConfig("scripted failure".to_string()));
        }

        let mut results = Vec::new();
        for plan in &self.planned {
            let dir = self.work_dir.join(&plan.dir_prefix);
            std::fs::create_dir_all(&dir).map_err(|e| ServiceError::io("create work dir", e))?;
            let filename = format!("{}-2024010100{:04}{}", plan.name_prefix, run, plan.extension);
            let path = dir.join(&filename);
            std::fs::write(&path, format!("run {} of {}", run, plan.name_prefix))
                .map_err(|e| ServiceError::io("write artifact", e))?;
            results.push(BackupResult::new(plan.dir_prefix.clone(), plan.name_prefix.clone(), path));
        }
        Ok(results)
    }

    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError> {
        let contents = std::fs::read(artifact).map_err(|e| ServiceError::io("read artifact", e))?;
        self.restored.lock().push((artifact.to_path_buf(), contents));
        if self.fail_restore {
            return Err(ServiceError::Unsupported("scripted restore".to_string()));
        }
        Ok(())
    }
}
