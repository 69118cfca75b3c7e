//! Local directory store

use super::{Store, StoreEntry};
use crate::error::{BoxError, StoreError};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Keeps artifacts under `<root>/<dir_prefix>/<filename>`; keys are full paths
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition(&self, dir_prefix: &str) -> PathBuf {
        if dir_prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(dir_prefix)
        }
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy, flush the copy to disk, then drop the source
async fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src).await?;
    let mut writer = fs::File::create(dest).await?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    drop(writer);
    fs::remove_file(src).await
}

#[async_trait]
impl Store for FilesystemStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn store(&self, path: &Path, dir_prefix: &str, filename: &str) -> Result<(), StoreError> {
        let wrap = |source: BoxError| StoreError::Store {
            path: path.to_path_buf(),
            dir_prefix: dir_prefix.to_string(),
            source,
        };

        let dest_dir = self.partition(dir_prefix);
        let dest = dest_dir.join(filename);

        if same_file(path, &dest).await {
            debug!("Using the same path as source and destination, nothing to do");
            return Ok(());
        }

        fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| wrap(Box::new(e)))?;

        if let Err(e) = fs::rename(path, &dest).await {
            warn!(
                "Cannot rename {} to {} ({}), trying to copy instead",
                path.display(),
                dest.display(),
                e
            );
            copy_then_remove(path, &dest)
                .await
                .map_err(|e| wrap(Box::new(e)))?;
        }

        info!(path = %dest.display(), "Backup stored");
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(PathBuf::from(key))
    }

    async fn list_entries(&self, dir_prefix: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let dir = self.partition(dir_prefix);
        let list_err = |e: io::Error| StoreError::List {
            prefix: dir.display().to_string(),
            source: Box::new(e),
        };

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            // Nothing stored in this partition yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_err(e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = read_dir.next_entry().await.map_err(list_err)? {
            let file_type = item.file_type().await.map_err(list_err)?;
            if !file_type.is_file() {
                continue;
            }
            let filename = item.file_name().to_string_lossy().into_owned();
            entries.push(StoreEntry::new(
                item.path().to_string_lossy().into_owned(),
                filename,
            ));
        }

        Ok(entries)
    }

    async fn delete_entry(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        fs::remove_file(&entry.key)
            .await
            .map_err(|e| StoreError::Delete {
                key: entry.key.clone(),
                source: Box::new(e),
            })
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
