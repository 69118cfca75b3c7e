//! S3-compatible object storage store

use super::{Store, StoreEntry};
use crate::config::S3Config;
use crate::error::{BoxError, StoreError};
use async_trait::async_trait;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Stores artifacts as objects keyed `<prefix>/<dir_prefix>/<filename>`
pub struct S3Store {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    /// Where retrieved objects are downloaded to
    save_dir: PathBuf,
    keep_local_copy: bool,
    retrieved: Mutex<Option<PathBuf>>,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("save_dir", &self.save_dir)
            .finish()
    }
}

impl S3Store {
    pub fn from_config(config: &S3Config, save_dir: &Path) -> Result<Self, StoreError> {
        if config.bucket.is_empty() {
            return Err(StoreError::InvalidConfig("s3 bucket is not set".to_string()));
        }

        // Static keys win; otherwise credentials come from the environment
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_virtual_hosted_style_request(!config.force_path_style)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key, config.resolved_secret_key())
        {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("S3: {}", e)))?;

        Ok(Self::with_object_store(
            Arc::new(store),
            &config.prefix,
            save_dir,
            config.keep_local_copy,
        ))
    }

    /// Wrap an existing object store, e.g. an in-memory one in tests
    pub fn with_object_store(
        store: Arc<dyn ObjectStore>,
        prefix: &str,
        save_dir: &Path,
        keep_local_copy: bool,
    ) -> Self {
        Self {
            store,
            prefix: prefix.trim_matches('/').to_string(),
            save_dir: save_dir.to_path_buf(),
            keep_local_copy,
            retrieved: Mutex::new(None),
        }
    }

    fn object_key(&self, segments: &[&str]) -> String {
        std::iter::once(self.prefix.as_str())
            .chain(segments.iter().copied())
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn upload(&self, path: &Path, key: &ObjectPath) -> Result<(), BoxError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut writer = BufWriter::new(Arc::clone(&self.store), key.clone());
        let written = match tokio::io::copy(&mut file, &mut writer).await {
            Ok(_) => writer.shutdown().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // Drop any multipart upload already started for this key
            if let Err(abort) = writer.abort().await {
                warn!(key = %key, "Failed to abort upload: {}", abort);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn download(&self, key: &ObjectPath, dest: &Path) -> Result<(), BoxError> {
        tokio::fs::create_dir_all(&self.save_dir).await?;
        let mut stream = self.store.get(key).await?.into_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn store(&self, path: &Path, dir_prefix: &str, filename: &str) -> Result<(), StoreError> {
        let key = ObjectPath::from(self.object_key(&[dir_prefix, filename]));

        self.upload(path, &key)
            .await
            .map_err(|source| StoreError::Store {
                path: path.to_path_buf(),
                dir_prefix: dir_prefix.to_string(),
                source,
            })?;
        info!(key = %key, "File uploaded");

        if !self.keep_local_copy {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove uploaded file {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let location = ObjectPath::from(key);
        let filename = location.filename().unwrap_or(key).to_string();
        let dest = self.save_dir.join(filename);

        if let Err(source) = self.download(&location, &dest).await {
            // Do not leave a truncated download behind
            match tokio::fs::remove_file(&dest).await {
                Ok(()) => debug!(path = %dest.display(), "Removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove partial download {}: {}", dest.display(), e),
            }
            return Err(StoreError::Retrieve {
                key: key.to_string(),
                source,
            });
        }

        info!(path = %dest.display(), "File downloaded");
        *self.retrieved.lock() = Some(dest.clone());
        Ok(dest)
    }

    async fn list_entries(&self, dir_prefix: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let prefix = self.object_key(&[dir_prefix]);
        let location = (!prefix.is_empty()).then(|| ObjectPath::from(prefix.as_str()));

        let listing = self
            .store
            .list_with_delimiter(location.as_ref())
            .await
            .map_err(|e| StoreError::List {
                prefix: prefix.clone(),
                source: Box::new(e),
            })?;

        Ok(listing
            .objects
            .into_iter()
            .filter_map(|meta| {
                let filename = meta.location.filename()?.to_string();
                Some(StoreEntry::new(meta.location.to_string(), filename))
            })
            .collect())
    }

    async fn delete_entry(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        self.store
            .delete(&ObjectPath::from(entry.key.as_str()))
            .await
            .map_err(|e| StoreError::Delete {
                key: entry.key.clone(),
                source: Box::new(e),
            })?;
        debug!(key = %entry.key, "Deleted object");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let retrieved = self.retrieved.lock().take();
        if let Some(path) = retrieved {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed retrieved file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Close { path, source }),
            }
        }
        Ok(())
    }
}
