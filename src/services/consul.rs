//! Consul snapshot service

use super::common::{ensure_dir, generate_filename, with_extension};
use super::{BackupResult, BackupResults, Service};
use crate::config::ConsulConfig;
use crate::error::ServiceError;
use crate::utils::command::{CommandSpec, Input, Output};
use crate::utils::executor::CommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const NAME_PREFIX: &str = "consul-backup";

pub struct ConsulService {
    config: ConsulConfig,
    save_dir: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl ConsulService {
    pub fn new(config: ConsulConfig, save_dir: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            save_dir,
            executor,
        }
    }

    async fn snapshot(&self, action: &str, file: &Path) -> Result<(), ServiceError> {
        let spec = CommandSpec::new(&self.config.binary).args([
            "snapshot".to_string(),
            action.to_string(),
            file.display().to_string(),
        ]);
        self.executor.run(&spec, Input::Null, Output::Inherit).await?;
        Ok(())
    }
}

#[async_trait]
impl Service for ConsulService {
    fn name(&self) -> &str {
        "consul"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        ensure_dir(&self.save_dir).await?;
        let path = with_extension(generate_filename(&self.save_dir, NAME_PREFIX), ".snap");
        self.snapshot("save", &path).await?;

        info!("Saved consul snapshot to {}", path.display());
        Ok(vec![BackupResult::new("", NAME_PREFIX, path)])
    }

    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError> {
        info!("Restoring consul snapshot {}", artifact.display());
        self.snapshot("restore", artifact).await
    }
}
