//! Gitea dump service
//!
//! Runs `gitea dump` as the configured git user. Restores are not supported;
//! a dump has to be imported by hand.

use super::common::{ensure_dir, generate_filename, with_extension};
use super::{BackupResult, BackupResults, Service};
use crate::config::GiteaConfig;
use crate::error::ServiceError;
use crate::utils::command::{is_privileged, CommandSpec, Credential, Input, Output};
use crate::utils::executor::CommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const NAME_PREFIX: &str = "gitea-dump";

pub struct GiteaService {
    config: GiteaConfig,
    save_dir: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl GiteaService {
    pub fn new(config: GiteaConfig, save_dir: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            save_dir,
            executor,
        }
    }

    fn credential(&self) -> Credential {
        Credential {
            uid: self.config.uid,
            gid: self.config.gid,
        }
    }

    fn dump_command(&self, filename: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.binary)
            .args(["dump", "--skip-log", "--tempdir"])
            .arg(self.save_dir.display().to_string())
            .args(["--file", filename]);
        if let Some(config_path) = &self.config.config_path {
            spec = spec.arg("--config").arg(config_path.display().to_string());
        }
        spec.env("USER", "git")
            .env("HOME", self.config.data_path.join("git").display().to_string())
            .current_dir(&self.save_dir)
            .credential(self.credential())
    }

    /// Hand the save directory to the git user so the dump can be written
    fn grant_save_dir(&self) -> Result<(), ServiceError> {
        if !is_privileged() {
            debug!("Not running as root, leaving ownership of {} unchanged", self.save_dir.display());
            return Ok(());
        }
        let Credential { uid, gid } = self.credential();
        std::os::unix::fs::chown(&self.save_dir, Some(uid), Some(gid)).map_err(|e| {
            ServiceError::io(format!("cannot change owner of {}", self.save_dir.display()), e)
        })
    }
}

#[async_trait]
impl Service for GiteaService {
    fn name(&self) -> &str {
        "gitea"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        ensure_dir(&self.save_dir).await?;
        self.grant_save_dir()?;

        let filename = with_extension(generate_filename(Path::new(""), NAME_PREFIX), ".zip");
        let filename = filename.display().to_string();
        self.executor
            .run(&self.dump_command(&filename), Input::Null, Output::Inherit)
            .await?;

        let path = self.save_dir.join(&filename);
        info!("Saved gitea dump to {}", path.display());
        Ok(vec![BackupResult::new("", NAME_PREFIX, path)])
    }

    async fn restore(&self, _artifact: &Path) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported("gitea restore".to_string()))
    }
}
