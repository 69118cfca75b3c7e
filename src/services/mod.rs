//! Backup sources: services that produce and consume backup artifacts

pub mod common;
pub mod consul;
pub mod gitea;
pub mod mysql;
pub mod postgres;
pub mod tarball;

use crate::config::Config;
use crate::error::ServiceError;
use crate::utils::executor::CommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use consul::ConsulService;
pub use gitea::GiteaService;
pub use mysql::MysqlService;
pub use postgres::PostgresService;
pub use tarball::TarballService;

/// One produced artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// Partition inside the store, empty for the store root
    pub dir_prefix: String,
    /// Naming family used for retention
    pub name_prefix: String,
    /// Local path of the fresh artifact
    pub path: PathBuf,
}

impl BackupResult {
    pub fn new(dir_prefix: impl Into<String>, name_prefix: impl Into<String>, path: PathBuf) -> Self {
        Self {
            dir_prefix: dir_prefix.into(),
            name_prefix: name_prefix.into(),
            path,
        }
    }

    /// Filename the artifact is stored under
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Artifacts of one backup run, in production order
pub type BackupResults = Vec<BackupResult>;

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Produce every artifact of one run, or fail before returning any
    async fn backup(&self) -> Result<BackupResults, ServiceError>;

    /// Load a single artifact back into the service
    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError>;
}

/// Available backup services
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    Postgres,
    Mysql,
    Tarball,
    Consul,
    Gitea,
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Postgres => "postgres",
            ServiceKind::Mysql => "mysql",
            ServiceKind::Tarball => "tarball",
            ServiceKind::Consul => "consul",
            ServiceKind::Gitea => "gitea",
        }
    }
}

/// Construct the service selected by `kind` from configuration
pub fn build_service(
    kind: ServiceKind,
    config: &Config,
    executor: Arc<dyn CommandExecutor>,
) -> Arc<dyn Service> {
    let save_dir = config.global.save_dir.clone();
    match kind {
        ServiceKind::Postgres => Arc::new(PostgresService::new(
            config.postgres.clone(),
            save_dir,
            executor,
        )),
        ServiceKind::Mysql => Arc::new(MysqlService::new(config.mysql.clone(), save_dir, executor)),
        ServiceKind::Tarball => Arc::new(TarballService::new(config.tarball.clone(), save_dir)),
        ServiceKind::Consul => Arc::new(ConsulService::new(config.consul.clone(), save_dir, executor)),
        ServiceKind::Gitea => Arc::new(GiteaService::new(config.gitea.clone(), save_dir, executor)),
    }
}
