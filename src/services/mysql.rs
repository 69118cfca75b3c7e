//! MySQL / MariaDB backup service

use super::common::{
    ensure_dir, generate_filename, matches_exclude_pattern, split_options, tolerate_exit_status,
    with_extension,
};
use super::{BackupResult, BackupResults, Service};
use crate::config::MysqlConfig;
use crate::error::ServiceError;
use crate::utils::codec::{run_from_file, run_to_compressed_file};
use crate::utils::command::{CommandSpec, Input, Output};
use crate::utils::executor::CommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DEFAULT_NAME_PREFIX: &str = "mysql-backup";
const PASSWORD_FLAG: &str = "-p";

pub struct MysqlService {
    config: MysqlConfig,
    save_dir: PathBuf,
    password: Option<String>,
    executor: Arc<dyn CommandExecutor>,
}

impl MysqlService {
    pub fn new(config: MysqlConfig, save_dir: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        let password = config.resolved_password();
        Self {
            config,
            save_dir,
            password,
            executor,
        }
    }

    /// Connection arguments; the password is passed inline and censored in logs
    fn base_args(&self, with_options: bool) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.config.host.clone(),
            "-P".to_string(),
            self.config.port.to_string(),
            "-u".to_string(),
            self.config.user.clone(),
        ];
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            args.push(format!("{}{}", PASSWORD_FLAG, password));
        }
        if with_options {
            args.extend(split_options(&self.config.options));
        }
        args
    }

    fn dump_command(&self) -> CommandSpec {
        CommandSpec::new(&self.config.dump_binary).censor(PASSWORD_FLAG)
    }

    fn client_command(&self) -> CommandSpec {
        CommandSpec::new(&self.config.client_binary).censor(PASSWORD_FLAG)
    }

    fn name_prefix(&self, database: &str) -> String {
        if self.config.name_as_prefix && !database.is_empty() {
            database.to_string()
        } else if !self.config.name_prefix.is_empty() {
            self.config.name_prefix.clone()
        } else {
            DEFAULT_NAME_PREFIX.to_string()
        }
    }

    async fn list_databases(&self) -> Result<Vec<String>, ServiceError> {
        let spec = self
            .client_command()
            .args(self.base_args(false))
            .args(["-s", "--skip-column-names", "-r", "-e", "show databases"]);
        Ok(self.executor.run_lines(&spec).await?)
    }

    async fn dump(&self, database: &str, dir_prefix: &str, name_prefix: &str) -> Result<PathBuf, ServiceError> {
        let save_path = if dir_prefix.is_empty() {
            self.save_dir.clone()
        } else {
            self.save_dir.join(dir_prefix)
        };
        ensure_dir(&save_path).await?;
        let base = generate_filename(&save_path, name_prefix);

        let mut args = self.base_args(true);
        if database.is_empty() {
            args.push("--all-databases".to_string());
        } else {
            args.extend(["-B".to_string(), database.to_string()]);
        }

        let path = if self.config.compress {
            let path = with_extension(base, ".sql.gz");
            run_to_compressed_file(self.executor.as_ref(), &self.dump_command().args(args), &path).await?;
            path
        } else {
            let path = with_extension(base, ".sql");
            args.extend(["-r".to_string(), path.display().to_string()]);
            self.executor
                .run(&self.dump_command().args(args), Input::Null, Output::Inherit)
                .await?;
            path
        };

        info!("Dumped {} to {}", if database.is_empty() { "all databases" } else { database }, path.display());
        Ok(path)
    }
}

#[async_trait]
impl Service for MysqlService {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        if !self.config.split_databases {
            let database = self.config.database.as_str();
            let prefix = self.name_prefix(database);
            let path = self.dump(database, "", &prefix).await?;
            return Ok(vec![BackupResult::new("", prefix, path)]);
        }

        let mut results = Vec::new();
        for database in self.list_databases().await? {
            if matches_exclude_pattern(&database, &self.config.exclude_databases) {
                continue;
            }
            let prefix = self.name_prefix(&database);
            let path = self.dump(&database, &database, &prefix).await?;
            results.push(BackupResult::new(database, prefix, path));
        }
        Ok(results)
    }

    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError> {
        let mut spec = self.client_command().args(self.base_args(true));
        if !self.config.database.is_empty() {
            spec = spec.args(["-D", self.config.database.as_str()]);
        }

        info!("Restoring {}", artifact.display());
        let loaded = run_from_file(self.executor.as_ref(), &spec, artifact).await;
        tolerate_exit_status(loaded, self.config.ignore_exit_code)
    }
}
