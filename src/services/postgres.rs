//! PostgreSQL backup service
//!
//! Handles:
//! - Whole-cluster dumps with pg_dumpall and single database dumps with pg_dump
//! - One dump per database owner (`backup_per_user`)
//! - One dump per schema of a database (`backup_per_schema`)
//! - Plain, gzip and custom (`-Fc`) output formats
//! - Restores through psql or pg_restore, optionally recreating the database

use super::common::{
    ensure_dir, generate_filename, is_selected, matches_exclude_pattern, split_options,
    tolerate_exit_status, with_extension,
};
use super::{BackupResult, BackupResults, Service};
use crate::config::PostgresConfig;
use crate::error::ServiceError;
use crate::utils::codec::{run_from_file, run_to_compressed_file};
use crate::utils::command::{CommandSpec, Input, Output};
use crate::utils::executor::CommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_NAME_PREFIX: &str = "postgres-backup";
const MAINTENANCE_DATABASE: &str = "postgres";

const LIST_USERS_QUERY: &str =
    "COPY(SELECT usename FROM pg_catalog.pg_user ORDER BY usename) TO STDOUT;";
const LIST_SCHEMAS_QUERY: &str =
    "COPY(SELECT nspname FROM pg_catalog.pg_namespace ORDER BY nspname) TO STDOUT;";

pub struct PostgresService {
    config: PostgresConfig,
    save_dir: PathBuf,
    password: Option<String>,
    binary_path: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl PostgresService {
    pub fn new(config: PostgresConfig, save_dir: PathBuf, executor: Arc<dyn CommandExecutor>) -> Self {
        let password = config.resolved_password();
        let binary_path = config.resolved_binary_path();
        Self {
            config,
            save_dir,
            password,
            binary_path,
            executor,
        }
    }

    /// Command for one of the PostgreSQL client tools, with credentials in the environment
    fn tool(&self, name: &str) -> CommandSpec {
        let spec = CommandSpec::new(self.binary_path.join(name));
        match &self.password {
            Some(password) => spec.env("PGPASSWORD", password.clone()),
            None => spec,
        }
    }

    /// Connection arguments, followed by the configured extra options when
    /// the call goes to a dump or restore tool rather than a psql query
    fn base_args(&self, database: &str, with_options: bool) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.config.host.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-U".to_string(),
            self.config.user.clone(),
        ];
        if !database.is_empty() {
            args.push("-d".to_string());
            args.push(database.to_string());
        }
        if with_options {
            args.extend(split_options(&self.config.options));
        }
        args
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

    /// Custom format only applies to single database dumps
    fn uses_custom_format(&self, database: &str) -> bool {
        self.config.custom && !database.is_empty()
    }

    /// Run a query through psql and return one row per line
    async fn query(&self, database: &str, sql: &str) -> Result<Vec<String>, ServiceError> {
        let spec = self
            .tool("psql")
            .args(self.base_args(database, false))
            .args(["-c", sql]);
        Ok(self.executor.run_lines(&spec).await?)
    }

    async fn list_users(&self) -> Result<Vec<String>, ServiceError> {
        self.query(MAINTENANCE_DATABASE, LIST_USERS_QUERY).await
    }

    async fn list_databases_of(&self, user: &str) -> Result<Vec<String>, ServiceError> {
        let sql = format!(
            "COPY(SELECT datname FROM pg_database JOIN pg_authid ON pg_database.datdba = pg_authid.oid WHERE rolname = '{}' ORDER BY datname) TO STDOUT",
            quote_literal(user)
        );
        self.query(MAINTENANCE_DATABASE, &sql).await
    }

    async fn list_schemas(&self, database: &str) -> Result<Vec<String>, ServiceError> {
        self.query(database, LIST_SCHEMAS_QUERY).await
    }

    /// Dump one database (or the cluster) into `save_dir/<dir_prefix>`
    async fn dump(
        &self,
        database: &str,
        dir_prefix: &str,
        name_prefix: &str,
        schema: Option<&str>,
    ) -> Result<PathBuf, ServiceError> {
        let save_path = if dir_prefix.is_empty() {
            self.save_dir.clone()
        } else {
            self.save_dir.join(dir_prefix)
        };
        ensure_dir(&save_path).await?;
        let base = generate_filename(&save_path, name_prefix);

        let mut args = self.base_args(database, true);
        let tool = if database.is_empty() {
            args.extend(
                self.config
                    .exclude_databases
                    .iter()
                    .map(|pattern| format!("--exclude-database={}", pattern)),
            );
            "pg_dumpall"
        } else {
            if let Some(schema) = schema {
                args.push(format!("--schema={}", schema));
            }
            "pg_dump"
        };

        let path = if self.uses_custom_format(database) {
            let path = with_extension(base, ".dump");
            args.extend(["-f".to_string(), path.display().to_string(), "-Fc".to_string()]);
            self.executor
                .run(&self.tool(tool).args(args), Input::Null, Output::Inherit)
                .await?;
            path
        } else if !self.config.compress {
            let path = with_extension(base, ".sql");
            args.extend(["-f".to_string(), path.display().to_string()]);
            self.executor
                .run(&self.tool(tool).args(args), Input::Null, Output::Inherit)
                .await?;
            path
        } else {
            let path = with_extension(base, ".sql.gz");
            run_to_compressed_file(self.executor.as_ref(), &self.tool(tool).args(args), &path).await?;
            path
        };

        info!("Dumped {} to {}", describe(database, schema), path.display());
        Ok(path)
    }

    async fn backup_per_user(&self) -> Result<BackupResults, ServiceError> {
        let mut results = Vec::new();
        for user in self.list_users().await? {
            if !is_selected(&user, &self.config.backup_users, &self.config.exclude_users) {
                continue;
            }
            for database in self.list_databases_of(&user).await? {
                if matches_exclude_pattern(&database, &self.config.exclude_databases) {
                    continue;
                }
                let dir_prefix = format!("{}/{}", user, database);
                let prefix = self.name_prefix(&database);
                let path = self.dump(&database, &dir_prefix, &prefix, None).await?;
                results.push(BackupResult::new(dir_prefix, prefix, path));
            }
        }
        Ok(results)
    }

    async fn backup_per_schema(&self) -> Result<BackupResults, ServiceError> {
        let database = self.config.database.as_str();
        if database.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "per-schema backups need a database".to_string(),
            ));
        }

        let mut results = Vec::new();
        for schema in self.list_schemas(database).await? {
            if !is_selected(&schema, &self.config.backup_schemas, &self.config.exclude_schemas) {
                continue;
            }
            let dir_prefix = format!("{}/{}", database, schema);
            let prefix = format!("{}_{}", self.name_prefix(database), schema);
            let path = self.dump(database, &dir_prefix, &prefix, Some(&schema)).await?;
            results.push(BackupResult::new(dir_prefix, prefix, path));
        }
        Ok(results)
    }

    /// Terminate sessions, then drop and create the configured database
    async fn recreate_database(&self) -> Result<(), ServiceError> {
        let database = self.config.database.as_str();
        if database.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "dropping before restore needs a database".to_string(),
            ));
        }
        let owner = self.config.owner.as_deref().unwrap_or(&self.config.user);

        let statements = [
            format!(
                "SELECT pg_terminate_backend(pg_stat_activity.pid) FROM pg_stat_activity WHERE pg_stat_activity.datname = '{}' AND pid <> pg_backend_pid();",
                quote_literal(database)
            ),
            format!("DROP DATABASE \"{}\";", quote_ident(database)),
            format!(
                "CREATE DATABASE \"{}\" OWNER \"{}\";",
                quote_ident(database),
                quote_ident(owner)
            ),
        ];

        warn!("Recreating database {} before restore", database);
        for sql in statements {
            let mut args = self.base_args(MAINTENANCE_DATABASE, false);
            args.extend(["-c".to_string(), sql]);
            self.executor
                .run(&self.tool("psql").args(args), Input::Null, Output::Inherit)
                .await?;
        }
        Ok(())
    }

    async fn load(&self, artifact: &Path) -> Result<(), ServiceError> {
        let database = self.config.database.as_str();
        let args = self.base_args(database, true);

        if self.uses_custom_format(database) {
            let spec = self
                .tool("pg_restore")
                .args(args)
                .arg(artifact.display().to_string());
            self.executor.run(&spec, Input::Null, Output::Inherit).await?;
            Ok(())
        } else {
            run_from_file(self.executor.as_ref(), &self.tool("psql").args(args), artifact).await
        }
    }
}

#[async_trait]
impl Service for PostgresService {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        if self.config.backup_per_user {
            return self.backup_per_user().await;
        }
        if self.config.backup_per_schema {
            return self.backup_per_schema().await;
        }

        let database = self.config.database.as_str();
        let prefix = self.name_prefix(database);
        let path = self.dump(database, "", &prefix, None).await?;
        Ok(vec![BackupResult::new("", prefix, path)])
    }

    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError> {
        if self.config.drop {
            self.recreate_database().await?;
        }

        info!("Restoring {}", artifact.display());
        tolerate_exit_status(self.load(artifact).await, self.config.ignore_exit_code)
    }
}

fn describe(database: &str, schema: Option<&str>) -> String {
    match (database, schema) {
        ("", _) => "all databases".to_string(),
        (db, Some(schema)) => format!("schema {} of {}", schema, db),
        (db, None) => format!("database {}", db),
    }
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn quote_ident(value: &str) -> String {
    value.replace('"', "\"\"")
}
