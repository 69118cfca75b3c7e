use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub postgres: PostgresConfig,
    pub mysql: MysqlConfig,
    pub tarball: TarballConfig,
    pub consul: ConsulConfig,
    pub gitea: GiteaConfig,
    pub s3: S3Config,
    pub filesystem: FilesystemConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Scratch directory for fresh dumps and downloaded backups
    pub save_dir: PathBuf,

    /// Cron expression, `none` or empty; the command picks a default when unset
    pub schedule: Option<String>,
    /// Upper bound in seconds for the random start delay of scheduled runs
    pub schedule_random_delay: i64,

    /// Number of backups kept per family, 0 or less keeps everything
    pub max_backups: i64,

    /// Restore this key instead of the latest backup
    pub restore_file: Option<String>,
    /// Name prefix used when looking up the latest backup
    pub restore_prefix: String,

    /// Logging configuration
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_directory: Option<PathBuf>,
    pub log_max_files: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            schedule: None,
            schedule_random_delay: default_random_delay(),
            max_backups: default_max_backups(),
            restore_file: None,
            restore_prefix: String::new(),
            log_level: default_log_level(),
            log_format: LogFormat::Auto,
            log_directory: None,
            log_max_files: default_log_max_files(),
        }
    }
}

impl GlobalConfig {
    /// Retention count as used by the pruner
    pub fn keep(&self) -> usize {
        usize::try_from(self.max_backups).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON when stdout is not a terminal, text otherwise
    #[default]
    Auto,
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub password_file: Option<PathBuf>,
    /// Single database to dump; empty dumps the whole cluster
    pub database: String,
    pub name_prefix: String,
    pub name_as_prefix: bool,
    /// Extra arguments, split on whitespace
    pub options: String,
    pub compress: bool,
    /// Use pg_dump's custom format (single database only)
    pub custom: bool,
    pub ignore_exit_code: bool,
    /// Recreate the database before restoring
    pub drop: bool,
    pub owner: Option<String>,
    pub exclude_databases: Vec<String>,
    pub backup_per_user: bool,
    pub backup_users: Vec<String>,
    pub exclude_users: Vec<String>,
    pub backup_per_schema: bool,
    pub backup_schemas: Vec<String>,
    pub exclude_schemas: Vec<String>,
    /// Server version, selects `/usr/libexec/postgresql<version>` binaries
    pub version: Option<String>,
    /// Directory holding pg_dump, pg_dumpall, pg_restore and psql
    pub binary_path: Option<PathBuf>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            password_file: None,
            database: String::new(),
            name_prefix: String::new(),
            name_as_prefix: false,
            options: String::new(),
            compress: false,
            custom: false,
            ignore_exit_code: false,
            drop: false,
            owner: None,
            exclude_databases: Vec::new(),
            backup_per_user: false,
            backup_users: Vec::new(),
            exclude_users: Vec::new(),
            backup_per_schema: false,
            backup_schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            version: None,
            binary_path: None,
        }
    }
}

impl PostgresConfig {
    pub fn resolved_password(&self) -> Option<String> {
        secret_or_file(self.password.as_deref(), self.password_file.as_deref())
    }

    pub fn resolved_binary_path(&self) -> PathBuf {
        if let Some(path) = &self.binary_path {
            return path.clone();
        }
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => {
                PathBuf::from(format!("/usr/libexec/postgresql{}", version))
            }
            _ => PathBuf::from("/usr/bin"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub password_file: Option<PathBuf>,
    /// Single database to dump; empty dumps all databases
    pub database: String,
    pub name_prefix: String,
    pub name_as_prefix: bool,
    pub options: String,
    pub compress: bool,
    /// One artifact per database
    pub split_databases: bool,
    pub exclude_databases: Vec<String>,
    pub ignore_exit_code: bool,
    pub dump_binary: PathBuf,
    pub client_binary: PathBuf,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            password_file: None,
            database: String::new(),
            name_prefix: String::new(),
            name_as_prefix: false,
            options: String::new(),
            compress: false,
            split_databases: false,
            exclude_databases: Vec::new(),
            ignore_exit_code: false,
            dump_binary: PathBuf::from("/usr/bin/mysqldump"),
            client_binary: PathBuf::from("/usr/bin/mysql"),
        }
    }
}

impl MysqlConfig {
    pub fn resolved_password(&self) -> Option<String> {
        secret_or_file(self.password.as_deref(), self.password_file.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TarballConfig {
    /// Artifact name; defaults to the directory name
    pub name: String,
    /// Directory to archive and restore into
    pub path: PathBuf,
    pub compress: bool,
    /// Nested path below `path` (or below each sub-directory) to archive
    pub path_prefix: String,
    pub backup_per_dir: bool,
    pub backup_dirs: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub binary: PathBuf,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/bin/consul"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GiteaConfig {
    pub binary: PathBuf,
    pub config_path: Option<PathBuf>,
    pub data_path: PathBuf,
    /// Identity the dump runs as when started by root
    pub uid: u32,
    pub gid: u32,
}

impl Default for GiteaConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/app/gitea/gitea"),
            config_path: None,
            data_path: PathBuf::from("/data"),
            uid: 1000,
            gid: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Key prefix inside the bucket
    pub prefix: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub secret_key_file: Option<PathBuf>,
    /// Path-style requests, needed by MinIO and similar servers
    pub force_path_style: bool,
    pub allow_http: bool,
    /// Keep the local artifact after a successful upload
    pub keep_local_copy: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            prefix: String::new(),
            access_key: None,
            secret_key: None,
            secret_key_file: None,
            force_path_style: false,
            allow_http: false,
            keep_local_copy: false,
        }
    }
}

impl S3Config {
    pub fn resolved_secret_key(&self) -> Option<String> {
        secret_or_file(self.secret_key.as_deref(), self.secret_key_file.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Store root; defaults to the global save directory
    pub save_dir: Option<PathBuf>,
}

/// Read a secret from the first line of `file`, or fall back to `value`
pub fn secret_or_file(value: Option<&str>, file: Option<&Path>) -> Option<String> {
    if let Some(file) = file {
        let path = super::expand_tilde(file);
        return match std::fs::read_to_string(&path) {
            Ok(contents) => match contents.lines().next() {
                Some(line) => Some(line.to_string()),
                None => {
                    warn!("Empty secret file {}", path.display());
                    Some(String::new())
                }
            },
            Err(e) => {
                error!("Cannot open secret file {}: {}", path.display(), e);
                None
            }
        };
    }
    value.map(str::to_string)
}

// Default value functions

fn default_save_dir() -> PathBuf { PathBuf::from("/tmp") }
fn default_random_delay() -> i64 { 1 }
fn default_max_backups() -> i64 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
