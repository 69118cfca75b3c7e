//! `dump-manager.toml`: one optional section per service and store
//!
//! Missing sections and fields take their defaults, so an empty file is a
//! valid config. Command-line flags and their environment variables are
//! layered on top by `main` after loading.
//!
//! ```no_run
//! use dump_manager::config;
//!
//! let config = config::load_config("/etc/dump-manager.toml")?;
//! config::validate_config(&config)?;
//! println!("dumps go to {}", config.global.save_dir.display());
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, parse_config, validate_config, validate_selection, ConfigError, Result};
pub use types::*;

use std::path::{Path, PathBuf};

/// Resolve a leading `~` against the home directory; used for
/// `log_directory` and `*_password_file`
pub fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_home_relative_log_directory() {
        let Some(home) = dirs::home_dir() else { return };
        assert_eq!(
            expand_tilde(Path::new("~/.local/state/dump-manager")),
            home.join(".local/state/dump-manager")
        );
        assert_eq!(expand_tilde(Path::new("/var/log/dump")), PathBuf::from("/var/log/dump"));
        assert_eq!(expand_tilde(Path::new("logs/~")), PathBuf::from("logs/~"));
    }

    #[test]
    fn test_secret_file_under_home() {
        let Some(home) = dirs::home_dir() else { return };
        let Ok(file) = tempfile::Builder::new().prefix(".dump-manager-secret").tempfile_in(&home) else {
            return;
        };
        std::fs::write(file.path(), "from-home\n").unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();

        let tilde_path = PathBuf::from(format!("~/{}", name));
        assert_eq!(
            secret_or_file(Some("inline"), Some(&tilde_path)).as_deref(),
            Some("from-home")
        );
    }

    #[test]
    fn test_password_file_first_line_wins() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();
        writeln!(file, "ignored").unwrap();

        let toml = format!(
            "[postgres]\npassword = \"inline\"\npassword_file = \"{}\"\n",
            file.path().display()
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.postgres.resolved_password().as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_empty_secret_file_gives_empty_secret() {
        let file = NamedTempFile::new().unwrap();
        let value = secret_or_file(Some("inline"), Some(file.path()));
        assert_eq!(value.as_deref(), Some(""));
    }

    #[test]
    fn test_inline_secret_without_file() {
        assert_eq!(secret_or_file(Some("pw"), None).as_deref(), Some("pw"));
        assert_eq!(secret_or_file(None, None), None);
    }

    #[test]
    fn test_postgres_binary_path_from_version() {
        let mut pg = PostgresConfig::default();
        assert_eq!(pg.resolved_binary_path(), PathBuf::from("/usr/bin"));

        pg.version = Some("16".to_string());
        assert_eq!(pg.resolved_binary_path(), PathBuf::from("/usr/libexec/postgresql16"));

        pg.binary_path = Some(PathBuf::from("/opt/pg/bin"));
        assert_eq!(pg.resolved_binary_path(), PathBuf::from("/opt/pg/bin"));
    }

    #[test]
    fn test_load_full_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[global]
save_dir = "/var/backups"
schedule = "0 3 * * *"
schedule_random_delay = 300
max_backups = 7
log_format = "json"

[mysql]
host = "db"
split_databases = true
exclude_databases = ["information_schema", "perf*"]

[s3]
bucket = "backups"
endpoint = "http://minio:9000"
force_path_style = true
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.global.save_dir, PathBuf::from("/var/backups"));
        assert_eq!(config.global.schedule_random_delay, 300);
        assert_eq!(config.global.keep(), 7);
        assert_eq!(config.global.log_format, LogFormat::Json);
        assert!(config.mysql.split_databases);
        assert_eq!(config.mysql.exclude_databases.len(), 2);
        assert!(config.s3.force_path_style);
        assert_eq!(config.s3.region, "us-east-1");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config("/nonexistent/dump-manager.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
