use super::types::*;
use crate::services::ServiceKind;
use crate::stores::StoreKind;
use crate::utils::cron::validate_cron_schedule;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate settings that do not depend on the selected service or store
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(schedule) = &config.global.schedule {
        validate_cron_schedule(schedule)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    }

    if config.global.save_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "global.save_dir must not be empty".to_string(),
        ));
    }

    if let Some(file) = &config.global.restore_file {
        if file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "global.restore_file is set but empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate the sections needed by one service and store pair
pub fn validate_selection(config: &Config, service: ServiceKind, store: StoreKind) -> Result<()> {
    match service {
        ServiceKind::Tarball if config.tarball.path.as_os_str().is_empty() => {
            return Err(ConfigError::ValidationError(
                "tarball.path is required for the tarball service".to_string(),
            ));
        }
        ServiceKind::Postgres
            if config.postgres.backup_per_schema && config.postgres.database.is_empty() =>
        {
            return Err(ConfigError::ValidationError(
                "postgres.backup_per_schema requires postgres.database".to_string(),
            ));
        }
        ServiceKind::Postgres if config.postgres.backup_per_schema && config.postgres.backup_per_user => {
            return Err(ConfigError::ValidationError(
                "postgres.backup_per_user and postgres.backup_per_schema are exclusive".to_string(),
            ));
        }
        _ => {}
    }

    if store == StoreKind::S3 && config.s3.bucket.is_empty() {
        return Err(ConfigError::ValidationError(
            "s3.bucket is required for the s3 store".to_string(),
        ));
    }

    Ok(())
}
