//! Fluent API for building test configurations
//!
//! Starts from a config whose save directory and filesystem store live in a
//! temporary directory, so tests never touch `/tmp` directly.

use dump_manager::config::{Config, LogFormat, TarballConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with scratch directories and text logging
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let save_dir = temp_dir.path().join("work");
        fs::create_dir_all(&save_dir).expect("Failed to create save_dir");
        let store_dir = temp_dir.path().join("store");
        fs::create_dir_all(&store_dir).expect("Failed to create store dir");

        let mut config = Config::default();
        config.global.save_dir = save_dir;
        config.global.log_format = LogFormat::Text;
        config.global.schedule = Some("none".to_string());
        config.filesystem.save_dir = Some(store_dir);

        Self { temp_dir, config }
    }

    /// Tarball service over a `data` directory holding one file
    pub fn tarball() -> Self {
        let builder = Self::new();
        let data = builder.temp_dir.path().join("data");
        fs::create_dir_all(&data).expect("Failed to create data dir");
        fs::write(data.join("test.txt"), "test").expect("Failed to write data file");

        builder.with_tarball(TarballConfig {
            path: data,
            name: "data".to_string(),
            compress: true,
            ..Default::default()
        })
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.config.global.schedule = Some(schedule.to_string());
        self
    }

    pub fn with_max_backups(mut self, max_backups: i64) -> Self {
        self.config.global.max_backups = max_backups;
        self
    }

    pub fn with_tarball(mut self, tarball: TarballConfig) -> Self {
        self.config.tarball = tarball;
        self
    }

    pub fn with_s3_bucket(mut self, bucket: &str) -> Self {
        self.config.s3.bucket = bucket.to_string();
        self
    }

    /// Apply an arbitrary change to the config
    pub fn with(mut self, change: impl FnOnce(&mut Config)) -> Self {
        change(&mut self.config);
        self
    }

    /// Scratch root the config points into
    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Build the config, discarding the temporary directory
    pub fn build(self) -> Config {
        self.config
    }

    /// Write the config as TOML and hand back the directory that owns it
    pub fn persist(self) -> (Config, PathBuf, TempDir) {
        let path = self.temp_dir.path().join("dump-manager.toml");
        let contents = toml::to_string_pretty(&self.config).expect("Failed to serialize config");
        fs::write(&path, contents).expect("Failed to write config file");
        (self.config, path, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
