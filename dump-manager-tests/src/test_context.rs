//! Scratch workspace for a single test
//!
//! Mirrors a deployment: `work/` receives fresh dumps, other files (configs,
//! secrets, downloads) go wherever the test puts them. Everything is removed
//! when the context drops.

use crate::config_builder::ConfigBuilder;
use anyhow::Result;
use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestContext {
    temp_dir: TempDir,
    /// TOML written by [`TestContext::from_builder`], for loader and CLI tests
    config_path: Option<PathBuf>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            config_path: None,
        }
    }

    /// Persist the builder's config and adopt its scratch directory
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (_config, config_path, temp_dir) = builder.persist();
        Self {
            temp_dir,
            config_path: Some(config_path),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where services write fresh artifacts
    pub fn work_dir(&self) -> PathBuf {
        self.create_subdir("work")
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    /// Write `content` to `name`, creating parent directories
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Secret file in the `*_password_file` format: first line is the secret
    pub fn create_password_file(&self, password: &str) -> PathBuf {
        self.create_file("db-password", password)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.temp_dir.path().join(name))?)
    }

    /// Sorted names of the regular files directly inside `dir`; empty when
    /// the directory does not exist
    pub fn list_files(&self, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.temp_dir.path().join(dir))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Assertions on orchestrator, store and loader results that print the error
/// chain on failure
pub trait ResultAssertions<T> {
    fn assert_ok(self) -> T;

    fn assert_err(self)
    where
        T: Debug;

    /// Match against both the display and debug forms, so variant names and
    /// field values can be used as needles
    fn assert_err_contains(self, needle: &str)
    where
        T: Debug;
}

impl<T, E: Display + Debug> ResultAssertions<T> for std::result::Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {} ({:?})", e, e),
        }
    }

    fn assert_err(self)
    where
        T: Debug,
    {
        if let Ok(v) = self {
            panic!("Expected Err, got Ok: {:?}", v);
        }
    }

    fn assert_err_contains(self, needle: &str)
    where
        T: Debug,
    {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = format!("{} / {:?}", e, e);
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}
