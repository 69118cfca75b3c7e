//! Helpers shared by the service implementations

use crate::error::ServiceError;
use chrono::Local;
use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Timestamp layout embedded in artifact names; fixed width so names sort by time
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// `<dir>/<prefix>-<YYYYMMDDHHMMSS>` in local time, without extension
pub fn generate_filename(dir: &Path, prefix: &str) -> PathBuf {
    let now = Local::now().format(TIMESTAMP_FORMAT);
    dir.join(format!("{}-{}", prefix, now))
}

/// Append an extension such as `.sql.gz` to a generated name
pub fn with_extension(path: PathBuf, extension: &str) -> PathBuf {
    let mut raw = path.into_os_string();
    raw.push(extension);
    PathBuf::from(raw)
}

/// Create a directory (and parents) for a fresh artifact
pub async fn ensure_dir(dir: &Path) -> Result<(), ServiceError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ServiceError::io(format!("cannot create directory {}", dir.display()), e))
}

/// True when `name` matches one of the glob `patterns`.
///
/// A malformed pattern is logged and treated as a match, so the entry is
/// left out rather than backed up by accident.
pub fn matches_exclude_pattern(name: &str, patterns: &[String]) -> bool {
    for raw in patterns {
        match Pattern::new(raw) {
            Ok(pattern) => {
                if pattern.matches(name) {
                    info!("Excluding {} that matches excluded pattern {}", name, raw);
                    return true;
                }
            }
            Err(e) => {
                warn!("Invalid pattern {} ({}), skipping {}", raw, e, name);
                return true;
            }
        }
    }
    false
}

/// Exact-name include/exclude filter; an empty include list takes everything
pub fn is_selected(name: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|e| e == name) {
        return false;
    }
    include.is_empty() || include.iter().any(|i| i == name)
}

/// Split a free-form option string into arguments
pub fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}

/// Swallow a non-zero exit status when the configuration asks for it
pub fn tolerate_exit_status(
    result: Result<(), ServiceError>,
    ignore: bool,
) -> Result<(), ServiceError> {
    match result {
        Err(ServiceError::Process(e)) if ignore && e.is_exit_status() => {
            warn!("Ignoring restore failure: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Remove everything inside `dir` but keep the directory itself
pub fn remove_directory_contents(dir: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
