//! Log output for backup and restore runs
//!
//! Events go to stderr as text or JSON lines. `Auto` picks JSON when stdout
//! is not a terminal, which is the case under a container runtime or cron.
//! With `log_directory` set, a daily file (`dump-manager.<date>.log`) is
//! written as well, and only the newest `log_max_files` of them are kept.

use crate::config::{expand_tilde, GlobalConfig, LogFormat};
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "dump-manager";
const LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
    pub format: LogFormat,
    pub log_directory: Option<PathBuf>,
    pub max_files: u32,
}

impl LoggingConfig {
    pub fn from_config(global: &GlobalConfig) -> Self {
        Self {
            log_level: global.log_level.parse().unwrap_or(Level::INFO),
            format: global.log_format,
            log_directory: global.log_directory.clone(),
            max_files: global.log_max_files,
        }
    }

    /// `--debug` on the command line
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.log_level = Level::DEBUG;
        }
        self
    }

    /// `--log-format` on the command line
    pub fn with_format(mut self, format: Option<LogFormat>) -> Self {
        if let Some(format) = format {
            self.format = format;
        }
        self
    }
}

/// Resolve `Auto` against the current stdout
pub fn effective_format(format: LogFormat) -> LogFormat {
    match format {
        LogFormat::Auto if std::io::stdout().is_terminal() => LogFormat::Text,
        LogFormat::Auto => LogFormat::Json,
        other => other,
    }
}

/// Directive used when `RUST_LOG` is unset: our events at `level`,
/// dependencies (object_store, hyper) only from warn up
fn default_directive(level: Level) -> String {
    format!("warn,dump_manager={}", level.as_str().to_lowercase())
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Daily appender in `directory` that deletes its own files beyond `max_files`
fn open_log_file(directory: &Path, max_files: u32) -> Result<RollingFileAppender> {
    let directory = expand_tilde(directory);
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(max_files.max(1) as usize)
        .build(&directory)
        .with_context(|| format!("Failed to open log file in {}", directory.display()))
}

/// Install the global subscriber
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let console = match effective_format(config.format) {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(level_filter(config.log_level))
            .boxed(),
        _ => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
            .with_filter(level_filter(config.log_level))
            .boxed(),
    };

    let (file, file_guard) = match &config.log_directory {
        Some(directory) => {
            let appender = open_log_file(directory, config.max_files)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // The file always gets at least debug detail
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(level_filter(config.log_level.max(Level::DEBUG)));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install logging subscriber")?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}
