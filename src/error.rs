//! Error types for the process runner, services, stores and tasks

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Boxed error used where a store backend supplies its own error type
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which stream copy of a child process failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopySide {
    /// Feeding the child's stdin from the input stream
    Input,
    /// Draining the child's stdout into the output stream
    Output,
}

impl fmt::Display for CopySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopySide::Input => write!(f, "stdin"),
            CopySide::Output => write!(f, "stdout"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("cannot start process {program}: {source}")]
    Start {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for process {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The child ran but reported failure; counts as a wait failure
    #[error("process {program} exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },

    #[error("failed to copy process {side} of {program}: {source}")]
    StreamCopy {
        program: String,
        side: CopySide,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// True when the process started and ran but did not exit cleanly
    pub fn is_exit_status(&self) -> bool {
        matches!(self, ProcessError::ExitStatus { .. })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid service configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is not supported")]
    Unsupported(String),
}

impl ServiceError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ServiceError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to store {path} under '{dir_prefix}': {source}")]
    Store {
        path: PathBuf,
        dir_prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to retrieve {key}: {source}")]
    Retrieve {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to list entries under '{prefix}': {source}")]
    List {
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to delete {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to release retrieved file {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no backup found under '{dir_prefix}' matching '{name_prefix}'")]
    NoBackupFound {
        dir_prefix: String,
        name_prefix: String,
    },

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid retention pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure of one backup or restore invocation
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("service {service} backup failed: {source}")]
    SourceBackup {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("service {service} restore failed: {source}")]
    SourceRestore {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("couldn't upload file to store: {0}")]
    SinkStore(#[source] StoreError),

    #[error("couldn't remove old backups from store: {0}")]
    SinkPrune(#[source] StoreError),

    #[error("cannot find the latest backup: {0}")]
    FindLatest(#[source] StoreError),

    #[error("cannot retrieve {key}: {source}")]
    SinkRetrieve {
        key: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule expression '{expression}': {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}
