//! Dump Manager Library
//!
//! Backup and restore orchestration for databases, directories and service
//! snapshots. A [`services::Service`] produces artifacts, a [`stores::Store`]
//! keeps them and prunes old ones, and the [`managers::scheduler::Scheduler`]
//! runs the pair on a cron schedule.

pub mod config;
pub mod error;
pub mod managers;
pub mod services;
pub mod stores;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use error::{ProcessError, ScheduleError, ServiceError, StoreError, TaskError};
pub use managers::logging::{init_logging, LogGuard, LoggingConfig};
pub use managers::scheduler::{Schedule, Scheduler};
pub use managers::task::{run_backup, run_restore, Task, TaskKind};
pub use services::{build_service, BackupResult, Service, ServiceKind};
pub use stores::{build_store, PruneReport, Store, StoreEntry, StoreKind};
