//! Run-time managers: logging setup, scheduling and task orchestration

pub mod logging;
pub mod scheduler;
pub mod task;

pub use scheduler::{FiringState, Schedule, Scheduler};
pub use task::{run_backup, run_restore, Task, TaskKind};
