pub mod codec;
pub mod command;
pub mod cron;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use command::{censor_args, CommandSpec, Credential, Input, Output};
pub use executor::{CommandExecutor, RealExecutor};
