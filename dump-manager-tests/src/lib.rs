//! Shared helpers for the dump-manager test targets
//!
//! - [`TestContext`]: scratch directory with a `work/` dump area
//! - [`ConfigBuilder`]: configs rooted in a temp dir, optionally written as TOML
//! - [`fixtures`]: [`RecordingStore`] and [`ScriptedService`], in-memory
//!   stand-ins that record every call
//!
//! ```rust,ignore
//! use test_utils::{RecordingStore, ScriptedService, TestContext};
//!
//! #[tokio::test]
//! async fn keeps_two() {
//!     let ctx = TestContext::new();
//!     let service = ScriptedService::new(ctx.work_dir()).produces("", "db", ".sql");
//!     let store = RecordingStore::new();
//!     for _ in 0..3 {
//!         dump_manager::run_backup(&service, &store, 2).await.unwrap();
//!     }
//!     assert_eq!(store.keys().len(), 2);
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

pub use config_builder::ConfigBuilder;
pub use fixtures::{backup_name, RecordingStore, ScriptedService, StoreOp};
pub use test_context::{ResultAssertions, TestContext};

pub use dump_manager::config::{PostgresConfig, TarballConfig};
pub use dump_manager::services::{Service, ServiceKind};
pub use dump_manager::stores::{Store, StoreEntry, StoreKind};
pub use dump_manager::utils::executor::mock::{MockExecutor, MockResponse};
