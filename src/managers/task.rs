//! Task orchestrator - ties a service to a store for one backup or restore run

use crate::error::TaskError;
use crate::services::Service;
use crate::stores::Store;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Back up `service` into `store`, pruning each family down to `keep` entries.
///
/// Artifacts are processed in the order the service returned them. The first
/// store or prune failure aborts the run; artifacts stored before it stay.
pub async fn run_backup(service: &dyn Service, store: &dyn Store, keep: usize) -> Result<(), TaskError> {
    let start = Instant::now();
    info!("Starting {} backup to {}", service.name(), store.name());

    let results = service.backup().await.map_err(|source| TaskError::SourceBackup {
        service: service.name().to_string(),
        source,
    })?;

    for result in &results {
        store
            .store(&result.path, &result.dir_prefix, &result.filename())
            .await
            .map_err(TaskError::SinkStore)?;

        let report = store
            .remove_older_backups(&result.dir_prefix, &result.name_prefix, keep)
            .await
            .map_err(TaskError::SinkPrune)?;
        if report.failed > 0 {
            warn!(
                "{} of {} old backups could not be removed",
                report.failed,
                report.matched.saturating_sub(keep)
            );
        }
    }

    info!(
        "Backup of {} finished: {} artifact(s) in {:.1}s",
        service.name(),
        results.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Restore `explicit_key`, or the newest backup named with `restore_prefix`.
///
/// The store is closed whether or not the restore succeeded; a restore error
/// wins over a close error.
pub async fn run_restore(
    service: &dyn Service,
    store: &dyn Store,
    explicit_key: Option<&str>,
    restore_prefix: &str,
) -> Result<(), TaskError> {
    let key = match explicit_key {
        Some(key) => key.to_string(),
        None => store
            .find_latest_backup("", restore_prefix)
            .await
            .map_err(TaskError::FindLatest)?,
    };
    info!("Restoring {} from {} key {}", service.name(), store.name(), key);

    let restored = restore_key(service, store, &key).await;

    let closed = store.close().await;
    if let Err(e) = &closed {
        warn!("Failed to clean up after restore: {}", e);
    }

    restored?;
    info!("Restore of {} finished", service.name());
    Ok(())
}

async fn restore_key(service: &dyn Service, store: &dyn Store, key: &str) -> Result<(), TaskError> {
    let local = store.retrieve(key).await.map_err(|source| TaskError::SinkRetrieve {
        key: key.to_string(),
        source,
    })?;

    service
        .restore(&local)
        .await
        .map_err(|source| TaskError::SourceRestore {
            service: service.name().to_string(),
            source,
        })
}

/// What a scheduled run does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Backup { keep: usize },
    Restore { key: Option<String>, prefix: String },
}

/// A service and store pair bound to one kind of run, invoked once per firing
#[derive(Clone)]
pub struct Task {
    service: Arc<dyn Service>,
    store: Arc<dyn Store>,
    kind: TaskKind,
}

impl Task {
    pub fn new(service: Arc<dyn Service>, store: Arc<dyn Store>, kind: TaskKind) -> Self {
        Self { service, store, kind }
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub async fn run(&self) -> Result<(), TaskError> {
        match &self.kind {
            TaskKind::Backup { keep } => run_backup(self.service.as_ref(), self.store.as_ref(), *keep).await,
            TaskKind::Restore { key, prefix } => {
                run_restore(self.service.as_ref(), self.store.as_ref(), key.as_deref(), prefix).await
            }
        }
    }
}
