//! Cron scheduler with random start delay and graceful shutdown
//!
//! Every firing moves through [`FiringState`]: it is scheduled, waits a random
//! delay unless that delay is zero, then either runs the task or is cancelled
//! because shutdown began while it was waiting. A task that already started
//! always runs to completion; shutdown waits for it.

use crate::error::{ScheduleError, TaskError};
use crate::utils::cron::{is_unscheduled, parse_schedule};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// When a task runs
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Run once, immediately, and return the task's result
    Once,
    Recurring(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a cron expression; empty or `none` means run once
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        if is_unscheduled(expression) {
            return Ok(Schedule::Once);
        }
        Ok(Schedule::Recurring(Box::new(parse_schedule(expression)?)))
    }
}

/// Source of the per-firing start delay
pub trait JitterSource: Send + Sync {
    /// Seconds to wait, in `[0, max)`
    fn next_delay(&self, max: u64) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn next_delay(&self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..max)
    }
}

/// Delay primitive, replaceable so firings can be driven without real timers
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clamp the configured delay bound; values of 0 or less become 1
pub fn normalize_jitter(max: i64) -> u64 {
    if max <= 0 {
        warn!("Schedule random delay was set to a number <= 0, using 1 as default");
        return 1;
    }
    max as u64
}

/// Lifecycle of one firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringState {
    Scheduled,
    Waiting(Duration),
    /// Shutdown arrived during the wait; the task never ran
    Cancelled,
    Running,
    Finished,
}

#[derive(Clone)]
pub struct Scheduler {
    schedule: Schedule,
    max_jitter: u64,
    jitter: Arc<dyn JitterSource>,
    sleeper: Arc<dyn Sleeper>,
}

impl Scheduler {
    pub fn new(schedule: Schedule, max_jitter: i64) -> Self {
        Self {
            schedule,
            max_jitter: normalize_jitter(max_jitter),
            jitter: Arc::new(RandomJitter),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_jitter(&self) -> u64 {
        self.max_jitter
    }

    /// Handle one firing: wait the random delay, then run `task` unless cancelled.
    ///
    /// Task errors are logged here and never reach the caller.
    pub async fn fire<Fut>(&self, cancel: &CancellationToken, task: Fut) -> FiringState
    where
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let mut state = FiringState::Scheduled;
        let seconds = self.jitter.next_delay(self.max_jitter);

        if seconds > 0 {
            state = transition(state, FiringState::Waiting(Duration::from_secs(seconds)));
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduled run cancelled during its {}s start delay", seconds);
                    return transition(state, FiringState::Cancelled);
                }
                _ = self.sleeper.sleep(Duration::from_secs(seconds)) => {}
            }
        }

        state = transition(state, FiringState::Running);
        if let Err(e) = task.await {
            error!("Failed to run scheduled task: {}", e);
        }
        transition(state, FiringState::Finished)
    }

    /// Run `task` on the schedule until `shutdown` completes.
    ///
    /// With [`Schedule::Once`] the task runs immediately and its error is
    /// returned. Otherwise firings continue until shutdown, which cancels
    /// pending delays and waits for running tasks.
    pub async fn run_until<F, Fut, S>(&self, task: F, shutdown: S) -> Result<(), TaskError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let schedule = match &self.schedule {
            Schedule::Once => return task().await,
            Schedule::Recurring(schedule) => schedule,
        };

        let cancel = CancellationToken::new();
        let mut firings = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Scheduler started, random delay up to {}s", self.max_jitter);
        let mut last = Local::now();
        loop {
            let now = Local::now();
            let Some(next) = next_slot(schedule, last, now) else {
                warn!("Schedule has no upcoming runs");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Next run at {}", next);

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.sleeper.sleep(wait) => {}
            }
            last = next;

            let firing = self.clone();
            let cancel = cancel.clone();
            let run = task();
            firings.spawn(async move { firing.fire(&cancel, run).await });

            while let Some(done) = firings.try_join_next() {
                report_join(done);
            }
        }

        info!("Stopping scheduler, waiting for {} pending run(s)", firings.len());
        cancel.cancel();
        while let Some(done) = firings.join_next().await {
            report_join(done);
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run<F, Fut>(&self, task: F) -> Result<(), TaskError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.run_until(task, shutdown_signal()).await
    }
}

/// First slot after both the previous firing and `now`
///
/// A sleep that returns early leaves `now` before `last`, so the slot that
/// just fired is not picked again. Slots missed while the process was
/// suspended are skipped.
fn next_slot(
    schedule: &cron::Schedule,
    last: DateTime<Local>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    schedule.after(&last.max(now)).next()
}

fn transition(from: FiringState, to: FiringState) -> FiringState {
    debug!(?from, ?to, "Scheduled run state change");
    to
}

fn report_join(done: Result<FiringState, tokio::task::JoinError>) {
    if let Err(e) = done {
        error!("Scheduled run aborted: {}", e);
    }
}

/// Resolves on the first interrupt or termination signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for termination signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt, shutting down"),
        _ = terminate => info!("Received termination signal, shutting down"),
    }
}
