use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dump_manager::config::{self, Config, LogFormat};
use dump_manager::managers::logging::{init_logging, LoggingConfig};
use dump_manager::managers::scheduler::{Schedule, Scheduler};
use dump_manager::managers::task::{Task, TaskKind};
use dump_manager::services::{build_service, ServiceKind};
use dump_manager::stores::{build_store, StoreKind};
use dump_manager::utils::cron::SCHEDULE_NONE;
use dump_manager::utils::executor::RealExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_BACKUP_SCHEDULE: &str = "@daily";

#[derive(Parser)]
#[command(name = "dump-manager")]
#[command(about = "Scheduled database and directory dumps with retention", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file; built-in defaults are used when omitted
    #[arg(short, long, env = "DUMP_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Console log format (defaults to json when stdout is not a terminal)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Cron expression, or "none" to run once and exit
    #[arg(long, env = "SCHEDULE")]
    schedule: Option<String>,

    /// Upper bound in seconds for the random delay before each scheduled run
    #[arg(long, env = "SCHEDULE_RANDOM_DELAY", allow_negative_numbers = true)]
    random_delay: Option<i64>,

    /// Directory for fresh dumps and downloaded backups
    #[arg(long, env = "SAVE_DIR")]
    save_dir: Option<PathBuf>,

    /// Password for the postgres or mysql service
    #[arg(long, env = "DATABASE_PASSWORD", hide_env_values = true)]
    database_password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a service into a store, then prune old backups
    Backup {
        #[arg(value_enum)]
        service: ServiceKind,

        #[arg(value_enum)]
        store: StoreKind,

        #[command(flatten)]
        run: RunArgs,

        /// Backups kept per family; 0 or less keeps everything
        #[arg(long, env = "MAX_BACKUPS", allow_negative_numbers = true)]
        max_backups: Option<i64>,
    },

    /// Restore a service from a store
    Restore {
        #[arg(value_enum)]
        service: ServiceKind,

        #[arg(value_enum)]
        store: StoreKind,

        #[command(flatten)]
        run: RunArgs,

        /// Key to restore instead of the newest backup
        #[arg(long, env = "RESTORE_FILE")]
        restore_file: Option<String>,

        /// Name prefix used to find the newest backup
        #[arg(long, env = "RESTORE_PREFIX")]
        restore_prefix: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Also check the sections this service needs
        #[arg(value_enum)]
        service: Option<ServiceKind>,

        /// Also check the sections this store needs
        #[arg(value_enum)]
        store: Option<StoreKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let logging_config = LoggingConfig::from_config(&config.global)
        .with_debug(cli.debug)
        .with_format(cli.log_format);
    let _log_guard = init_logging(&logging_config)?;

    match cli.command {
        Commands::Backup {
            service,
            store,
            run,
            max_backups,
        } => {
            apply_run_args(&mut config, service, &run, DEFAULT_BACKUP_SCHEDULE);
            if let Some(max) = max_backups {
                config.global.max_backups = max;
            }
            let kind = TaskKind::Backup {
                keep: config.global.keep(),
            };
            execute(&config, service, store, kind).await
        }

        Commands::Restore {
            service,
            store,
            run,
            restore_file,
            restore_prefix,
        } => {
            apply_run_args(&mut config, service, &run, SCHEDULE_NONE);
            if restore_file.is_some() {
                config.global.restore_file = restore_file;
            }
            if let Some(prefix) = restore_prefix {
                config.global.restore_prefix = prefix;
            }
            let kind = TaskKind::Restore {
                key: config.global.restore_file.clone(),
                prefix: config.global.restore_prefix.clone(),
            };
            execute(&config, service, store, kind).await
        }

        Commands::Validate { service, store } => {
            config::validate_config(&config)?;
            if let (Some(service), Some(store)) = (service, store) {
                config::validate_selection(&config, service, store)?;
                println!("Configuration is valid for {} -> {}", service.name(), store.name());
            } else {
                println!("Configuration is valid!");
            }
            println!("Save directory: {}", config.global.save_dir.display());
            println!(
                "Schedule: {}",
                config.global.schedule.as_deref().unwrap_or("command default")
            );
            println!("Max backups: {}", config.global.max_backups);
            Ok(())
        }
    }
}

/// Layer command-line overrides on top of the loaded configuration
fn apply_run_args(config: &mut Config, service: ServiceKind, run: &RunArgs, default_schedule: &str) {
    if let Some(schedule) = &run.schedule {
        config.global.schedule = Some(schedule.clone());
    }
    if config.global.schedule.is_none() {
        config.global.schedule = Some(default_schedule.to_string());
    }
    if let Some(delay) = run.random_delay {
        config.global.schedule_random_delay = delay;
    }
    if let Some(save_dir) = &run.save_dir {
        config.global.save_dir = save_dir.clone();
    }
    if let Some(password) = &run.database_password {
        match service {
            ServiceKind::Postgres => config.postgres.password = Some(password.clone()),
            ServiceKind::Mysql => config.mysql.password = Some(password.clone()),
            _ => {}
        }
    }
}

async fn execute(config: &Config, service: ServiceKind, store: StoreKind, kind: TaskKind) -> Result<()> {
    config::validate_config(config)?;
    config::validate_selection(config, service, store)?;

    let expression = config.global.schedule.as_deref().unwrap_or(SCHEDULE_NONE);
    let schedule = Schedule::parse(expression)?;

    let source = build_service(service, config, Arc::new(RealExecutor::new()));
    let sink = build_store(store, config)?;
    info!(
        service = service.name(),
        store = store.name(),
        schedule = expression,
        "Starting dump-manager"
    );

    let task = Task::new(source, sink, kind);
    let scheduler = Scheduler::new(schedule, config.global.schedule_random_delay);
    scheduler
        .run(move || {
            let task = task.clone();
            async move { task.run().await }
        })
        .await?;
    Ok(())
}
