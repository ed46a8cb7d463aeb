//! cronjob - a single-process cron job scheduler.
//!
//! Usage:
//!   cronjob run [--config FILE]        Run the scheduler with the built-in jobs
//!   cronjob validate [--config FILE]   Validate the configuration without running
//!   cronjob list [--config FILE]       List the declared jobs and their next fire time
//!   cronjob next <EXPR> [-n N]         Print upcoming fire times of an expression

use chrono::Utc;
use clap::{Parser, Subcommand};
use cronjob::config::{Config, JobSetBuilder, YamlLoader};
use cronjob::jobs::builtin_jobs;
use cronjob::notes::{InMemoryNoteStore, NoteStore};
use cronjob::{CronSchedule, EventBus, LoggingHandler, ScheduledJob};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// cronjob - a single-process cron job scheduler
#[derive(Parser)]
#[command(name = "cronjob")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with the built-in jobs until Ctrl+C
    Run {
        /// Path to a YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Validate the configuration and the declared jobs without running
    Validate {
        /// Path to a YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List the declared jobs
    List {
        /// Path to a YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the upcoming fire times of a cron expression
    Next {
        /// Cron expression, e.g. "0 0/5 * * * ? *"
        #[arg(value_name = "EXPR")]
        expression: String,

        /// Number of fire times to print
        #[arg(short, long, default_value = "5")]
        n: usize,

        /// IANA timezone the expression is evaluated in
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
}

/// A declared job as printed by `list --json`.
#[derive(Serialize)]
struct ListedJob {
    name: String,
    group: String,
    cron: String,
    timezone: String,
    description: String,
    next_fire_at: Option<chrono::DateTime<Utc>>,
}

impl From<&ScheduledJob> for ListedJob {
    fn from(job: &ScheduledJob) -> Self {
        let definition = job.definition();
        Self {
            name: definition.name().to_string(),
            group: definition.group().to_string(),
            cron: job.schedule().expression().to_string(),
            timezone: job.schedule().timezone().to_string(),
            description: definition.description().to_string(),
            next_fire_at: job.schedule().next_fire_after(Utc::now()).ok(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run_scheduler(config.as_deref()).await?;
        }
        Commands::Validate { config } => {
            validate_config(config.as_deref())?;
        }
        Commands::List { config, json } => {
            list_jobs(config.as_deref(), json)?;
        }
        Commands::Next {
            expression,
            n,
            timezone,
        } => {
            print_next(&expression, n, &timezone)?;
        }
    }

    Ok(())
}

/// Load the configuration file, or the defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(YamlLoader::load_config(path)?)
        }
        None => Ok(Config::default()),
    }
}

/// Run the scheduler with the built-in jobs.
async fn run_scheduler(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = JobSetBuilder::new(load_config(config)?);
    let store: Arc<dyn NoteStore> = Arc::new(InMemoryNoteStore::new());

    // Create event bus with logging handler
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let scheduler = builder
        .build_scheduler(builtin_jobs(store))?
        .with_event_bus(event_bus);

    info!("Declared {} job(s):", scheduler.registry().len());
    for job in scheduler.registry().jobs() {
        info!("  - {} [{}]", job.key(), job.schedule());
    }

    info!("Starting scheduler...");
    info!("Press Ctrl+C to stop");

    let (handle, mut scheduler_task) = scheduler.start();

    // Wait for Ctrl+C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            handle.shutdown().await?;
            scheduler_task.await?;
        }
        _ = &mut scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate the configuration and the declared job set.
fn validate_config(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = JobSetBuilder::new(load_config(config)?);
    let store: Arc<dyn NoteStore> = Arc::new(InMemoryNoteStore::new());

    match builder.build_registry(builtin_jobs(store)) {
        Ok(registry) => {
            info!("All {} job(s) are valid:", registry.len());
            for job in registry.jobs() {
                info!("  - {}: OK", job.key());
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List the declared jobs.
fn list_jobs(config: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let builder = JobSetBuilder::new(load_config(config)?);
    let store: Arc<dyn NoteStore> = Arc::new(InMemoryNoteStore::new());
    let registry = builder.build_registry(builtin_jobs(store))?;
    let jobs: Vec<ListedJob> = registry.jobs().iter().map(ListedJob::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs declared");
        return Ok(());
    }

    for job in &jobs {
        println!("{}.{}", job.group, job.name);
        println!("  Cron: {} ({})", job.cron, job.timezone);
        if !job.description.is_empty() {
            println!("  Description: {}", job.description);
        }
        match job.next_fire_at {
            Some(next) => println!("  Next fire: {}", next),
            None => println!("  Next fire: never"),
        }
        println!();
    }

    Ok(())
}

/// Print the upcoming fire times of an expression.
fn print_next(expression: &str, n: usize, timezone: &str) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = CronSchedule::with_timezone(expression, timezone)?;
    let tz = schedule.timezone();

    for fire_at in schedule.next_n_after(Utc::now(), n)? {
        println!("{}  ({})", fire_at.with_timezone(&tz), fire_at);
    }

    Ok(())
}
