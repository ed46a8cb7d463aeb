//! cronjob - a single-process cron job scheduler.
//!
//! Jobs are declared with a Quartz-style cron expression and run on tokio.
//! A job never overlaps itself, and shutdown drains running jobs before
//! returning.

pub mod config;
pub mod core;
pub mod events;
pub mod jobs;
pub mod notes;
pub mod scheduler;
pub mod testing;

pub use config::{Config, ConfigError, JobSetBuilder, YamlLoader};
pub use crate::core::clock::{Clock, SystemClock, TokioClock};
pub use crate::core::job::{CronJob, JobDefinition, JobError, ScheduledJob, job_fn};
pub use crate::core::registry::{JobRegistry, RegistryError};
pub use crate::core::schedule::{CronSchedule, ParseError, ScheduleError};
pub use crate::core::types::{JobKey, RunId};
pub use events::{Event, EventBus, EventHandler, LoggingHandler};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
