//! Core scheduling primitives: identifiers, cron schedules, job definitions
//! and the job registry.

pub mod clock;
pub mod job;
pub mod registry;
pub mod schedule;
pub mod types;
