//! Throttled submission loop
//!
//! The scheduler wakes up at a fixed interval, refreshes the state of the
//! submitted jobs and launches pending ones while respecting the limits of
//! `scheduler.yml`.

mod config;
mod runner;

pub use config::{SchedulerConfig, SIMPLE_SCHEDULER};
pub use runner::{admission_slots, JobEntry, JobList, RunSummary, Scheduler, StopReason};
