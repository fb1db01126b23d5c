//! Periodic job scheduling.
//!
//! [`Watcher::listen`](crate::Watcher::listen) registers its check as a job
//! on a [`Scheduler`]. Bring your own implementation to share a scheduler
//! with the rest of an application, or let the watcher build an
//! [`IntervalScheduler`] (behind the default `scheduler` feature).

#[cfg(feature = "scheduler")]
mod interval;

#[cfg(feature = "scheduler")]
pub use interval::IntervalScheduler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// The callable a scheduler runs. Failures are the job's own business: it
/// should log them, not panic.
pub type JobFn = Arc<dyn Fn() + Send + Sync>;

/// An interval-triggered job.
#[derive(Clone)]
pub struct JobSpec {
    pub id: String,
    pub func: JobFn,
    pub interval: Duration,
    /// How many runs of this job may overlap. Triggers that fire while this
    /// many are in flight are dropped, not queued.
    pub max_instances: usize,
    /// When to run first. `None` waits one interval.
    pub next_run_time: Option<DateTime<Utc>>,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("max_instances", &self.max_instances)
            .field("next_run_time", &self.next_run_time)
            .finish_non_exhaustive()
    }
}

/// Runs jobs on an interval.
pub trait Scheduler: Send + Sync {
    /// Register a job. Ids are unique per scheduler; adding a duplicate id
    /// is an error.
    fn add_job(&self, job: JobSpec) -> Result<()>;

    /// Unregister a job. A run already in flight is left to finish.
    fn remove_job(&self, id: &str) -> Result<()>;

    /// Start firing jobs in the background and return.
    fn start(&self) -> Result<()>;

    /// Start firing jobs and park the calling thread until [`shutdown`] is
    /// called from elsewhere.
    ///
    /// [`shutdown`]: Scheduler::shutdown
    fn run_blocking(&self) -> Result<()>;

    /// Stop firing all jobs.
    fn shutdown(&self) -> Result<()>;
}
