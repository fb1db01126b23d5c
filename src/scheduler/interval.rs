//! A small interval scheduler on top of a private tokio runtime.
//!
//! Each job gets a timer task that ticks on its interval. Ticks run the job
//! on the blocking pool, because jobs (feed checks) do blocking I/O. A tick
//! that fires while `max_instances` runs are still in flight is skipped, and
//! missed ticks are never replayed.
//!
//! In-flight counts are kept per job id and outlive `remove_job`, so a job
//! removed and re-added under the same id while a run is still going waits
//! for that run like any other tick would.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{JobSpec, Scheduler};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Running,
    Stopped,
}

struct JobEntry {
    spec: JobSpec,
    token: CancellationToken,
}

struct Inner {
    runtime: Option<Runtime>,
    state: State,
    jobs: HashMap<String, JobEntry>,
    /// Runs in progress per job id. Never pruned on removal.
    in_flight: HashMap<String, Arc<AtomicUsize>>,
}

pub struct IntervalScheduler {
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
}

impl IntervalScheduler {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scout-rss-scheduler")
            .enable_time()
            .build()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                runtime: Some(runtime),
                state: State::Pending,
                jobs: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state == State::Running
    }

    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.lock().jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn handle(inner: &Inner) -> Result<Handle> {
        inner
            .runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or_else(|| Error::Scheduler("scheduler has been shut down".into()))
    }

    fn in_flight(inner: &mut Inner, id: &str) -> Arc<AtomicUsize> {
        Arc::clone(inner.in_flight.entry(id.to_string()).or_default())
    }
}

impl Scheduler for IntervalScheduler {
    fn add_job(&self, job: JobSpec) -> Result<()> {
        if job.interval.is_zero() {
            return Err(Error::Scheduler(format!("job {:?} has a zero interval", job.id)));
        }
        if job.max_instances == 0 {
            return Err(Error::Scheduler(format!(
                "job {:?} must allow at least one instance",
                job.id
            )));
        }
        if first_tick(&job).is_none() {
            return Err(Error::Scheduler(format!(
                "job {:?} has a first run time too far in the future",
                job.id
            )));
        }

        let mut inner = self.inner.lock();
        if inner.state == State::Stopped {
            return Err(Error::Scheduler("scheduler has been shut down".into()));
        }
        if inner.jobs.contains_key(&job.id) {
            return Err(Error::Scheduler(format!("job {:?} already exists", job.id)));
        }

        let token = self.shutdown.child_token();
        if inner.state == State::Running {
            let in_flight = Self::in_flight(&mut inner, &job.id);
            spawn_job(&Self::handle(&inner)?, job.clone(), token.clone(), in_flight);
        }
        debug!(job_id = %job.id, interval = ?job.interval, "Added job");
        inner.jobs.insert(job.id.clone(), JobEntry { spec: job, token });
        Ok(())
    }

    fn remove_job(&self, id: &str) -> Result<()> {
        let entry = self
            .inner
            .lock()
            .jobs
            .remove(id)
            .ok_or_else(|| Error::Scheduler(format!("no job with id {id:?}")))?;
        entry.token.cancel();
        debug!(job_id = %id, "Removed job");
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Running => return Ok(()),
            State::Stopped => {
                return Err(Error::Scheduler("scheduler has been shut down".into()));
            }
            State::Pending => {}
        }

        let handle = Self::handle(&inner)?;
        let jobs: Vec<_> = inner
            .jobs
            .values()
            .map(|entry| (entry.spec.clone(), entry.token.clone()))
            .collect();
        for (spec, token) in jobs {
            let in_flight = Self::in_flight(&mut inner, &spec.id);
            spawn_job(&handle, spec, token, in_flight);
        }
        inner.state = State::Running;
        info!(jobs = inner.jobs.len(), "Scheduler started");
        Ok(())
    }

    fn run_blocking(&self) -> Result<()> {
        self.start()?;
        let handle = Self::handle(&self.inner.lock())?;
        let shutdown = self.shutdown.clone();
        handle.block_on(shutdown.cancelled());
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let runtime = {
            let mut inner = self.inner.lock();
            if inner.state == State::Stopped {
                return Ok(());
            }
            inner.state = State::Stopped;
            inner.jobs.clear();
            inner.runtime.take()
        };
        self.shutdown.cancel();
        // Never waits: in-flight runs finish on their own, and this may be
        // called from inside one of them.
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
        info!("Scheduler shut down");
        Ok(())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.inner.get_mut().runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Decrements the in-flight counter when a run ends, panicking or not.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// When the first tick fires, or `None` if that instant is not representable.
fn first_tick(job: &JobSpec) -> Option<Instant> {
    let delay = match job.next_run_time {
        Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => job.interval,
    };
    Instant::now().checked_add(delay)
}

fn spawn_job(
    handle: &Handle,
    job: JobSpec,
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
) {
    handle.spawn(async move {
        let Some(start) = first_tick(&job) else {
            error!(job_id = %job.id, "First run time out of range, job not scheduled");
            return;
        };
        let mut timer = tokio::time::interval_at(start, job.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = timer.tick() => {}
            }

            let claimed = in_flight.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < job.max_instances).then_some(n + 1)
            });
            if claimed.is_err() {
                warn!(job_id = %job.id, "Previous run still in progress, skipping this one");
                continue;
            }

            let guard = InFlight(Arc::clone(&in_flight));
            let func = Arc::clone(&job.func);
            let job_id = job.id.clone();
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                if panic::catch_unwind(AssertUnwindSafe(|| func())).is_err() {
                    error!(%job_id, "Job panicked");
                }
            });
        }
        debug!(job_id = %job.id, "Job timer stopped");
    });
}
