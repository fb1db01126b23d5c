//! The feed watcher.
//!
//! A [`Watcher`] owns one feed. [`Watcher::check`] fetches it, keeps the
//! entries published after the stored watermark, and hands them to the
//! handler oldest first. The watermark is written back after every accepted
//! entry, so a crash or a failing handler after N deliveries leaves exactly N
//! entries marked as delivered.
//!
//! [`Watcher::listen`] and [`Watcher::stop`] run `check` periodically on a
//! [`Scheduler`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::scheduler::{JobFn, JobSpec, Scheduler};
use crate::source::{FeedEntry, FeedSource, RssSource};
use crate::store::{FileStore, WatermarkStore};

/// Prefix of the scheduler job id, keeping feed ids from colliding with
/// other jobs on a shared scheduler.
pub const JOB_ID_PREFIX: &str = "scout-rss";

/// Default polling interval for [`Watcher::listen`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Receives new entries, one call per entry.
///
/// `Ok(true)` confirms the entry and `Ok(false)` rejects it; the distinction
/// only matters when the watcher requires confirmation. `Err` (or a panic)
/// is a fault. After a rejection or fault the watcher stops for this check
/// and will offer the same entry again next time.
///
/// Any `Fn(&FeedEntry) -> anyhow::Result<bool>` is a handler.
pub trait EntryHandler: Send + Sync {
    fn handle(&self, entry: &FeedEntry) -> anyhow::Result<bool>;
}

impl<F> EntryHandler for F
where
    F: Fn(&FeedEntry) -> anyhow::Result<bool> + Send + Sync,
{
    fn handle(&self, entry: &FeedEntry) -> anyhow::Result<bool> {
        self(entry)
    }
}

/// Outcome of handing one entry to the handler.
#[derive(Debug)]
enum Delivery {
    /// Accepted; the watermark may move to this timestamp.
    Delivered(DateTime<Utc>),
    /// The handler declined to confirm.
    Rejected,
    /// The handler returned an error or panicked.
    Faulted(anyhow::Error),
}

/// Who shuts the scheduler down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Built by `listen`; `stop` shuts it down.
    Owned,
    /// Supplied by the caller; `stop` only removes our job.
    External,
}

struct Listener {
    scheduler: Arc<dyn Scheduler>,
    ownership: Ownership,
}

/// Options for [`Watcher::listen`].
#[derive(Clone)]
pub struct ListenOptions {
    /// Time between checks.
    pub interval: Duration,
    /// Park the calling thread in the scheduler until it is shut down.
    pub blocking: bool,
    /// Scheduler to register with. When `None` the watcher builds and owns
    /// one.
    pub scheduler: Option<Arc<dyn Scheduler>>,
    /// Job to run instead of [`Watcher::check`].
    pub check_fn: Option<JobFn>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            blocking: false,
            scheduler: None,
            check_fn: None,
        }
    }
}

impl ListenOptions {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn check_fn(mut self, check_fn: JobFn) -> Self {
        self.check_fn = Some(check_fn);
        self
    }
}

/// Builds a [`Watcher`]. See [`Watcher::builder`].
pub struct WatcherBuilder {
    url: String,
    handler: Arc<dyn EntryHandler>,
    id: Option<String>,
    store: Option<Arc<dyn WatermarkStore>>,
    source: Option<Arc<dyn FeedSource>>,
    last_seen: Option<DateTime<Utc>>,
    require_confirmation: bool,
}

impl WatcherBuilder {
    /// Like [`Watcher::builder`], for a handler that is already a trait
    /// object.
    pub fn with_handler(url: impl Into<String>, handler: Arc<dyn EntryHandler>) -> Self {
        Self {
            url: url.into(),
            handler,
            id: None,
            store: None,
            source: None,
            last_seen: None,
            require_confirmation: false,
        }
    }

    /// Key for the watermark store. Defaults to the URL.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Defaults to a [`FileStore`] at [`crate::store::DEFAULT_PATH`].
    pub fn store(mut self, store: Arc<dyn WatermarkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`RssSource`].
    pub fn source(mut self, source: Arc<dyn FeedSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Start from this watermark, overriding whatever is stored.
    pub fn last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = Some(last_seen);
        self
    }

    /// Only advance the watermark when the handler returns `Ok(true)`.
    pub fn require_confirmation(mut self, require: bool) -> Self {
        self.require_confirmation = require;
        self
    }

    /// Resolve the starting watermark (override, then store, then now) and
    /// write it to the store.
    pub fn build(self) -> Result<Watcher> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("feed url must not be empty".into()));
        }
        let id = self.id.unwrap_or_else(|| self.url.clone());
        if id.trim().is_empty() {
            return Err(Error::Config("feed id must not be empty".into()));
        }

        let store: Arc<dyn WatermarkStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open_default()?),
        };
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(RssSource::new()) as Arc<dyn FeedSource>);

        let last_seen = match self.last_seen {
            Some(last_seen) => last_seen,
            None => store.get_last_seen(&id)?.unwrap_or_else(Utc::now),
        };
        store.set_last_seen(&id, last_seen)?;
        debug!(feed = %id, %last_seen, "Watcher created");

        Ok(Watcher {
            url: self.url,
            id,
            handler: self.handler,
            source,
            store,
            require_confirmation: self.require_confirmation,
            last_seen: Mutex::new(last_seen),
            running: Mutex::new(()),
            listener: Mutex::new(None),
        })
    }
}

/// Watches one feed and delivers each new entry to a handler.
pub struct Watcher {
    url: String,
    id: String,
    handler: Arc<dyn EntryHandler>,
    source: Arc<dyn FeedSource>,
    store: Arc<dyn WatermarkStore>,
    require_confirmation: bool,
    /// Mirror of the stored watermark; refreshed at the start of each check.
    last_seen: Mutex<DateTime<Utc>>,
    /// Held for the whole of a check; at most one runs at a time.
    running: Mutex<()>,
    listener: Mutex<Option<Listener>>,
}

impl Watcher {
    /// Start building a watcher for `url` that passes new entries to
    /// `handler`.
    ///
    /// ```ignore
    /// let watcher = Watcher::builder("https://example.com/feed.rss", |entry| {
    ///     println!("{:?}", entry.title);
    ///     Ok(true)
    /// })
    /// .store(Arc::new(MemoryStore::new()))
    /// .build()?;
    /// watcher.check()?;
    /// ```
    pub fn builder<F>(url: impl Into<String>, handler: F) -> WatcherBuilder
    where
        F: Fn(&FeedEntry) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        WatcherBuilder::with_handler(url, Arc::new(handler))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }

    /// The cached watermark as of the last check or delivery.
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.lock()
    }

    /// The id this watcher's job is registered under.
    pub fn job_id(&self) -> String {
        format!("{JOB_ID_PREFIX}:{}", self.id)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Fetch the feed and deliver every entry newer than the watermark.
    ///
    /// Handler rejections and faults are logged and end the check early;
    /// they are not errors. Fetch and store failures are.
    ///
    /// A call made while another check of this watcher is still running is
    /// skipped and returns `Ok(())`.
    pub fn check(&self) -> Result<()> {
        let Some(_running) = self.running.try_lock() else {
            warn!(feed = %self.id, "Previous check still in progress, skipping this one");
            return Ok(());
        };
        let last_seen = self.refresh()?;

        let entries = self.source.fetch(&self.url)?;
        if entries.is_empty() {
            debug!(feed = %self.id, "Feed returned no entries");
            return Ok(());
        }
        let total = entries.len();

        let mut fresh: Vec<(DateTime<Utc>, FeedEntry)> = entries
            .into_iter()
            .filter_map(|entry| entry.published.map(|published| (published, entry)))
            .filter(|(published, _)| *published > last_seen)
            .collect();
        fresh.sort_by_key(|(published, _)| *published);

        debug!(feed = %self.id, total, new = fresh.len(), "Found new entries");

        for (published, entry) in fresh {
            match self.deliver(&entry, published) {
                Delivery::Delivered(published) => self.advance(published)?,
                Delivery::Rejected => {
                    warn!(
                        feed = %self.id,
                        entry = %entry.id,
                        %published,
                        "Handler did not confirm entry, not advancing last seen"
                    );
                    break;
                }
                Delivery::Faulted(e) => {
                    error!(
                        feed = %self.id,
                        entry = %entry.id,
                        %published,
                        error = ?e,
                        "Handler failed, not advancing last seen"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Register `check` on a scheduler, running first straight away and then
    /// every `options.interval`.
    ///
    /// Without `options.scheduler` a scheduler is built, owned and started
    /// here. A caller's scheduler is only started when `blocking` is set;
    /// otherwise starting it is the caller's job.
    pub fn listen(self: &Arc<Self>, options: ListenOptions) -> Result<()> {
        let job_id = self.job_id();
        let (scheduler, ownership) = {
            let mut listener = self.listener.lock();
            if listener.is_some() {
                return Err(Error::Config(format!("{} is already listening", self.url)));
            }

            let (scheduler, ownership) = match options.scheduler {
                Some(scheduler) => (scheduler, Ownership::External),
                None => (default_scheduler()?, Ownership::Owned),
            };
            let func = options.check_fn.unwrap_or_else(|| self.check_job());
            scheduler.add_job(JobSpec {
                id: job_id.clone(),
                func,
                interval: options.interval,
                max_instances: 1,
                next_run_time: Some(Utc::now()),
            })?;

            *listener = Some(Listener {
                scheduler: Arc::clone(&scheduler),
                ownership,
            });
            (scheduler, ownership)
        };

        info!(
            url = %self.url,
            %job_id,
            "Watching feed every {} seconds",
            options.interval.as_secs_f64()
        );

        let started = match (options.blocking, ownership) {
            (true, _) => scheduler.run_blocking(),
            (false, Ownership::Owned) => scheduler.start(),
            (false, Ownership::External) => Ok(()),
        };
        if let Err(e) = started {
            self.listener.lock().take();
            if let Err(remove) = scheduler.remove_job(&job_id) {
                warn!(
                    %job_id,
                    error = %remove,
                    "Failed to remove job after scheduler start failed"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove this watcher's job. A scheduler built by `listen` is shut down
    /// too; a caller's scheduler is left running.
    ///
    /// Does not interrupt a check already in progress.
    pub fn stop(&self) -> Result<()> {
        let Some(listener) = self.listener.lock().take() else {
            debug!(feed = %self.id, "Not listening, nothing to stop");
            return Ok(());
        };
        listener.scheduler.remove_job(&self.job_id())?;
        if listener.ownership == Ownership::Owned {
            listener.scheduler.shutdown()?;
        }
        info!(url = %self.url, "Stopped listening");
        Ok(())
    }

    fn refresh(&self) -> Result<DateTime<Utc>> {
        let stored = self.store.get_last_seen(&self.id)?;
        let mut last_seen = self.last_seen.lock();
        if let Some(stored) = stored {
            *last_seen = stored;
        }
        Ok(*last_seen)
    }

    fn advance(&self, published: DateTime<Utc>) -> Result<()> {
        self.store.set_last_seen(&self.id, published)?;
        *self.last_seen.lock() = published;
        Ok(())
    }

    fn deliver(&self, entry: &FeedEntry, published: DateTime<Utc>) -> Delivery {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(entry)));
        match outcome {
            Ok(Ok(confirmed)) if confirmed || !self.require_confirmation => {
                Delivery::Delivered(published)
            }
            Ok(Ok(_)) => Delivery::Rejected,
            Ok(Err(e)) => Delivery::Faulted(e),
            Err(payload) => Delivery::Faulted(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// The default job: check through a weak reference so a scheduler
    /// holding the job does not keep the watcher alive.
    fn check_job(self: &Arc<Self>) -> JobFn {
        let watcher: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            let Some(watcher) = watcher.upgrade() else {
                debug!("Watcher dropped, skipping check");
                return;
            };
            if let Err(e) = watcher.check() {
                error!(feed = %watcher.id, error = %e, "Feed check failed");
            }
        })
    }
}

#[cfg(feature = "scheduler")]
fn default_scheduler() -> Result<Arc<dyn Scheduler>> {
    Ok(Arc::new(crate::scheduler::IntervalScheduler::new()?))
}

#[cfg(not(feature = "scheduler"))]
fn default_scheduler() -> Result<Arc<dyn Scheduler>> {
    Err(Error::Config(
        "no scheduler supplied and the `scheduler` feature is disabled".into(),
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
