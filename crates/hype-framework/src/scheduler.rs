//! Recurring and one-shot jobs.
//!
//! The [`Scheduler`] is a single task owning a time-ordered queue of next
//! fire instants. On every wake-up it pops all due jobs, spawns each handler
//! in its own task (so a failing or panicking job never affects the others),
//! and re-queues the job:
//!
//! | Trigger     | Next fire                                                   |
//! |-------------|-------------------------------------------------------------|
//! | `Interval`  | now + interval                                              |
//! | `Daily`     | next occurrence of the time of day in the configured offset |
//! | `Once`      | never; the job becomes `Completed`                          |
//!
//! Disabled jobs stay in the queue and are skipped when due, so enabling a
//! job later never fires a burst of missed occurrences.
//!
//! Zero intervals and delays longer than [`MAX_DELAY`] are refused when the
//! job is scheduled. Completed one-shot jobs stay listed until more than
//! [`DEFAULT_COMPLETED_RETENTION`] of them have piled up; the oldest are then
//! forgotten.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new(clock, FixedOffset::east_opt(0).unwrap());
//! scheduler.add_job(ScheduledJob::new(
//!     "daily_allowance",
//!     Trigger::daily(0, 0).unwrap(),
//!     allowance,
//! ))?;
//! tokio::spawn(scheduler.run(services, token.clone()));
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use futures::FutureExt;
use hype_core::Store;
use hype_transport::Proxy;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::{Services, SharedClock};
use crate::error::{HandlerError, RegistryError, RegistryResult, SchedulerError};
use crate::handler::{BoxedJobHandler, JobHandler};

// ─── Job definitions ──────────────────────────────────────────────────────────

/// Longest accepted interval or one-shot delay (about ten years).
pub const MAX_DELAY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Completed one-shot jobs kept for [`SchedulerHandle::jobs`].
pub const DEFAULT_COMPLETED_RETENTION: usize = 256;

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `interval`, first fire one interval after scheduling.
    Interval(Duration),
    /// Every day at a wall-clock time in the scheduler's UTC offset.
    Daily {
        /// Time of day.
        at: NaiveTime,
    },
    /// Once, after a delay.
    Once(Duration),
}

impl Trigger {
    /// Daily trigger at `hour:minute`.
    pub fn daily(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|at| Self::Daily { at })
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Interval(every) if every.is_zero() => Err("interval must be positive".into()),
            Self::Interval(delay) | Self::Once(delay) if delay > MAX_DELAY => {
                Err(format!("{delay:?} is longer than the {MAX_DELAY:?} limit"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(every) => write!(f, "every {every:?}"),
            Self::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
            Self::Once(after) => write!(f, "once after {after:?}"),
        }
    }
}

/// A named job.
#[derive(Clone)]
pub struct ScheduledJob {
    name: String,
    trigger: Trigger,
    handler: BoxedJobHandler,
    enabled: bool,
}

impl ScheduledJob {
    /// Creates an enabled job.
    pub fn new(name: impl Into<String>, trigger: Trigger, handler: impl JobHandler) -> Self {
        Self {
            name: name.into(),
            trigger,
            handler: Arc::new(handler),
            enabled: true,
        }
    }

    /// Registers the job disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger policy.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for its next fire.
    Scheduled,
    /// Skipped when due.
    Disabled,
    /// A one-shot job that has fired (or was skipped).
    Completed,
}

/// Snapshot of a job, as listed by [`SchedulerHandle::jobs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Job name.
    pub name: String,
    /// Trigger policy.
    pub trigger: Trigger,
    /// Current state.
    pub status: JobStatus,
    /// Completed runs, successful or not.
    pub runs: u64,
    /// Runs that returned an error or panicked.
    pub failures: u64,
    /// Next planned fire time.
    pub next_fire: Option<DateTime<Utc>>,
}

struct JobEntry {
    name: String,
    trigger: Trigger,
    handler: BoxedJobHandler,
    enabled: AtomicBool,
    completed: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
    next_fire: Mutex<Option<DateTime<Utc>>>,
}

impl JobEntry {
    fn new(job: ScheduledJob) -> Self {
        Self {
            name: job.name,
            trigger: job.trigger,
            handler: job.handler,
            enabled: AtomicBool::new(job.enabled),
            completed: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            next_fire: Mutex::new(None),
        }
    }

    fn info(&self) -> JobInfo {
        let status = if self.completed.load(Ordering::Acquire) {
            JobStatus::Completed
        } else if self.enabled.load(Ordering::Acquire) {
            JobStatus::Scheduled
        } else {
            JobStatus::Disabled
        };
        JobInfo {
            name: self.name.clone(),
            trigger: self.trigger,
            status,
            runs: self.runs.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            next_fire: *self.next_fire.lock(),
        }
    }
}

/// Next UTC instant at which the wall clock in `offset` shows `at`.
///
/// Strictly after `now`: a time of day equal to the current one is
/// scheduled for tomorrow.
pub fn next_occurrence(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let shift = TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    let today = now.with_timezone(&offset).date_naive().and_time(at);
    let candidate = DateTime::<Utc>::from_naive_utc_and_offset(today - shift, Utc);
    if candidate > now {
        candidate
    } else {
        candidate + TimeDelta::days(1)
    }
}

// ─── Job context ──────────────────────────────────────────────────────────────

/// Context handed to a job handler for one firing.
#[derive(Debug, Clone)]
pub struct JobContext {
    name: String,
    fired_at: DateTime<Utc>,
    services: Services,
}

impl JobContext {
    /// Name of the firing job.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock fire time.
    pub fn fired_at(&self) -> DateTime<Utc> {
        self.fired_at
    }

    /// Shared subsystems.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Key/value storage.
    pub fn store(&self) -> &Arc<dyn Store> {
        self.services.store()
    }

    /// Outbound-call proxy.
    pub fn proxy(&self) -> Result<&Arc<Proxy>, HandlerError> {
        self.services.proxy()
    }

    /// Scheduler handle.
    pub fn scheduler(&self) -> &SchedulerHandle {
        self.services.scheduler()
    }
}

// ─── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable handle for adding and toggling jobs.
#[derive(Clone)]
pub struct SchedulerHandle {
    jobs: Arc<RwLock<BTreeMap<String, Arc<JobEntry>>>>,
    tx: mpsc::UnboundedSender<Arc<JobEntry>>,
}

impl SchedulerHandle {
    /// Adds a job. Names must be unique for the lifetime of the process.
    pub fn schedule(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        job.trigger
            .validate()
            .map_err(|reason| SchedulerError::InvalidTrigger {
                job: job.name.clone(),
                reason,
            })?;
        let entry = Arc::new(JobEntry::new(job));
        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&entry.name) {
                return Err(SchedulerError::DuplicateJob(entry.name.clone()));
            }
            jobs.insert(entry.name.clone(), entry.clone());
        }
        let name = entry.name.clone();
        if self.tx.send(entry).is_err() {
            self.jobs.write().remove(&name);
            return Err(SchedulerError::Stopped);
        }
        Ok(())
    }

    /// Runs `handler` once after `delay`. Returns the generated job name.
    pub fn schedule_once(
        &self,
        label: &str,
        delay: Duration,
        handler: impl JobHandler,
    ) -> Result<String, SchedulerError> {
        let name = format!("{label}-{}", Uuid::new_v4().simple());
        self.schedule(ScheduledJob::new(name.clone(), Trigger::Once(delay), handler))?;
        Ok(name)
    }

    /// Enables a job. Returns its previous state.
    pub fn enable(&self, name: &str) -> Result<bool, SchedulerError> {
        self.set_enabled(name, true)
    }

    /// Disables a job. Returns its previous state.
    pub fn disable(&self, name: &str) -> Result<bool, SchedulerError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, SchedulerError> {
        let jobs = self.jobs.read();
        let entry = jobs
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
        Ok(entry.enabled.swap(enabled, Ordering::AcqRel))
    }

    /// Snapshot of one job.
    pub fn job(&self, name: &str) -> Option<JobInfo> {
        self.jobs.read().get(name).map(|entry| entry.info())
    }

    /// Snapshot of every job, by name.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs.read().values().map(|entry| entry.info()).collect()
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("jobs", &self.jobs.read().len())
            .finish()
    }
}

// ─── Scheduler task ───────────────────────────────────────────────────────────

struct Due {
    at: Instant,
    seq: u64,
    job: Arc<JobEntry>,
}

impl PartialEq for Due {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Due {}

impl PartialOrd for Due {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Due {
    // Reversed: the earliest instant sits on top of the max-heap.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The job-queue task.
pub struct Scheduler {
    clock: SharedClock,
    offset: FixedOffset,
    handle: SchedulerHandle,
    rx: mpsc::UnboundedReceiver<Arc<JobEntry>>,
    queue: BinaryHeap<Due>,
    seq: u64,
    completed: VecDeque<String>,
    retention: usize,
}

impl Scheduler {
    /// Creates a scheduler whose daily triggers use `offset`.
    pub fn new(clock: SharedClock, offset: FixedOffset) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            clock,
            offset,
            handle: SchedulerHandle {
                jobs: Arc::new(RwLock::new(BTreeMap::new())),
                tx,
            },
            rx,
            queue: BinaryHeap::new(),
            seq: 0,
            completed: VecDeque::new(),
            retention: DEFAULT_COMPLETED_RETENTION,
        }
    }

    /// Sets how many completed one-shot jobs stay listed.
    pub fn completed_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Handle for adding and toggling jobs.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Adds a job during composition.
    pub fn add_job(&self, job: ScheduledJob) -> RegistryResult<()> {
        // The receiver lives in `self`, so only a name clash or a bad trigger can fail here.
        match self.handle.schedule(job) {
            Err(SchedulerError::DuplicateJob(name)) => Err(RegistryError::DuplicateJob(name)),
            Err(SchedulerError::InvalidTrigger { job, reason }) => {
                Err(RegistryError::InvalidJob { name: job, reason })
            }
            _ => Ok(()),
        }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Jobs already spawned when shutdown is requested are left to finish on
    /// their own.
    pub async fn run(mut self, services: Services, shutdown: CancellationToken) {
        info!(jobs = self.handle.jobs.read().len(), offset = %self.offset, "Scheduler started");
        loop {
            let next = self.queue.peek().map(|due| due.at);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(entry) = self.rx.recv() => self.enqueue(entry),
                _ = sleep_until(next) => self.fire_due(&services),
            }
        }
        info!("Scheduler stopped");
    }

    fn enqueue(&mut self, job: Arc<JobEntry>) {
        let delay = match job.trigger {
            Trigger::Interval(every) => every,
            Trigger::Once(after) => after,
            Trigger::Daily { at } => {
                let now = self.clock.utc();
                (next_occurrence(now, at, self.offset) - now)
                    .to_std()
                    .unwrap_or_default()
            }
        };
        let planned = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| self.clock.utc().checked_add_signed(delta));
        *job.next_fire.lock() = planned;
        debug!(job = %job.name, delay = ?delay, "Job queued");

        let now = Instant::now();
        self.seq += 1;
        self.queue.push(Due {
            at: now.checked_add(delay).unwrap_or(now + MAX_DELAY),
            seq: self.seq,
            job,
        });
    }

    fn fire_due(&mut self, services: &Services) {
        let now = Instant::now();
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|next| next.at <= now) {
            if let Some(Due { job, .. }) = self.queue.pop() {
                due.push(job);
            }
        }

        // Re-queued after the drain, so a job can fire at most once per wake-up.
        for job in due {
            let once = matches!(job.trigger, Trigger::Once(_));
            if job.enabled.load(Ordering::Acquire) {
                spawn_run(job.clone(), services.clone(), self.clock.utc());
            } else {
                debug!(job = %job.name, "Skipping disabled job");
            }

            if once {
                job.completed.store(true, Ordering::Release);
                *job.next_fire.lock() = None;
                self.retire(job.name.clone());
            } else {
                self.enqueue(job);
            }
        }
    }

    fn retire(&mut self, name: String) {
        self.completed.push_back(name);
        while self.completed.len() > self.retention {
            if let Some(oldest) = self.completed.pop_front() {
                self.handle.jobs.write().remove(&oldest);
                debug!(job = %oldest, "Forgot completed job");
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("offset", &self.offset)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn spawn_run(job: Arc<JobEntry>, services: Services, fired_at: DateTime<Utc>) {
    let span = info_span!("job", job = %job.name);
    let ctx = JobContext {
        name: job.name.clone(),
        fired_at,
        services: services.clone(),
    };
    tokio::spawn(
        async move {
            let outcome = AssertUnwindSafe(job.handler.call(ctx)).catch_unwind().await;
            job.runs.fetch_add(1, Ordering::AcqRel);
            match outcome {
                Ok(Ok(reply)) => {
                    let sent = services.courier().deliver(None, reply).await;
                    debug!(sent, "Job finished");
                }
                Ok(Err(e)) => {
                    job.failures.fetch_add(1, Ordering::AcqRel);
                    warn!(error = %e, "Job failed");
                }
                Err(_) => {
                    job.failures.fetch_add(1, Ordering::AcqRel);
                    error!("Job panicked");
                }
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use hype_core::{MemoryStore, Reply};
    use mockable::DefaultClock;

    use super::*;
    use crate::delivery::Courier;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn services(scheduler: &Scheduler) -> Services {
        Services::new(Arc::new(MemoryStore::new()), Courier::new(), scheduler.handle())
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl JobHandler {
        let counter = counter.clone();
        move |_ctx: JobContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(Reply::none())
            }
        }
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let now = DateTime::parse_from_rfc3339("2024-03-10T08:30:00Z").unwrap().to_utc();
        let at = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            next_occurrence(now, at, utc()),
            DateTime::parse_from_rfc3339("2024-03-10T12:00:00Z").unwrap().to_utc()
        );
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let now = DateTime::parse_from_rfc3339("2024-03-10T12:00:00Z").unwrap().to_utc();
        let at = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            next_occurrence(now, at, utc()),
            DateTime::parse_from_rfc3339("2024-03-11T12:00:00Z").unwrap().to_utc()
        );
    }

    #[test]
    fn test_next_occurrence_respects_offset() {
        // 23:30 UTC is already 08:30 the next day in UTC+9.
        let now = DateTime::parse_from_rfc3339("2024-03-10T23:30:00Z").unwrap().to_utc();
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(
            next_occurrence(now, at, tokyo),
            DateTime::parse_from_rfc3339("2024-03-11T00:00:00Z").unwrap().to_utc()
        );
    }

    #[test]
    fn test_duplicate_job_names() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let job = ScheduledJob::new("tick", Trigger::Interval(Duration::from_secs(1)), counting(&Arc::default()));
        scheduler.add_job(job.clone()).unwrap();
        assert_eq!(
            scheduler.add_job(job).unwrap_err(),
            RegistryError::DuplicateJob("tick".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_fires_repeatedly() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job(ScheduledJob::new("tick", Trigger::Interval(Duration::from_secs(10)), counting(&counter)))
            .unwrap();

        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(handle.job("tick").unwrap().runs, 3);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_jobs_are_isolated() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Trigger::Interval(Duration::from_secs(10));
        scheduler
            .add_job(ScheduledJob::new("fails", every, |_ctx: JobContext| async {
                Err::<Reply, _>(HandlerError::new("upstream down"))
            }))
            .unwrap();
        scheduler
            .add_job(ScheduledJob::new("panics", every, |_ctx: JobContext| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, HandlerError>(Reply::none())
            }))
            .unwrap();
        scheduler
            .add_job(ScheduledJob::new("healthy", every, counting(&counter)))
            .unwrap();

        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        for name in ["fails", "panics"] {
            let info = handle.job(name).unwrap();
            assert_eq!(info.status, JobStatus::Scheduled);
            assert_eq!(info.failures, 2);
        }

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_job_resumes_without_burst() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job(
                ScheduledJob::new("tick", Trigger::Interval(Duration::from_secs(10)), counting(&counter))
                    .disabled(),
            )
            .unwrap();

        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(handle.job("tick").unwrap().status, JobStatus::Disabled);

        assert!(!handle.enable("tick").unwrap());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(matches!(handle.disable("nope"), Err(SchedulerError::UnknownJob(_))));
        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once_at_runtime() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let counter = Arc::new(AtomicUsize::new(0));
        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        let name = handle
            .schedule_once("reminder", Duration::from_secs(5), counting(&counter))
            .unwrap();
        assert!(name.starts_with("reminder-"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let info = handle.job(&name).unwrap();
        assert_eq!(info.status, JobStatus::Completed);
        assert_eq!(info.next_fire, None);

        token.cancel();
        task.await.unwrap();
        assert_eq!(
            handle.schedule_once("late", Duration::from_secs(1), counting(&counter)),
            Err(SchedulerError::Stopped)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_triggers_are_refused() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc());
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(matches!(
            scheduler.add_job(ScheduledJob::new("spin", Trigger::Interval(Duration::ZERO), counting(&counter))),
            Err(RegistryError::InvalidJob { .. })
        ));

        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        assert!(matches!(
            handle.schedule_once("reminder", Duration::from_secs(u64::MAX), counting(&counter)),
            Err(SchedulerError::InvalidTrigger { .. })
        ));
        assert!(matches!(
            handle.schedule(ScheduledJob::new("spin", Trigger::Interval(Duration::ZERO), counting(&counter))),
            Err(SchedulerError::InvalidTrigger { .. })
        ));
        assert!(handle.job("spin").is_none());

        handle
            .schedule_once("reminder", Duration::from_secs(1), counting(&counter))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_one_shots_are_pruned() {
        let scheduler = Scheduler::new(Arc::new(DefaultClock), utc()).completed_retention(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let services = services(&scheduler);
        let handle = scheduler.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(services, token.clone()));

        let mut names = Vec::new();
        for secs in 1..=3 {
            names.push(
                handle
                    .schedule_once("reminder", Duration::from_secs(secs), counting(&counter))
                    .unwrap(),
            );
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        assert!(handle.job(&names[0]).is_none());
        for name in &names[1..] {
            assert_eq!(handle.job(name).unwrap().status, JobStatus::Completed);
        }
        assert_eq!(handle.jobs().len(), 2);

        token.cancel();
        task.await.unwrap();
    }
}
