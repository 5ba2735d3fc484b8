//! Debounced, backoff-aware job scheduler.
//!
//! Two layers:
//! - [`Scheduler`]: the state machine. Pure; every transition takes `now`.
//! - [`SchedulerHandle`]: an actor task owning a [`Scheduler`], fed over an
//!   mpsc channel, that runs flushes through a [`JobRunner`] and enqueues a
//!   full poll on a fixed interval.
//!
//! ```text
//! Idle ──enqueue──> Debouncing ──deadline──> Flushing ──ok──> Idle
//!                        ^                      │
//!                        └──────deadline── BackoffWait <──err─┘
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::storage::SyncConfig;
use crate::sync::types::SyncJob;

/// Longest wait any scheduler timer is armed for.
pub const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `now + wait`, with the wait clamped to [`MAX_WAIT`].
fn deadline_after(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait.min(MAX_WAIT)).unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Debouncing,
    Flushing,
    BackoffWait,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Debouncing => "debouncing",
            SchedulerState::Flushing => "flushing",
            SchedulerState::BackoffWait => "backoff_wait",
        };
        f.write_str(s)
    }
}

/// Exponential backoff between failed flushes.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap,
            current: floor,
            failures: 0,
        }
    }

    /// Record a failure and return the wait before retrying:
    /// `min(floor * 2^failures, cap)`.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.cap);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
        self.failures = 0;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Point-in-time view of the scheduler, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub pending: Vec<String>,
    pub backoff_ms: u64,
    pub consecutive_failures: u32,
    pub stopped: bool,
}

/// The scheduling state machine.
#[derive(Debug)]
pub struct Scheduler {
    state: SchedulerState,
    pending: IndexSet<SyncJob>,
    debounce: Duration,
    backoff: Backoff,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl Scheduler {
    pub fn new(debounce: Duration, backoff: Backoff) -> Self {
        Self {
            state: SchedulerState::Idle,
            pending: IndexSet::new(),
            debounce,
            backoff,
            deadline: None,
            in_flight: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pending(&self) -> impl Iterator<Item = &SyncJob> {
        self.pending.iter()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Add a job and (re)start the debounce window.
    ///
    /// While a flush runs the job only waits in the pending set; during a
    /// backoff wait it joins the retry without moving the retry deadline.
    pub fn enqueue(&mut self, job: SyncJob, now: Instant) {
        self.pending.insert(job);
        match self.state {
            SchedulerState::Idle | SchedulerState::Debouncing => {
                self.state = SchedulerState::Debouncing;
                self.deadline = Some(deadline_after(now, self.debounce));
            }
            SchedulerState::Flushing => {
                self.deadline = Some(deadline_after(now, self.debounce));
            }
            SchedulerState::BackoffWait => {}
        }
    }

    /// When the next flush may start, if one is due at all.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.in_flight || self.pending.is_empty() {
            return None;
        }
        self.deadline
    }

    /// Drain the pending set into a batch if the deadline has passed and no
    /// flush is running. The set is cleared before any I/O starts.
    pub fn begin_flush(&mut self, now: Instant) -> Option<Vec<SyncJob>> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => {}
            _ => return None,
        }
        let batch: Vec<SyncJob> = self.pending.drain(..).collect();
        self.in_flight = true;
        self.deadline = None;
        self.state = SchedulerState::Flushing;
        Some(batch)
    }

    /// Complete the in-flight flush.
    ///
    /// On failure every job of the batch goes back into the pending set and
    /// the returned wait is the backoff before the retry.
    pub fn finish_flush(&mut self, batch: Vec<SyncJob>, ok: bool, now: Instant) -> Option<Duration> {
        self.in_flight = false;

        if ok {
            self.backoff.reset();
            if self.pending.is_empty() {
                self.state = SchedulerState::Idle;
                self.deadline = None;
            } else {
                self.state = SchedulerState::Debouncing;
                let debounced = deadline_after(now, self.debounce);
                self.deadline = Some(self.deadline.unwrap_or(debounced));
            }
            return None;
        }

        let mut retry: IndexSet<SyncJob> = batch.into_iter().collect();
        retry.extend(self.pending.drain(..));
        self.pending = retry;

        let wait = self.backoff.fail();
        self.state = SchedulerState::BackoffWait;
        self.deadline = Some(deadline_after(now, wait));
        Some(wait)
    }

    pub fn status(&self, stopped: bool) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            pending: self.pending.iter().map(|j| j.key().to_string()).collect(),
            backoff_ms: self.backoff.current().as_millis() as u64,
            consecutive_failures: self.backoff.failures(),
            stopped,
        }
    }
}

/// Executes one job of a flush.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: &SyncJob) -> Result<()>;
}

/// Timings for the scheduler driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub backoff_floor: Duration,
    pub backoff_cap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: config.debounce(),
            poll_interval: config.poll_interval(),
            backoff_floor: Duration::from_millis(config.backoff_floor_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }
}

enum Command {
    Enqueue(SyncJob),
    Stop,
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SchedulerStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Spawn the driver on the current tokio runtime.
    pub fn spawn(config: SchedulerConfig, runner: Arc<dyn JobRunner>) -> Self {
        let scheduler = Scheduler::new(
            config.debounce,
            Backoff::new(config.backoff_floor, config.backoff_cap),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(scheduler.status(false));

        let driver = Driver {
            scheduler,
            runner,
            rx,
            status_tx,
            poll_interval: config.poll_interval,
        };
        let task = tokio::spawn(driver.run());

        Self {
            tx,
            status,
            task: Mutex::new(Some(task)),
        }
    }

    /// Fire-and-forget. Ignored once the scheduler has stopped.
    pub fn enqueue(&self, job: SyncJob) {
        if self.tx.send(Command::Enqueue(job)).is_err() {
            tracing::debug!("Scheduler stopped; dropping job");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// Cancel the poll timer and any pending debounce. A flush already
    /// running completes.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Stop and wait for the driver task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Scheduler task failed");
            }
        }
    }
}

type Flush = (Vec<SyncJob>, JoinHandle<bool>);

struct Driver {
    scheduler: Scheduler,
    runner: Arc<dyn JobRunner>,
    rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<SchedulerStatus>,
    poll_interval: Duration,
}

impl Driver {
    async fn run(mut self) {
        let period = self.poll_interval.clamp(Duration::from_millis(1), MAX_WAIT);
        let mut poll = tokio::time::interval_at(deadline_after(Instant::now(), period), period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush: Option<Flush> = None;
        let mut stopping = false;

        tracing::info!(poll_secs = self.poll_interval.as_secs(), "Sync scheduler starting");

        loop {
            if !stopping && flush.is_none() {
                if let Some(batch) = self.scheduler.begin_flush(Instant::now()) {
                    tracing::debug!(jobs = batch.len(), "Flushing sync jobs");
                    let runner = self.runner.clone();
                    let handle = tokio::spawn(run_batch(runner, batch.clone()));
                    flush = Some((batch, handle));
                }
            }
            self.status_tx.send_replace(self.scheduler.status(stopping));

            if stopping && flush.is_none() {
                break;
            }

            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                cmd = self.rx.recv(), if !stopping => match cmd {
                    Some(Command::Enqueue(job)) => self.scheduler.enqueue(job, Instant::now()),
                    Some(Command::Stop) | None => {
                        tracing::info!("Sync scheduler stopping");
                        stopping = true;
                    }
                },
                _ = poll.tick(), if !stopping => {
                    self.scheduler.enqueue(SyncJob::FullPoll, Instant::now());
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && flush.is_none() && !stopping => {}
                ok = join_flush(&mut flush) => {
                    if let Some((batch, _)) = flush.take() {
                        if let Some(wait) = self.scheduler.finish_flush(batch, ok, Instant::now()) {
                            tracing::error!(
                                backoff_ms = wait.as_millis() as u64,
                                failures = self.scheduler.backoff().failures(),
                                "Sync flush failed; retrying after backoff"
                            );
                        }
                    }
                }
            }
        }

        self.status_tx.send_replace(self.scheduler.status(true));
        tracing::info!("Sync scheduler stopped");
    }
}

/// Run a batch sequentially. Every job runs even after a failure; the
/// batch fails if any job did.
async fn run_batch(runner: Arc<dyn JobRunner>, batch: Vec<SyncJob>) -> bool {
    let mut ok = true;
    for job in &batch {
        if let Err(e) = runner.run(job).await {
            tracing::warn!(job = %job, error = %e, "Sync job failed");
            ok = false;
        }
    }
    ok
}

async fn join_flush(flush: &mut Option<Flush>) -> bool {
    match flush {
        Some((_, handle)) => match handle.await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(error = %e, "Sync flush task panicked");
                false
            }
        },
        None => std::future::pending().await,
    }
}
