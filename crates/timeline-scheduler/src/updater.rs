use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use timeline_core::{check_version_order, OrderWarning, StartTrigger, TimelineConfig, Variant};
use timeline_targets::UpdateTarget;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    progress::ProgressStore,
    queue::UpdateQueue,
    timers::Scheduler,
    types::{Schedule, TimerId},
};

/// Timer payloads. Timers only ever enqueue work; they never apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// The start trigger: first update plus the recurring timer.
    Start,
    /// One recurring update.
    Update,
}

/// Lifecycle of an [`Updater`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    /// Constructed, `initialize` not called yet.
    Idle,
    /// Waiting for the daily start time.
    AwaitingStart,
    /// Interval timer active, variants left to apply.
    Running,
    /// Every variant applied (or none to apply).
    Finished,
}

/// Timing settings taken from `[updater]`.
#[derive(Debug, Clone, Copy)]
pub struct UpdaterSettings {
    pub interval_minutes: u64,
    pub start: StartTrigger,
}

impl UpdaterSettings {
    pub fn from_config(config: &TimelineConfig) -> Result<Self> {
        Ok(Self {
            interval_minutes: config.updater.interval,
            start: config.start_trigger()?,
        })
    }
}

/// Registered timers plus the handle of the recurring update timer.
struct Timers {
    scheduler: Scheduler<Tick>,
    interval: Option<TimerId>,
}

/// State shared between the timer side and the update worker.
struct Shared {
    variants: Vec<Variant>,
    targets: Vec<Box<dyn UpdateTarget>>,
    progress: ProgressStore,
    /// Written only by the worker, after the progress file.
    next_index: AtomicUsize,
    timers: Mutex<Timers>,
    /// First error that stopped the timeline; handed back by `finish`.
    fatal: Mutex<Option<SchedulerError>>,
}

impl Shared {
    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fatal(&self) -> MutexGuard<'_, Option<SchedulerError>> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_finished(&self) -> bool {
        self.next_index.load(Ordering::SeqCst) >= self.variants.len()
    }

    fn is_stopped(&self) -> bool {
        self.fatal().is_some()
    }

    /// Queue entry point. Target failures go back to the queue to be logged
    /// and retried; fatal errors stop the timeline.
    async fn update_job(&self) -> Result<()> {
        match self.apply_next().await {
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Stopping timeline, progress could not be recorded");
                self.timers().scheduler.clear();
                self.fatal().get_or_insert(e);
                Ok(())
            }
            other => other,
        }
    }

    /// One update job. Runs on the queue worker only.
    async fn apply_next(&self) -> Result<()> {
        if self.is_stopped() {
            debug!("timeline stopped, ignoring queued update");
            return Ok(());
        }
        let index = self.next_index.load(Ordering::SeqCst);
        let Some(variant) = self.variants.get(index) else {
            debug!("timeline already finished, ignoring queued update");
            return Ok(());
        };
        info!("Updating to {}", variant);

        for target in &self.targets {
            debug!(target = target.name(), index, "applying variant");
            target
                .update_variant(variant)
                .await
                .map_err(|source| SchedulerError::Target {
                    target: target.name().to_string(),
                    index,
                    source,
                })?;
        }

        self.progress.save(index)?;
        self.next_index.store(index + 1, Ordering::SeqCst);

        let mut timers = self.timers();
        match self.variants.get(index + 1) {
            None => {
                info!("Last update finished");
                if let Some(id) = timers.interval.take() {
                    timers.scheduler.cancel(id);
                }
            }
            Some(next) => match timers.scheduler.next_run() {
                Some(at) => info!(
                    "Next update at {} to {}",
                    at.format("%Y-%m-%d %H:%M:%S"),
                    next
                ),
                None => info!("Next update to {} is not scheduled", next),
            },
        }
        Ok(())
    }
}

/// Drives the server through its timeline.
///
/// The caller owns the clock: [`Updater::run`] polls the timers, while tests
/// can call [`Updater::initialize_at`] and [`Updater::dispatch_due`] with
/// explicit instants.
pub struct Updater {
    shared: Arc<Shared>,
    settings: UpdaterSettings,
    queue: UpdateQueue,
    state: UpdaterState,
    order_warnings: Vec<OrderWarning>,
}

impl Updater {
    /// Build the updater and load saved progress. Must run inside a Tokio
    /// runtime (the update worker is spawned here).
    pub fn new(
        variants: Vec<Variant>,
        targets: Vec<Box<dyn UpdateTarget>>,
        progress: ProgressStore,
        settings: UpdaterSettings,
    ) -> Result<Self> {
        let order_warnings = check_version_order(&variants);
        let next_index = progress.load()?;

        Ok(Self {
            shared: Arc::new(Shared {
                variants,
                targets,
                progress,
                next_index: AtomicUsize::new(next_index),
                timers: Mutex::new(Timers {
                    scheduler: Scheduler::new(),
                    interval: None,
                }),
                fatal: Mutex::new(None),
            }),
            settings,
            queue: UpdateQueue::new(),
            state: UpdaterState::Idle,
            order_warnings,
        })
    }

    pub fn variants(&self) -> &[Variant] {
        &self.shared.variants
    }

    /// Warnings raised by the version order check at construction.
    pub fn order_warnings(&self) -> &[OrderWarning] {
        &self.order_warnings
    }

    pub fn next_index(&self) -> usize {
        self.shared.next_index.load(Ordering::SeqCst)
    }

    pub fn next_variant(&self) -> Option<&Variant> {
        self.shared.variants.get(self.next_index())
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    pub fn state(&self) -> UpdaterState {
        if self.state != UpdaterState::Idle && self.is_finished() {
            UpdaterState::Finished
        } else {
            self.state
        }
    }

    pub fn has_timers(&self) -> bool {
        !self.shared.timers().scheduler.is_empty()
    }

    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.shared.timers().scheduler.next_run()
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.initialize_at(Local::now())
    }

    /// Schedule the start of the timeline relative to `now`.
    pub fn initialize_at(&mut self, now: DateTime<Local>) -> Result<()> {
        if self.is_finished() {
            info!("Last update already finished, nothing to schedule");
            self.state = UpdaterState::Finished;
            self.shared.progress.clear()?;
            return Ok(());
        }

        let interval = self.settings.interval_minutes;
        match self.settings.start {
            StartTrigger::Now => {
                info!("Scheduling start now, afterwards every {} minutes", interval);
                let mut timers = self.shared.timers();
                self.first_job(&mut timers, now);
                self.state = UpdaterState::Running;
            }
            StartTrigger::Daily(at) => {
                info!(
                    "Scheduling start at {}, afterwards every {} minutes",
                    at.format("%H:%M:%S"),
                    interval
                );
                self.shared.timers().scheduler.add(
                    Schedule::Daily { at },
                    Tick::Start,
                    Some(1),
                    now,
                );
                self.state = UpdaterState::AwaitingStart;
            }
        }
        Ok(())
    }

    /// Fire every timer due at `now`. Only enqueues; never waits on a job.
    pub fn dispatch_due(&mut self, now: DateTime<Local>) {
        let mut timers = self.shared.timers();
        for tick in timers.scheduler.run_pending(now) {
            match tick {
                Tick::Start => {
                    self.first_job(&mut timers, now);
                    self.state = UpdaterState::Running;
                }
                Tick::Update => self.enqueue_update(),
            }
        }
    }

    /// Enqueue the first update right away, then register the recurring
    /// timer. Called with the scheduler locked so a worker that finishes the
    /// timeline in between cannot miss the new timer when clearing.
    fn first_job(&self, timers: &mut Timers, now: DateTime<Local>) {
        debug!("running first update");
        self.enqueue_update();

        let interval = self.settings.interval_minutes;
        debug!("scheduling future updates every {} minutes", interval);
        timers.interval =
            timers
                .scheduler
                .add(Schedule::every_minutes(interval), Tick::Update, None, now);
        if timers.interval.is_none() {
            warn!(interval, "update interval is out of range, no further updates scheduled");
        }
    }

    fn enqueue_update(&self) {
        let shared = Arc::clone(&self.shared);
        self.queue
            .enqueue(move || async move { shared.update_job().await });
    }

    /// Wait until every update enqueued so far has run.
    pub async fn wait_for_idle(&self) {
        self.queue.wait_for_drain().await;
    }

    /// Wait for queued jobs, then forget saved progress if the timeline is
    /// complete. Called once no timers remain. Returns the error that
    /// stopped the timeline, if any.
    pub async fn finish(&mut self) -> Result<()> {
        self.queue.wait_for_drain().await;
        if let Some(e) = self.shared.fatal().take() {
            return Err(e);
        }
        if !self.is_finished() {
            return Ok(());
        }
        if self.state != UpdaterState::Finished {
            self.shared.progress.clear()?;
            self.state = UpdaterState::Finished;
        }
        Ok(())
    }

    /// Main loop: initialize, then poll timers every `poll_interval` until
    /// none are left. `poll_interval` must be non-zero.
    pub async fn run(&mut self, poll_interval: Duration) -> Result<()> {
        self.initialize()?;

        let mut interval = tokio::time::interval(poll_interval);
        while self.has_timers() {
            interval.tick().await;
            self.dispatch_due(Local::now());
        }

        debug!("no timers left, waiting for queued updates");
        self.finish().await
    }
}
