//! Background refresh cycles.
//!
//! A cycle lists workloads, fans out per-workload counter and log fetches,
//! pairs the new counters with the previous cycle's, and hands the result to
//! the UI loop through the [`Dispatcher`]. Cycles move through
//! `Idle -> Fetching -> Merging -> Dispatched -> Idle`; at most one is in
//! flight per orchestrator.
//!
//! A timer tick that finds a cycle in flight is dropped. An on-demand trigger
//! that finds one in flight sets a rerun flag instead, and the running cycle
//! loops exactly once more when it finishes, however many triggers arrived.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::event::{Dispatcher, Event};
use crate::logs;
use crate::logs::classify::ClassifiedLine;
use crate::metrics::counters::{CounterPair, CounterSample};
use crate::runtime::lifecycle::{LifecycleRequest, LifecycleResult};
use crate::runtime::workload::WorkloadSnapshot;
use crate::runtime::{RuntimeClient, RuntimeError, RuntimeResult};

const MIN_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub running_only: bool,
    pub log_tail_lines: usize,
    pub action_settle: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            running_only: false,
            log_tail_lines: 100,
            action_settle: Duration::from_millis(500),
            max_concurrent_fetches: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CycleState {
    Idle = 0,
    Fetching = 1,
    Merging = 2,
    Dispatched = 3,
}

impl CycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CycleState::Fetching,
            2 => CycleState::Merging,
            3 => CycleState::Dispatched,
            _ => CycleState::Idle,
        }
    }

    pub fn is_busy(self) -> bool {
        self != CycleState::Idle
    }
}

/// Which workload's logs the next cycles should fetch. Logs are only fetched
/// while `enabled` (the logs view is on screen).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFocus {
    pub workload: Option<String>,
    pub enabled: bool,
}

impl LogFocus {
    fn wants(&self, id: &str) -> bool {
        self.enabled && self.workload.as_deref() == Some(id)
    }
}

#[derive(Debug)]
pub struct RefreshReport {
    pub cycle: u64,
    /// Every listed workload. Running ones carry their counter pair when the
    /// sample could be fetched.
    pub workloads: Vec<WorkloadSnapshot>,
    /// Classified tail lines, keyed by workload id, for the log focus only.
    pub logs: HashMap<String, Vec<ClassifiedLine>>,
    /// Sub-fetches that failed this cycle.
    pub degraded: usize,
    pub fetched_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Updated(RefreshReport),
    Failed { cycle: u64, error: RuntimeError },
}

/// Result of one optional per-workload fetch.
enum SubFetch<T> {
    Fetched(T),
    Skipped,
    Failed(RuntimeError),
}

impl<T> From<RuntimeResult<T>> for SubFetch<T> {
    fn from(result: RuntimeResult<T>) -> Self {
        match result {
            Ok(value) => SubFetch::Fetched(value),
            Err(err) => SubFetch::Failed(err),
        }
    }
}

type Details = HashMap<String, (SubFetch<CounterSample>, SubFetch<Vec<u8>>)>;

struct Inner {
    client: Arc<dyn RuntimeClient>,
    dispatcher: Dispatcher,
    settings: RefreshSettings,
    state: AtomicU8,
    rerun: AtomicBool,
    cycles: AtomicU64,
    permits: Arc<Semaphore>,
    log_focus: Mutex<LogFocus>,
    /// Samples from the last cycle, for running workloads only.
    last_samples: Mutex<HashMap<String, CounterSample>>,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
}

impl RefreshOrchestrator {
    pub fn new(client: Arc<dyn RuntimeClient>, dispatcher: Dispatcher, settings: RefreshSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1)));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                client,
                dispatcher,
                settings,
                state: AtomicU8::new(CycleState::Idle as u8),
                rerun: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                permits,
                log_focus: Mutex::new(LogFocus::default()),
                last_samples: Mutex::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.inner.client.endpoint()
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: CycleState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    fn try_begin(&self) -> bool {
        self.inner
            .state
            .compare_exchange(
                CycleState::Idle as u8,
                CycleState::Fetching as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Requests a cycle now. Returns `true` if one was started; otherwise the
    /// cycle in flight will run once more when it finishes.
    pub fn force_refresh(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        if self.try_begin() {
            self.spawn_cycles();
            return true;
        }
        self.inner.rerun.store(true, Ordering::SeqCst);
        // The cycle in flight may have gone idle before it could see the flag.
        if self.try_begin() {
            self.inner.rerun.store(false, Ordering::SeqCst);
            self.spawn_cycles();
            return true;
        }
        debug!("refresh already in flight, rerun scheduled");
        false
    }

    /// Timer trigger. Dropped when a cycle is already in flight.
    pub fn tick(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        if self.try_begin() {
            self.spawn_cycles();
            true
        } else {
            debug!("refresh tick skipped, cycle in flight");
            false
        }
    }

    pub fn spawn_timer(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if this.is_shut_down() {
                            break;
                        }
                        this.tick();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("refresh timer stopped");
        })
    }

    fn focus(&self) -> MutexGuard<'_, LogFocus> {
        self.inner
            .log_focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log_focus(&self) -> LogFocus {
        self.focus().clone()
    }

    /// Points log fetching at `workload`. Returns `true` if that changed what
    /// the next cycle fetches.
    pub fn set_log_focus(&self, workload: Option<String>) -> bool {
        let mut focus = self.focus();
        if focus.workload == workload {
            return false;
        }
        focus.workload = workload;
        focus.enabled
    }

    pub fn set_logs_enabled(&self, enabled: bool) -> bool {
        let mut focus = self.focus();
        let changed = focus.enabled != enabled;
        focus.enabled = enabled;
        changed
    }

    /// Stops the timer. Cycles still in flight finish but their results are
    /// dropped, and no new cycle starts.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Runs a lifecycle action on a background task. The request is checked
    /// against its displayed status first; a refused request returns the
    /// message to show and calls nothing.
    pub fn run_action(&self, request: LifecycleRequest) -> Result<(), String> {
        request.validate()?;

        let this = self.clone();
        tokio::spawn(async move {
            let LifecycleRequest { id, name, op, .. } = request;
            info!(%id, %name, op = op.verb(), "lifecycle action");

            let result = match this.inner.client.lifecycle(&id, op).await {
                Ok(()) => LifecycleResult::Done { op, name },
                Err(err) => {
                    warn!(%id, op = op.verb(), error = %err, "lifecycle action failed");
                    LifecycleResult::Failed {
                        op,
                        name,
                        error: err.to_string(),
                    }
                }
            };
            let succeeded = result.is_success();

            if this.is_shut_down() {
                return;
            }
            this.inner.dispatcher.queue_update(Event::Lifecycle(result));

            if succeeded {
                tokio::time::sleep(this.inner.settings.action_settle).await;
                this.force_refresh();
            }
        });
        Ok(())
    }

    /// One collection pass outside the state machine, for headless use.
    /// Counters are paired with the previous call's, so CPU figures need two
    /// calls.
    pub async fn collect_once(&self) -> RuntimeResult<RefreshReport> {
        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.collect(cycle, Instant::now()).await
    }

    fn spawn_cycles(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.run_cycles().await });
    }

    /// Entered in `Fetching`. Runs cycles until no rerun is pending.
    async fn run_cycles(self) {
        loop {
            self.cycle().await;
            self.set_state(CycleState::Idle);
            if self.is_shut_down() || !self.inner.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
            if !self.try_begin() {
                break;
            }
        }
    }

    async fn cycle(&self) {
        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        debug!(cycle, "refresh cycle started");

        let outcome = match self.collect(cycle, started).await {
            Ok(report) => {
                debug!(
                    cycle,
                    workloads = report.workloads.len(),
                    degraded = report.degraded,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "refresh cycle merged"
                );
                RefreshOutcome::Updated(report)
            }
            Err(error) => {
                warn!(cycle, %error, "workload list failed");
                RefreshOutcome::Failed { cycle, error }
            }
        };

        if self.is_shut_down() {
            debug!(cycle, "dropping refresh result after shutdown");
            return;
        }
        self.set_state(CycleState::Dispatched);
        if !self.inner.dispatcher.queue_update(Event::Refresh(outcome)) {
            debug!(cycle, "ui loop gone, refresh result dropped");
        }
    }

    async fn collect(&self, cycle: u64, started: Instant) -> RuntimeResult<RefreshReport> {
        let workloads = self
            .inner
            .client
            .list_workloads(self.inner.settings.running_only)
            .await?;

        let focus = self.log_focus();
        let details = self.fetch_details(&workloads, &focus).await;

        if self.state() == CycleState::Fetching {
            self.set_state(CycleState::Merging);
        }
        Ok(self.merge(cycle, workloads, details, started))
    }

    /// Counter samples for running workloads and logs for the focused one,
    /// fetched concurrently under the fetch semaphore. Returns once every
    /// sub-fetch has settled.
    async fn fetch_details(&self, workloads: &[WorkloadSnapshot], focus: &LogFocus) -> Details {
        let mut tasks = JoinSet::new();
        for workload in workloads {
            let want_counters = workload.status.is_running();
            let want_logs = focus.wants(&workload.id);
            if !want_counters && !want_logs {
                continue;
            }

            let client = Arc::clone(&self.inner.client);
            let permits = Arc::clone(&self.inner.permits);
            let id = workload.id.clone();
            let tail = self.inner.settings.log_tail_lines;
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (id, SubFetch::Skipped, SubFetch::Skipped);
                };
                let counters = if want_counters {
                    SubFetch::from(client.counter_sample(&id).await)
                } else {
                    SubFetch::Skipped
                };
                let logs = if want_logs {
                    SubFetch::from(client.log_bytes(&id, tail).await)
                } else {
                    SubFetch::Skipped
                };
                (id, counters, logs)
            });
        }

        let mut details = HashMap::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, counters, logs)) => {
                    details.insert(id, (counters, logs));
                }
                Err(err) => warn!(error = %err, "sub-fetch task aborted"),
            }
        }
        details
    }

    fn merge(
        &self,
        cycle: u64,
        mut workloads: Vec<WorkloadSnapshot>,
        mut details: Details,
        started: Instant,
    ) -> RefreshReport {
        let mut last = self
            .inner
            .last_samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next_samples = HashMap::with_capacity(last.len());
        let mut logs = HashMap::new();
        let mut degraded = 0;

        for workload in &mut workloads {
            let Some((counters, log_bytes)) = details.remove(&workload.id) else {
                continue;
            };

            match counters {
                SubFetch::Fetched(sample) => {
                    let previous = last.remove(&workload.id);
                    next_samples.insert(workload.id.clone(), sample.clone());
                    workload.counters = Some(CounterPair {
                        previous,
                        current: sample,
                    });
                }
                SubFetch::Failed(err) => {
                    degraded += 1;
                    log_sub_fetch_failure(&workload.id, "counters", &err);
                    // Keep the older sample so the next success still has a baseline.
                    if let Some(previous) = last.remove(&workload.id) {
                        next_samples.insert(workload.id.clone(), previous);
                    }
                }
                SubFetch::Skipped => {}
            }

            match log_bytes {
                SubFetch::Fetched(bytes) => {
                    logs.insert(workload.id.clone(), logs::decode(&bytes));
                }
                SubFetch::Failed(err) => {
                    degraded += 1;
                    log_sub_fetch_failure(&workload.id, "logs", &err);
                }
                SubFetch::Skipped => {}
            }
        }
        *last = next_samples;

        RefreshReport {
            cycle,
            workloads,
            logs,
            degraded,
            fetched_at: Utc::now(),
            elapsed: started.elapsed(),
        }
    }
}

fn log_sub_fetch_failure(id: &str, what: &str, err: &RuntimeError) {
    if err.is_transient() {
        debug!(id, what, error = %err, "sub-fetch skipped");
    } else {
        warn!(id, what, error = %err, "sub-fetch failed");
    }
}
