//! Scripted in-memory [`RuntimeClient`] for exercising the refresh machinery
//! without an engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;

use super::lifecycle::LifecycleOp;
use super::workload::WorkloadSnapshot;
use super::{RuntimeClient, RuntimeError, RuntimeResult};
use crate::metrics::counters::CounterSample;

const RELEASE_ALL_PERMITS: usize = 1024;

#[derive(Default)]
struct FakeState {
    workloads: Vec<WorkloadSnapshot>,
    samples: HashMap<String, CounterSample>,
    logs: HashMap<String, Vec<u8>>,
    list_error: Option<RuntimeError>,
    failing_samples: HashSet<String>,
    failing_logs: HashSet<String>,
    action_error: Option<RuntimeError>,
    actions: Vec<(String, LifecycleOp)>,
    sampled: Vec<String>,
    logged: Vec<String>,
}

pub struct FakeClient {
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
}

impl FakeClient {
    pub fn new(workloads: Vec<WorkloadSnapshot>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                workloads,
                ..FakeState::default()
            }),
            list_calls: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_workloads(&self, workloads: Vec<WorkloadSnapshot>) {
        self.state().workloads = workloads;
    }

    pub fn set_sample(&self, id: &str, sample: CounterSample) {
        self.state().samples.insert(id.to_string(), sample);
    }

    pub fn set_logs(&self, id: &str, bytes: Vec<u8>) {
        self.state().logs.insert(id.to_string(), bytes);
    }

    pub fn fail_list(&self, error: Option<RuntimeError>) {
        self.state().list_error = error;
    }

    pub fn fail_sample(&self, id: &str) {
        self.state().failing_samples.insert(id.to_string());
    }

    pub fn fail_logs(&self, id: &str) {
        self.state().failing_logs.insert(id.to_string());
    }

    pub fn fail_actions(&self, error: Option<RuntimeError>) {
        self.state().action_error = error;
    }

    /// Makes every later list call wait for [`FakeClient::release_list`].
    pub fn hold_lists(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Lets one held list call proceed.
    pub fn release_list(&self) {
        self.gate.add_permits(1);
    }

    /// Stops holding list calls and releases any that are waiting.
    pub fn release_all(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(RELEASE_ALL_PERMITS);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<(String, LifecycleOp)> {
        self.state().actions.clone()
    }

    /// Ids whose counters were requested, in call order.
    pub fn sampled(&self) -> Vec<String> {
        self.state().sampled.clone()
    }

    /// Ids whose logs were requested, in call order.
    pub fn logged(&self) -> Vec<String> {
        self.state().logged.clone()
    }

    async fn list(&self, running_only: bool) -> RuntimeResult<Vec<WorkloadSnapshot>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|err| RuntimeError::Decode(err.to_string()))?;
            permit.forget();
        }

        let state = self.state();
        if let Some(err) = &state.list_error {
            return Err(err.clone());
        }
        Ok(state
            .workloads
            .iter()
            .filter(|w| !running_only || w.status.is_running())
            .cloned()
            .collect())
    }
}

fn missing(id: &str) -> RuntimeError {
    RuntimeError::NotFound(id.to_string())
}

impl RuntimeClient for FakeClient {
    fn endpoint(&self) -> &str {
        "fake://"
    }

    fn ping(&self) -> BoxFuture<'_, RuntimeResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn list_workloads(&self, running_only: bool) -> BoxFuture<'_, RuntimeResult<Vec<WorkloadSnapshot>>> {
        self.list(running_only).boxed()
    }

    fn counter_sample<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<CounterSample>> {
        async move {
            let mut state = self.state();
            state.sampled.push(id.to_string());
            if state.failing_samples.contains(id) {
                return Err(missing(id));
            }
            state.samples.get(id).cloned().ok_or_else(|| missing(id))
        }
        .boxed()
    }

    fn log_bytes<'a>(&'a self, id: &'a str, _tail_lines: usize) -> BoxFuture<'a, RuntimeResult<Vec<u8>>> {
        async move {
            let mut state = self.state();
            state.logged.push(id.to_string());
            if state.failing_logs.contains(id) {
                return Err(missing(id));
            }
            Ok(state.logs.get(id).cloned().unwrap_or_default())
        }
        .boxed()
    }

    fn lifecycle<'a>(&'a self, id: &'a str, op: LifecycleOp) -> BoxFuture<'a, RuntimeResult<()>> {
        async move {
            let mut state = self.state();
            state.actions.push((id.to_string(), op));
            match &state.action_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
        .boxed()
    }
}
