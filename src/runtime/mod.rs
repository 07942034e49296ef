//! The container runtime as seen by the dashboard.
//!
//! [`RuntimeClient`] is the seam between the refresh machinery and the
//! engine. Every call is a single request; callers are expected to issue them
//! from background tasks.

pub mod decode;
pub mod docker;
#[cfg(test)]
pub mod fake;
pub mod lifecycle;
pub mod workload;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::metrics::counters::CounterSample;
use lifecycle::LifecycleOp;
use workload::WorkloadSnapshot;

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("cannot reach runtime at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("no such container: {0}")]
    NotFound(String),
    #[error("runtime error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed runtime response: {0}")]
    Decode(String),
}

impl RuntimeError {
    /// Errors a per-workload sub-fetch is expected to hit when a workload
    /// disappears between the list and the detail request.
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

pub trait RuntimeClient: Send + Sync {
    /// Human-readable address of the engine, shown in the header.
    fn endpoint(&self) -> &str;

    fn ping(&self) -> BoxFuture<'_, RuntimeResult<()>>;

    fn list_workloads(&self, running_only: bool) -> BoxFuture<'_, RuntimeResult<Vec<WorkloadSnapshot>>>;

    fn counter_sample<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<CounterSample>>;

    /// The last `tail_lines` lines of output, in the engine's wire format
    /// (framed, or raw for TTY workloads).
    fn log_bytes<'a>(&'a self, id: &'a str, tail_lines: usize) -> BoxFuture<'a, RuntimeResult<Vec<u8>>>;

    fn lifecycle<'a>(&'a self, id: &'a str, op: LifecycleOp) -> BoxFuture<'a, RuntimeResult<()>>;
}
