//! [`RuntimeClient`] backed by the Docker Engine API via bollard.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, join_all};
use futures::StreamExt;
use tracing::{debug, warn};

use super::decode;
use super::lifecycle::LifecycleOp;
use super::workload::{WorkloadSnapshot, WorkloadStatus};
use super::{RuntimeClient, RuntimeError, RuntimeResult};
use crate::config::RuntimeConfig;
use crate::logs::demux::{StreamKind, encode_frame};
use crate::metrics::counters::CounterSample;

#[cfg(unix)]
const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";
#[cfg(not(unix))]
const DEFAULT_ENDPOINT: &str = "npipe:////./pipe/docker_engine";

pub struct DockerClient {
    docker: Docker,
    endpoint: String,
    stop_timeout: i32,
    /// `State.StartedAt` per workload, keyed by id and remembered together
    /// with the status it was read under.
    started: Mutex<HashMap<String, (WorkloadStatus, DateTime<Utc>)>>,
}

impl DockerClient {
    /// Builds a client for `config.docker_host`, or the local defaults
    /// (which honour `DOCKER_HOST`) when it is empty. No request is made.
    pub fn connect(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let host = config.docker_host.trim();
        let timeout = config.connect_timeout_secs;

        let (connected, endpoint) = if host.is_empty() {
            let endpoint =
                std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
            let connected = Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(timeout)));
            (connected, endpoint)
        } else if let Some(path) = host.strip_prefix("unix://") {
            (
                Docker::connect_with_socket(path, timeout, API_DEFAULT_VERSION),
                host.to_string(),
            )
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            (
                Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION),
                host.to_string(),
            )
        } else {
            return Err(RuntimeError::Unreachable {
                endpoint: host.to_string(),
                reason: "unsupported scheme, expected unix://, tcp:// or http://".to_string(),
            });
        };

        let docker = connected.map_err(|err| RuntimeError::Unreachable {
            endpoint: endpoint.clone(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            docker,
            endpoint,
            stop_timeout: i32::try_from(config.stop_timeout_secs).unwrap_or(i32::MAX),
            started: Mutex::new(HashMap::new()),
        })
    }

    fn map_error(&self, id: Option<&str>, err: BollardError) -> RuntimeError {
        map_error(&self.endpoint, id, err)
    }

    async fn list(&self, running_only: bool) -> RuntimeResult<Vec<WorkloadSnapshot>> {
        let options = ListContainersOptions {
            all: !running_only,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| self.map_error(None, err))?;

        let mut workloads = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let value = serde_json::to_value(&summary)
                .map_err(|err| RuntimeError::Decode(err.to_string()))?;
            match decode::workload_from_value(value) {
                Some(workload) => workloads.push(workload),
                None => warn!("skipping container summary without an id"),
            }
        }

        self.fill_started_at(&mut workloads).await;
        Ok(workloads)
    }

    /// Start times are not part of the list response. They are read with one
    /// inspect per workload and cached until the workload's status changes.
    async fn fill_started_at(&self, workloads: &mut [WorkloadSnapshot]) {
        let missing: Vec<(String, WorkloadStatus)> = {
            let cache = self.started.lock().unwrap_or_else(PoisonError::into_inner);
            workloads
                .iter()
                .filter(|w| has_started(w))
                .filter(|w| !matches!(cache.get(&w.id), Some((status, _)) if *status == w.status))
                .map(|w| (w.id.clone(), w.status))
                .collect()
        };

        let fetched = join_all(missing.into_iter().map(|(id, status)| async move {
            let started = self.inspect_started_at(&id).await;
            (id, status, started)
        }))
        .await;

        let mut cache = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|id, _| workloads.iter().any(|w| &w.id == id && has_started(w)));
        for (id, status, started) in fetched {
            if let Some(started) = started {
                cache.insert(id, (status, started));
            }
        }
        for workload in workloads.iter_mut() {
            workload.started_at = cache.get(&workload.id).map(|(_, started)| *started);
        }
    }

    async fn inspect_started_at(&self, id: &str) -> Option<DateTime<Utc>> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => serde_json::to_value(&inspect)
                .ok()
                .and_then(|value| decode::started_at_from_inspect(&value)),
            Err(err) => {
                debug!(id, error = %err, "inspect failed");
                None
            }
        }
    }

    async fn stats(&self, id: &str) -> RuntimeResult<CounterSample> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut stream = pin!(self.docker.stats(id, Some(options)));
        let stats = stream
            .next()
            .await
            .ok_or_else(|| RuntimeError::Decode(format!("empty stats response for {id}")))?
            .map_err(|err| self.map_error(Some(id), err))?;

        let value =
            serde_json::to_value(&stats).map_err(|err| RuntimeError::Decode(err.to_string()))?;
        let mut sample = decode::sample_from_value(value);
        if sample.read_at.is_none() {
            sample.read_at = Some(Utc::now());
        }
        Ok(sample)
    }

    /// Re-frames the chunks bollard has already split so the caller sees the
    /// engine's wire format. TTY output arrives as console chunks and stays
    /// unframed.
    async fn logs(&self, id: &str, tail_lines: usize) -> RuntimeResult<Vec<u8>> {
        let options = LogsOptions {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: tail_lines.to_string(),
            ..Default::default()
        };
        let mut stream = pin!(self.docker.logs(id, Some(options)));

        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|err| self.map_error(Some(id), err))? {
                LogOutput::StdOut { message } => encode_frame(StreamKind::Stdout, &message, &mut out),
                LogOutput::StdErr { message } => encode_frame(StreamKind::Stderr, &message, &mut out),
                LogOutput::StdIn { message } => encode_frame(StreamKind::Stdin, &message, &mut out),
                LogOutput::Console { message } => out.extend_from_slice(&message),
            }
        }
        Ok(out)
    }

    async fn run_lifecycle(&self, id: &str, op: LifecycleOp) -> RuntimeResult<()> {
        let result = match op {
            LifecycleOp::Start => {
                self.docker
                    .start_container(id, None::<StartContainerOptions>)
                    .await
            }
            LifecycleOp::Stop => {
                let options = StopContainerOptions {
                    t: Some(self.stop_timeout),
                    ..Default::default()
                };
                self.docker.stop_container(id, Some(options)).await
            }
            LifecycleOp::Restart => {
                let options = RestartContainerOptions {
                    t: Some(self.stop_timeout),
                    ..Default::default()
                };
                self.docker.restart_container(id, Some(options)).await
            }
            LifecycleOp::Pause => self.docker.pause_container(id).await,
            LifecycleOp::Unpause => self.docker.unpause_container(id).await,
            LifecycleOp::Remove { force } => {
                let options = RemoveContainerOptions {
                    force,
                    ..Default::default()
                };
                self.docker.remove_container(id, Some(options)).await
            }
        };
        result.map_err(|err| self.map_error(Some(id), err))?;

        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}

impl RuntimeClient for DockerClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ping(&self) -> BoxFuture<'_, RuntimeResult<()>> {
        async move {
            self.docker
                .ping()
                .await
                .map(|_| ())
                .map_err(|err| self.map_error(None, err))
        }
        .boxed()
    }

    fn list_workloads(&self, running_only: bool) -> BoxFuture<'_, RuntimeResult<Vec<WorkloadSnapshot>>> {
        self.list(running_only).boxed()
    }

    fn counter_sample<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<CounterSample>> {
        self.stats(id).boxed()
    }

    fn log_bytes<'a>(&'a self, id: &'a str, tail_lines: usize) -> BoxFuture<'a, RuntimeResult<Vec<u8>>> {
        self.logs(id, tail_lines).boxed()
    }

    fn lifecycle<'a>(&'a self, id: &'a str, op: LifecycleOp) -> BoxFuture<'a, RuntimeResult<()>> {
        self.run_lifecycle(id, op).boxed()
    }
}

fn has_started(workload: &WorkloadSnapshot) -> bool {
    matches!(
        workload.status,
        WorkloadStatus::Running | WorkloadStatus::Paused
    )
}

fn map_error(endpoint: &str, id: Option<&str>, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(id.map_or(message, str::to_string)),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api {
            status: status_code,
            message,
        },
        BollardError::JsonSerdeError { .. } => RuntimeError::Decode(err.to_string()),
        other => RuntimeError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_workload() {
        let err = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        };
        match map_error("unix:///var/run/docker.sock", Some("abc"), err) {
            RuntimeError::NotFound(id) => assert_eq!(id, "abc"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_status_codes_are_api_errors() {
        let err = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "container is not running".to_string(),
        };
        let mapped = map_error("tcp://host:2375", Some("abc"), err);
        assert_eq!(
            mapped.to_string(),
            "runtime error (409): container is not running"
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let config = RuntimeConfig {
            docker_host: "ssh://user@host".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            DockerClient::connect(&config),
            Err(RuntimeError::Unreachable { .. })
        ));
    }
}
