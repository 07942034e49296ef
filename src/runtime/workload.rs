use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::counters::CounterPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Running,
    Exited,
    Paused,
    Created,
    Restarting,
    Removing,
    Dead,
    Unknown,
}

impl WorkloadStatus {
    pub fn from_state(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" => WorkloadStatus::Running,
            "exited" => WorkloadStatus::Exited,
            "paused" => WorkloadStatus::Paused,
            "created" => WorkloadStatus::Created,
            "restarting" => WorkloadStatus::Restarting,
            "removing" => WorkloadStatus::Removing,
            "dead" => WorkloadStatus::Dead,
            _ => WorkloadStatus::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkloadStatus::Running => "running",
            WorkloadStatus::Exited => "exited",
            WorkloadStatus::Paused => "paused",
            WorkloadStatus::Created => "created",
            WorkloadStatus::Restarting => "restarting",
            WorkloadStatus::Removing => "removing",
            WorkloadStatus::Dead => "dead",
            WorkloadStatus::Unknown => "unknown",
        }
    }

    pub fn is_running(self) -> bool {
        self == WorkloadStatus::Running
    }

    pub fn icon(self) -> &'static str {
        match self {
            WorkloadStatus::Running => "●",
            WorkloadStatus::Paused => "‖",
            WorkloadStatus::Restarting => "↻",
            WorkloadStatus::Created => "○",
            WorkloadStatus::Exited | WorkloadStatus::Dead => "■",
            WorkloadStatus::Removing | WorkloadStatus::Unknown => "?",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Health check state as reported in the status text, e.g.
/// `Up 3 hours (healthy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
    Starting,
}

impl Health {
    pub fn from_status_text(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        if lower.contains("(unhealthy)") {
            Some(Health::Unhealthy)
        } else if lower.contains("(healthy)") {
            Some(Health::Healthy)
        } else if lower.contains("health: starting") {
            Some(Health::Starting)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Unhealthy => "unhealthy",
            Health::Starting => "starting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: String,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.public_port {
            Some(public) => {
                let ip = self.ip.as_deref().unwrap_or("0.0.0.0");
                write!(f, "{ip}:{public}->{}/{}", self.private_port, self.protocol)
            }
            None => write!(f, "{}/{}", self.private_port, self.protocol),
        }
    }
}

/// One workload as seen on the latest refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSnapshot {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: String,
    pub status: WorkloadStatus,
    /// Human status text from the runtime ("Up 3 hours (healthy)").
    pub status_text: String,
    pub health: Option<Health>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ports: Vec<PortMapping>,
    pub labels: BTreeMap<String, String>,
    /// Unset when the workload is not running or its sample could not be
    /// fetched this cycle.
    pub counters: Option<CounterPair>,
}

impl WorkloadSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: WorkloadStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
            command: String::new(),
            status,
            status_text: String::new(),
            health: None,
            created_at: None,
            started_at: None,
            ports: Vec::new(),
            labels: BTreeMap::new(),
            counters: None,
        }
    }

    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(12) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    pub fn cpu_percent(&self) -> Option<f64> {
        self.counters.as_ref().map(CounterPair::cpu_percent)
    }

    pub fn memory_percent(&self) -> Option<f64> {
        self.counters.as_ref().map(CounterPair::memory_percent)
    }
}
