//! Lenient decoding of Engine API documents into crate types.
//!
//! Documents arrive as `serde_json::Value` so a single malformed field never
//! fails the whole record: absent, `null`, negative, fractional or
//! string-typed numbers all decode to zero.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::workload::{Health, PortMapping, WorkloadSnapshot, WorkloadStatus};
use crate::metrics::counters::{
    BlockIoEntry, CounterSample, NetworkCounters, ThrottlingCounters, sum_block_io, sum_network,
};

fn number(value: &Value) -> u64 {
    let as_float = |f: f64| if f.is_finite() && f > 0.0 { f as u64 } else { 0 };
    match value {
        Value::Number(n) => n.as_u64().unwrap_or_else(|| n.as_f64().map_or(0, as_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .unwrap_or_else(|_| s.parse::<f64>().map_or(0, as_float))
        }
        _ => 0,
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value))
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStats {
    #[serde(deserialize_with = "lenient")]
    read: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pids_stats: RawPids,
    #[serde(deserialize_with = "lenient")]
    cpu_stats: RawCpu,
    #[serde(deserialize_with = "lenient")]
    memory_stats: RawMemory,
    #[serde(deserialize_with = "lenient")]
    networks: HashMap<String, RawNetwork>,
    #[serde(deserialize_with = "lenient")]
    blkio_stats: RawBlkio,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPids {
    #[serde(deserialize_with = "lenient_u64")]
    current: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCpu {
    #[serde(deserialize_with = "lenient")]
    cpu_usage: RawCpuUsage,
    #[serde(deserialize_with = "lenient_u64")]
    system_cpu_usage: u64,
    #[serde(deserialize_with = "lenient_u64")]
    online_cpus: u64,
    #[serde(deserialize_with = "lenient")]
    throttling_data: RawThrottling,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCpuUsage {
    #[serde(deserialize_with = "lenient_u64")]
    total_usage: u64,
    #[serde(deserialize_with = "lenient")]
    percpu_usage: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThrottling {
    #[serde(deserialize_with = "lenient_u64")]
    periods: u64,
    #[serde(deserialize_with = "lenient_u64")]
    throttled_periods: u64,
    #[serde(deserialize_with = "lenient_u64")]
    throttled_time: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMemory {
    #[serde(deserialize_with = "lenient_u64")]
    usage: u64,
    #[serde(deserialize_with = "lenient_u64")]
    max_usage: u64,
    #[serde(deserialize_with = "lenient_u64")]
    limit: u64,
    #[serde(deserialize_with = "lenient")]
    stats: HashMap<String, Value>,
}

impl RawMemory {
    /// First key present, so cgroup v1 names can fall back to v2 names.
    fn stat(&self, keys: &[&str]) -> u64 {
        keys.iter()
            .find_map(|key| self.stats.get(*key))
            .map_or(0, number)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNetwork {
    #[serde(deserialize_with = "lenient_u64")]
    rx_bytes: u64,
    #[serde(deserialize_with = "lenient_u64")]
    rx_packets: u64,
    #[serde(deserialize_with = "lenient_u64")]
    rx_errors: u64,
    #[serde(deserialize_with = "lenient_u64")]
    rx_dropped: u64,
    #[serde(deserialize_with = "lenient_u64")]
    tx_bytes: u64,
    #[serde(deserialize_with = "lenient_u64")]
    tx_packets: u64,
    #[serde(deserialize_with = "lenient_u64")]
    tx_errors: u64,
    #[serde(deserialize_with = "lenient_u64")]
    tx_dropped: u64,
}

impl From<&RawNetwork> for NetworkCounters {
    fn from(raw: &RawNetwork) -> Self {
        NetworkCounters {
            rx_bytes: raw.rx_bytes,
            rx_packets: raw.rx_packets,
            rx_errors: raw.rx_errors,
            rx_dropped: raw.rx_dropped,
            tx_bytes: raw.tx_bytes,
            tx_packets: raw.tx_packets,
            tx_errors: raw.tx_errors,
            tx_dropped: raw.tx_dropped,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBlkio {
    #[serde(deserialize_with = "lenient")]
    io_service_bytes_recursive: Vec<RawBlkioEntry>,
    #[serde(deserialize_with = "lenient")]
    io_serviced_recursive: Vec<RawBlkioEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBlkioEntry {
    #[serde(deserialize_with = "lenient")]
    op: String,
    #[serde(deserialize_with = "lenient_u64")]
    value: u64,
}

impl From<&RawBlkioEntry> for BlockIoEntry {
    fn from(raw: &RawBlkioEntry) -> Self {
        BlockIoEntry {
            op: raw.op.clone(),
            value: raw.value,
        }
    }
}

/// Parses an RFC 3339 instant. The engine reports unset times as
/// `0001-01-01T00:00:00Z`, which reads as `None`.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let instant = DateTime::parse_from_rfc3339(text.trim())
        .ok()?
        .with_timezone(&Utc);
    (instant.year() > 1).then_some(instant)
}

/// Decodes one stats document. Never fails.
pub fn sample_from_value(value: Value) -> CounterSample {
    let raw: RawStats = serde_json::from_value(value).unwrap_or_default();

    let memory = &raw.memory_stats;
    let inactive = memory.stat(&["total_inactive_file", "inactive_file"]);
    let memory_used = if inactive < memory.usage {
        memory.usage - inactive
    } else {
        memory.usage
    };

    let online_cores = match raw.cpu_stats.online_cpus {
        0 => raw.cpu_stats.cpu_usage.percpu_usage.len().max(1) as u64,
        n => n,
    };

    let bytes: Vec<BlockIoEntry> = raw
        .blkio_stats
        .io_service_bytes_recursive
        .iter()
        .map(BlockIoEntry::from)
        .collect();
    let ops: Vec<BlockIoEntry> = raw
        .blkio_stats
        .io_serviced_recursive
        .iter()
        .map(BlockIoEntry::from)
        .collect();
    let interfaces: Vec<NetworkCounters> = raw.networks.values().map(NetworkCounters::from).collect();

    let throttling = &raw.cpu_stats.throttling_data;
    CounterSample {
        busy_ticks: raw.cpu_stats.cpu_usage.total_usage,
        system_ticks: raw.cpu_stats.system_cpu_usage,
        online_cores: u32::try_from(online_cores).unwrap_or(u32::MAX),
        memory_used,
        memory_limit: memory.limit,
        memory_cache: memory.stat(&["cache", "file"]),
        memory_rss: memory.stat(&["rss", "anon"]),
        memory_peak: memory.max_usage,
        network: sum_network(&interfaces),
        block_io: sum_block_io(&bytes, &ops),
        pids: raw.pids_stats.current,
        throttling: ThrottlingCounters {
            periods: throttling.periods,
            throttled_periods: throttling.throttled_periods,
            throttled_time_ns: throttling.throttled_time,
        },
        read_at: raw.read.as_deref().and_then(parse_instant),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSummary {
    #[serde(rename = "Id", deserialize_with = "lenient")]
    id: String,
    #[serde(rename = "Names", deserialize_with = "lenient")]
    names: Vec<String>,
    #[serde(rename = "Image", deserialize_with = "lenient")]
    image: String,
    #[serde(rename = "Command", deserialize_with = "lenient")]
    command: String,
    #[serde(rename = "Created", deserialize_with = "lenient")]
    created: i64,
    #[serde(rename = "Ports", deserialize_with = "lenient")]
    ports: Vec<RawPort>,
    #[serde(rename = "Labels", deserialize_with = "lenient")]
    labels: BTreeMap<String, String>,
    #[serde(rename = "State", deserialize_with = "lenient")]
    state: String,
    #[serde(rename = "Status", deserialize_with = "lenient")]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPort {
    #[serde(rename = "IP", deserialize_with = "lenient")]
    ip: Option<String>,
    #[serde(rename = "PrivatePort", deserialize_with = "lenient")]
    private_port: u16,
    #[serde(rename = "PublicPort", deserialize_with = "lenient")]
    public_port: Option<u16>,
    #[serde(rename = "Type", deserialize_with = "lenient")]
    protocol: String,
}

/// Decodes one container summary from a list response. `None` when the
/// record carries no id.
pub fn workload_from_value(value: Value) -> Option<WorkloadSnapshot> {
    let raw: RawSummary = serde_json::from_value(value).ok()?;
    if raw.id.is_empty() {
        return None;
    }

    let name = raw
        .names
        .iter()
        .map(|n| n.trim_start_matches('/'))
        .find(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| raw.id.chars().take(12).collect());

    let mut workload = WorkloadSnapshot::new(raw.id, name, WorkloadStatus::from_state(&raw.state));
    workload.image = raw.image;
    workload.command = raw.command;
    workload.health = Health::from_status_text(&raw.status);
    workload.status_text = raw.status;
    workload.created_at = (raw.created > 0)
        .then(|| Utc.timestamp_opt(raw.created, 0).single())
        .flatten();
    workload.ports = raw
        .ports
        .into_iter()
        .map(|p| PortMapping {
            ip: p.ip.filter(|ip| !ip.is_empty()),
            private_port: p.private_port,
            public_port: p.public_port.filter(|&port| port != 0),
            protocol: if p.protocol.is_empty() {
                "tcp".to_string()
            } else {
                p.protocol
            },
        })
        .collect();
    workload.labels = raw.labels;
    Some(workload)
}

/// `State.StartedAt` from an inspect document.
pub fn started_at_from_inspect(value: &Value) -> Option<DateTime<Utc>> {
    value
        .pointer("/State/StartedAt")
        .and_then(Value::as_str)
        .and_then(parse_instant)
}
