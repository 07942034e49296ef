//! Rates and percentages derived from cumulative runtime counters.
//!
//! Every function here is total: missing or implausible input (counter resets,
//! zero denominators) yields zero rather than an error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

impl NetworkCounters {
    fn accumulate(&mut self, other: &NetworkCounters) {
        self.rx_bytes = self.rx_bytes.saturating_add(other.rx_bytes);
        self.rx_packets = self.rx_packets.saturating_add(other.rx_packets);
        self.rx_errors = self.rx_errors.saturating_add(other.rx_errors);
        self.rx_dropped = self.rx_dropped.saturating_add(other.rx_dropped);
        self.tx_bytes = self.tx_bytes.saturating_add(other.tx_bytes);
        self.tx_packets = self.tx_packets.saturating_add(other.tx_packets);
        self.tx_errors = self.tx_errors.saturating_add(other.tx_errors);
        self.tx_dropped = self.tx_dropped.saturating_add(other.tx_dropped);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockIoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// One per-device block IO record as reported by the runtime (`op` is
/// `Read`, `Write`, `Sync`, `Total`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIoEntry {
    pub op: String,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThrottlingCounters {
    pub periods: u64,
    pub throttled_periods: u64,
    pub throttled_time_ns: u64,
}

/// Point-in-time snapshot of a workload's cumulative usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CounterSample {
    /// CPU time consumed by the workload.
    pub busy_ticks: u64,
    /// CPU time elapsed on the host, same unit as `busy_ticks`.
    pub system_ticks: u64,
    pub online_cores: u32,
    pub memory_used: u64,
    pub memory_limit: u64,
    pub memory_cache: u64,
    pub memory_rss: u64,
    pub memory_peak: u64,
    pub network: NetworkCounters,
    pub block_io: BlockIoCounters,
    pub pids: u64,
    pub throttling: ThrottlingCounters,
    pub read_at: Option<DateTime<Utc>>,
}

/// CPU usage between two samples as a percentage of one core, so the range is
/// `[0, 100 * online_cores]`.
pub fn cpu_percent(prev: &CounterSample, cur: &CounterSample) -> f64 {
    let (Some(busy_delta), Some(sys_delta)) = (
        cur.busy_ticks.checked_sub(prev.busy_ticks),
        cur.system_ticks.checked_sub(prev.system_ticks),
    ) else {
        return 0.0;
    };
    if busy_delta == 0 || sys_delta == 0 {
        return 0.0;
    }

    let cores = f64::from(cur.online_cores);
    let percent = (busy_delta as f64 / sys_delta as f64) * cores * 100.0;
    percent.clamp(0.0, 100.0 * cores)
}

pub fn memory_percent(sample: &CounterSample) -> f64 {
    if sample.memory_limit == 0 {
        return 0.0;
    }
    (sample.memory_used as f64 / sample.memory_limit as f64 * 100.0).max(0.0)
}

/// Sums per-interface counters. Interfaces that come and go between samples
/// simply contribute nothing while absent.
pub fn sum_network<'a, I>(interfaces: I) -> NetworkCounters
where
    I: IntoIterator<Item = &'a NetworkCounters>,
{
    interfaces
        .into_iter()
        .fold(NetworkCounters::default(), |mut total, iface| {
            total.accumulate(iface);
            total
        })
}

/// Folds per-device byte and operation records into read/write totals.
/// Records with any other `op` (`Sync`, `Async`, `Total`, ...) are ignored.
pub fn sum_block_io(bytes: &[BlockIoEntry], ops: &[BlockIoEntry]) -> BlockIoCounters {
    let mut totals = BlockIoCounters::default();
    for entry in bytes {
        if entry.op.eq_ignore_ascii_case("read") {
            totals.read_bytes = totals.read_bytes.saturating_add(entry.value);
        } else if entry.op.eq_ignore_ascii_case("write") {
            totals.write_bytes = totals.write_bytes.saturating_add(entry.value);
        }
    }
    for entry in ops {
        if entry.op.eq_ignore_ascii_case("read") {
            totals.read_ops = totals.read_ops.saturating_add(entry.value);
        } else if entry.op.eq_ignore_ascii_case("write") {
            totals.write_ops = totals.write_ops.saturating_add(entry.value);
        }
    }
    totals
}

/// Per-second rate of a monotonically increasing counter. A counter that went
/// backwards (workload restarted) or a zero interval reads as zero.
pub fn per_second(prev: u64, cur: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    match cur.checked_sub(prev) {
        Some(delta) if secs > 0.0 => delta as f64 / secs,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IoRates {
    pub rx_per_sec: f64,
    pub tx_per_sec: f64,
    pub read_per_sec: f64,
    pub write_per_sec: f64,
}

/// The current sample plus the one observed on the previous refresh cycle, if
/// the workload was already running then.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterPair {
    pub previous: Option<CounterSample>,
    pub current: CounterSample,
}

impl CounterPair {
    pub fn first(current: CounterSample) -> Self {
        Self {
            previous: None,
            current,
        }
    }

    pub fn cpu_percent(&self) -> f64 {
        self.previous
            .as_ref()
            .map(|prev| cpu_percent(prev, &self.current))
            .unwrap_or(0.0)
    }

    pub fn memory_percent(&self) -> f64 {
        memory_percent(&self.current)
    }

    pub fn io_rates(&self) -> IoRates {
        let Some(prev) = &self.previous else {
            return IoRates::default();
        };
        let elapsed = match (prev.read_at, self.current.read_at) {
            (Some(before), Some(after)) => (after - before).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        let cur = &self.current;
        IoRates {
            rx_per_sec: per_second(prev.network.rx_bytes, cur.network.rx_bytes, elapsed),
            tx_per_sec: per_second(prev.network.tx_bytes, cur.network.tx_bytes, elapsed),
            read_per_sec: per_second(prev.block_io.read_bytes, cur.block_io.read_bytes, elapsed),
            write_per_sec: per_second(prev.block_io.write_bytes, cur.block_io.write_bytes, elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(busy: u64, system: u64, cores: u32) -> CounterSample {
        CounterSample {
            busy_ticks: busy,
            system_ticks: system,
            online_cores: cores,
            ..CounterSample::default()
        }
    }

    #[test]
    fn cpu_percent_scales_by_cores() {
        let prev = sample(1_000, 10_000, 4);
        let cur = sample(1_500, 11_000, 4);
        // 500 / 1000 of the host, four cores
        assert!((cpu_percent(&prev, &cur) - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cpu_percent_is_zero_without_system_progress() {
        let prev = sample(1_000, 10_000, 2);
        assert_eq!(cpu_percent(&prev, &sample(2_000, 10_000, 2)), 0.0);
        assert_eq!(cpu_percent(&prev, &sample(2_000, 9_000, 2)), 0.0);
    }

    #[test]
    fn cpu_percent_is_zero_after_counter_reset() {
        let prev = sample(5_000, 10_000, 2);
        let cur = sample(100, 12_000, 2);
        assert_eq!(cpu_percent(&prev, &cur), 0.0);
    }

    #[test]
    fn cpu_percent_never_exceeds_core_capacity() {
        let prev = sample(0, 0, 2);
        let cur = sample(10_000, 100, 2);
        assert_eq!(cpu_percent(&prev, &cur), 200.0);
    }

    #[test]
    fn memory_percent_handles_unbounded_limit() {
        let unbounded = CounterSample {
            memory_used: 1024,
            memory_limit: 0,
            ..CounterSample::default()
        };
        assert_eq!(memory_percent(&unbounded), 0.0);

        let half = CounterSample {
            memory_used: 512,
            memory_limit: 1024,
            ..CounterSample::default()
        };
        assert!((memory_percent(&half) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn network_sums_across_interfaces() {
        let eth0 = NetworkCounters {
            rx_bytes: 100,
            tx_bytes: 10,
            rx_errors: 1,
            ..NetworkCounters::default()
        };
        let eth1 = NetworkCounters {
            rx_bytes: 50,
            tx_bytes: 5,
            tx_dropped: 2,
            ..NetworkCounters::default()
        };
        let total = sum_network([&eth0, &eth1]);
        assert_eq!(total.rx_bytes, 150);
        assert_eq!(total.tx_bytes, 15);
        assert_eq!(total.rx_errors, 1);
        assert_eq!(total.tx_dropped, 2);
        assert_eq!(sum_network(std::iter::empty()), NetworkCounters::default());
    }

    #[test]
    fn block_io_splits_read_and_write() {
        let entry = |op: &str, value| BlockIoEntry {
            op: op.to_string(),
            value,
        };
        let bytes = vec![
            entry("Read", 4096),
            entry("Write", 1024),
            entry("read", 4096),
            entry("Total", 9999),
        ];
        let ops = vec![entry("Read", 3), entry("Write", 7), entry("Sync", 10)];
        let totals = sum_block_io(&bytes, &ops);
        assert_eq!(totals.read_bytes, 8192);
        assert_eq!(totals.write_bytes, 1024);
        assert_eq!(totals.read_ops, 3);
        assert_eq!(totals.write_ops, 7);
    }

    #[test]
    fn per_second_ignores_resets_and_empty_intervals() {
        assert_eq!(per_second(100, 300, Duration::from_secs(2)), 100.0);
        assert_eq!(per_second(300, 100, Duration::from_secs(2)), 0.0);
        assert_eq!(per_second(100, 300, Duration::ZERO), 0.0);
    }

    #[test]
    fn pair_without_previous_reports_zero_cpu() {
        let pair = CounterPair::first(sample(1_000, 10_000, 4));
        assert_eq!(pair.cpu_percent(), 0.0);
        assert_eq!(pair.io_rates(), IoRates::default());
    }

    #[test]
    fn pair_rates_use_sample_timestamps() {
        let t0 = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2024-05-01T10:00:02Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut prev = sample(0, 0, 1);
        prev.read_at = Some(t0);
        prev.network.rx_bytes = 1_000;
        let mut cur = sample(0, 0, 1);
        cur.read_at = Some(t1);
        cur.network.rx_bytes = 3_000;
        cur.block_io.write_bytes = 4_096;

        let rates = CounterPair {
            previous: Some(prev),
            current: cur,
        }
        .io_rates();
        assert_eq!(rates.rx_per_sec, 1_000.0);
        assert_eq!(rates.write_per_sec, 2_048.0);
    }
}
