use std::collections::{HashMap, HashSet, VecDeque};

const DEFAULT_CAPACITY: usize = 60;

/// Sparkline values are stored as hundredths of a percent so the widget can
/// work with integers.
const SCALE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct WorkloadHistory {
    pub cpu: VecDeque<u64>,
    pub memory: VecDeque<u64>,
    capacity: usize,
}

impl WorkloadHistory {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: VecDeque::with_capacity(capacity),
            memory: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, cpu_percent: f64, memory_percent: f64) {
        if self.cpu.len() == self.capacity {
            self.cpu.pop_front();
        }
        if self.memory.len() == self.capacity {
            self.memory.pop_front();
        }
        self.cpu.push_back(to_points(cpu_percent));
        self.memory.push_back(to_points(memory_percent));
    }

    pub fn cpu_points(&self) -> Vec<u64> {
        self.cpu.iter().copied().collect()
    }

    pub fn memory_points(&self) -> Vec<u64> {
        self.memory.iter().copied().collect()
    }
}

fn to_points(percent: f64) -> u64 {
    if percent.is_finite() && percent > 0.0 {
        (percent * SCALE).round() as u64
    } else {
        0
    }
}

#[derive(Debug)]
pub struct HistoryStore {
    entries: HashMap<String, WorkloadHistory>,
    capacity: usize,
    gc_counter: u32,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            gc_counter: 0,
        }
    }

    pub fn record(&mut self, id: &str, cpu_percent: f64, memory_percent: f64) {
        let capacity = self.capacity;
        self.entries
            .entry(id.to_string())
            .or_insert_with(|| WorkloadHistory::new(capacity))
            .push(cpu_percent, memory_percent);
    }

    pub fn get(&self, id: &str) -> Option<&WorkloadHistory> {
        self.entries.get(id)
    }

    /// Drops histories of workloads that no longer exist. Runs on every tenth
    /// call.
    pub fn gc(&mut self, alive: &HashSet<&str>) {
        self.gc_counter += 1;
        if !self.gc_counter.is_multiple_of(10) {
            return;
        }
        self.entries.retain(|id, _| alive.contains(id.as_str()));
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_push_get() {
        let mut store = HistoryStore::new(60);
        store.record("abc", 5.0, 10.0);
        store.record("abc", 12.5, 20.0);
        let h = store.get("abc").unwrap();
        assert_eq!(h.cpu.len(), 2);
        assert_eq!(h.cpu[1], 1250);
        assert_eq!(h.memory[0], 1000);
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let mut store = HistoryStore::new(5);
        for i in 0..10 {
            store.record("abc", i as f64, 0.0);
        }
        let h = store.get("abc").unwrap();
        assert_eq!(h.cpu_points(), vec![500, 600, 700, 800, 900]);
    }

    #[test]
    fn non_finite_values_record_as_zero() {
        let mut store = HistoryStore::new(5);
        store.record("abc", f64::NAN, -3.0);
        let h = store.get("abc").unwrap();
        assert_eq!(h.cpu[0], 0);
        assert_eq!(h.memory[0], 0);
    }

    #[test]
    fn gc_removes_vanished_workloads() {
        let mut store = HistoryStore::new(60);
        store.record("a", 1.0, 1.0);
        store.record("b", 2.0, 2.0);
        store.record("c", 3.0, 3.0);

        let alive: HashSet<&str> = ["a", "c"].into_iter().collect();

        store.gc_counter = 9;
        store.gc(&alive);

        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }
}
