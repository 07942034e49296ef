use std::collections::VecDeque;

use super::classify::ClassifiedLine;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded, ordered store of classified lines for one workload.
///
/// Refreshes fetch the last N lines every cycle, so consecutive batches
/// overlap. [`LogBuffer::append_tail`] only appends what is new.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<ClassifiedLine>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, line: ClassifiedLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Appends the part of `batch` not already present at the end of the
    /// buffer. The overlap is the longest run where the buffer's last `k` raw
    /// lines equal the batch's first `k`. Returns how many lines were added.
    pub fn append_tail(&mut self, batch: Vec<ClassifiedLine>) -> usize {
        let overlap = self.overlap_with(&batch);
        let added = batch.len() - overlap;
        for line in batch.into_iter().skip(overlap) {
            self.push(line);
        }
        added
    }

    fn overlap_with(&self, batch: &[ClassifiedLine]) -> usize {
        let max = self.lines.len().min(batch.len());
        (1..=max)
            .rev()
            .find(|&k| {
                let start = self.lines.len() - k;
                self.lines
                    .range(start..)
                    .zip(&batch[..k])
                    .all(|(held, new)| held.raw == new.raw)
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ClassifiedLine> {
        self.lines.iter()
    }

    /// The newest `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &ClassifiedLine> {
        self.lines.iter().skip(self.lines.len().saturating_sub(n))
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
