//! Frame partitioning and progress aggregation across workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::job::FrameRange;

/// Splits `start..=end` into at most `k` contiguous near-equal ranges.
///
/// Every range gets `n / k` frames and the last one also absorbs the
/// remainder. `k` is clamped to `1..=n`, so no range is ever empty.
pub fn partition_frames(start: u64, end: u64, k: usize) -> Vec<FrameRange> {
    if end < start {
        return Vec::new();
    }
    let total = (end - start).saturating_add(1);
    let k = (k as u64).clamp(1, total);
    let base = total / k;

    (0..k)
        .map(|i| {
            let first = start + i * base;
            let last = if i == k - 1 {
                end
            } else {
                first + base - 1
            };
            FrameRange {
                start: first,
                end: last,
            }
        })
        .collect()
}

/// Per-worker counters of rendered frames, summed on read.
///
/// Each worker only writes its own slot, so no lock is needed.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    slots: Arc<Vec<AtomicU64>>,
    total: u64,
}

impl ProgressAggregator {
    pub fn new(workers: usize, total: u64) -> Self {
        Self {
            slots: Arc::new((0..workers).map(|_| AtomicU64::new(0)).collect()),
            total,
        }
    }

    /// Records that `worker` has rendered `done` frames in total.
    pub fn update(&self, worker: usize, done: u64) -> u64 {
        if let Some(slot) = self.slots.get(worker) {
            slot.store(done, Ordering::SeqCst);
        }
        self.done()
    }

    /// Frames rendered across all workers.
    pub fn done(&self) -> u64 {
        self.slots.iter().map(|s| s.load(Ordering::SeqCst)).sum()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn workers(&self) -> usize {
        self.slots.len()
    }
}
