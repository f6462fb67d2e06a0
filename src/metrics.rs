//! Operation metrics for the tree.
//!
//! Purely advisory atomic counters plus a pointer-traversal depth histogram.
//! A tree carries `Option<Arc<TreeMetrics>>`; pass `None` to spend nothing.
//! Counters use relaxed ordering and never synchronize tree state.

use std::sync::atomic::AtomicU64;

use crate::ordering::COUNTER;

/// Number of histogram buckets. Depths at or beyond the last bucket are
/// clamped into it.
pub const TRAVERSAL_BUCKETS: usize = 16;

/// Shared counters recorded by tree operations.
#[derive(Debug, Default)]
pub struct TreeMetrics {
    puts: AtomicU64,
    gets: AtomicU64,
    destroys: AtomicU64,
    scans: AtomicU64,
    splits: AtomicU64,
    /// Histogram of pointer traversals per `get`, bucketed by depth.
    traversals: [AtomicU64; TRAVERSAL_BUCKETS],
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Completed `put` / `put_cached` calls.
    pub puts: u64,
    /// Completed `get` / `get_cached` calls.
    pub gets: u64,
    /// Completed `destroy` / `destroy_cached` calls.
    pub destroys: u64,
    /// `scan` initializations.
    pub scans: u64,
    /// Intermediate nodes published by the split protocol.
    pub splits: u64,
    /// Pointer-traversal depth histogram for gets.
    pub traversals: [u64; TRAVERSAL_BUCKETS],
}

impl TreeMetrics {
    /// Create zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out the current counter values.
    ///
    /// The copy is not a consistent cut across counters; individual values
    /// are exact.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut traversals = [0u64; TRAVERSAL_BUCKETS];
        for (out, bucket) in traversals.iter_mut().zip(&self.traversals) {
            *out = bucket.load(COUNTER);
        }

        MetricsSnapshot {
            puts: self.puts.load(COUNTER),
            gets: self.gets.load(COUNTER),
            destroys: self.destroys.load(COUNTER),
            scans: self.scans.load(COUNTER),
            splits: self.splits.load(COUNTER),
            traversals,
        }
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, COUNTER);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, COUNTER);
    }

    pub(crate) fn record_destroy(&self) {
        self.destroys.fetch_add(1, COUNTER);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, COUNTER);
    }

    pub(crate) fn record_split(&self) {
        self.splits.fetch_add(1, COUNTER);
    }

    pub(crate) fn record_traversal(&self, depth: usize) {
        let bucket = depth.min(TRAVERSAL_BUCKETS - 1);
        self.traversals[bucket].fetch_add(1, COUNTER);
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        self.puts.store(0, COUNTER);
        self.gets.store(0, COUNTER);
        self.destroys.store(0, COUNTER);
        self.scans.store(0, COUNTER);
        self.splits.store(0, COUNTER);
        for bucket in &self.traversals {
            bucket.store(0, COUNTER);
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================
