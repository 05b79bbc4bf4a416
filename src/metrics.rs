//! Commit log metrics.
//!
//! Cumulative counters and latency accumulators for the write and sync
//! paths. All values are process-wide, monotonically increasing (except the
//! pending-writer gauge) and never reset. Consumers read a point-in-time
//! [`MetricsSnapshot`]; the live struct is updated lock-free from the hot
//! path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live metric registry for one commit log instance.
///
/// Counters accumulate over the lifetime of the log. The allocation-stall
/// counter increments once per stall *episode* — a maximal interval during
/// which at least one writer is blocked waiting for a ready segment or a
/// free staging buffer — not once per blocked caller, so it measures how
/// often the log ran out of headroom rather than how many threads happened
/// to pile up on a single stall.
#[derive(Debug, Default)]
pub struct CommitLogMetrics {
    /// Stall episodes where a writer blocked on segment or buffer supply.
    allocation_stalls: AtomicU64,
    /// Total nanoseconds spent in allocation stall episodes.
    allocation_stall_nanos: AtomicU64,
    /// Durability barrier (fsync) operations performed.
    sync_calls: AtomicU64,
    /// Total nanoseconds spent in durability barriers.
    sync_nanos: AtomicU64,
    /// Writers currently blocked waiting for a durability barrier (gauge).
    pending_writers: AtomicU64,
    /// Entries appended.
    entries_appended: AtomicU64,
    /// Encoded chunk bytes appended to segments.
    bytes_appended: AtomicU64,
    /// Segments created from scratch.
    segments_allocated: AtomicU64,
    /// Segments rebuilt from a reclaimed file.
    segments_recycled: AtomicU64,
    /// Reclaimed segment files deleted outright.
    segments_deleted: AtomicU64,
}

impl CommitLogMetrics {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one allocation stall episode and its duration.
    pub(crate) fn record_allocation_stall(&self, waited: Duration) {
        self.allocation_stalls.fetch_add(1, Ordering::Relaxed);
        self.allocation_stall_nanos
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record one durability barrier and its latency.
    pub(crate) fn record_sync(&self, elapsed: Duration) {
        self.sync_calls.fetch_add(1, Ordering::Relaxed);
        self.sync_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record one appended entry of the given encoded size.
    pub(crate) fn record_append(&self, chunk_bytes: u64) {
        self.entries_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(chunk_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_allocated(&self) {
        self.segments_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_recycled(&self) {
        self.segments_recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_deleted(&self) {
        self.segments_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark one writer as blocked on a durability barrier. The returned
    /// guard decrements the gauge when dropped, on every exit path.
    pub(crate) fn writer_waiting(&self) -> PendingWriterGuard<'_> {
        self.pending_writers.fetch_add(1, Ordering::Relaxed);
        PendingWriterGuard { metrics: self }
    }

    /// Point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocation_stalls: self.allocation_stalls.load(Ordering::Relaxed),
            allocation_stall_nanos: self.allocation_stall_nanos.load(Ordering::Relaxed),
            sync_calls: self.sync_calls.load(Ordering::Relaxed),
            sync_nanos: self.sync_nanos.load(Ordering::Relaxed),
            pending_writers: self.pending_writers.load(Ordering::Relaxed),
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            segments_allocated: self.segments_allocated.load(Ordering::Relaxed),
            segments_recycled: self.segments_recycled.load(Ordering::Relaxed),
            segments_deleted: self.segments_deleted.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the pending-writer gauge on drop.
pub(crate) struct PendingWriterGuard<'a> {
    metrics: &'a CommitLogMetrics,
}

impl Drop for PendingWriterGuard<'_> {
    fn drop(&mut self) {
        self.metrics.pending_writers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the commit log metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Stall episodes where writers blocked on segment or buffer supply.
    pub allocation_stalls: u64,
    /// Total nanoseconds spent in allocation stalls.
    pub allocation_stall_nanos: u64,
    /// Durability barrier (fsync) operations performed.
    pub sync_calls: u64,
    /// Total nanoseconds spent in durability barriers.
    pub sync_nanos: u64,
    /// Writers blocked on a durability barrier at snapshot time.
    pub pending_writers: u64,
    /// Entries appended.
    pub entries_appended: u64,
    /// Encoded chunk bytes appended to segments.
    pub bytes_appended: u64,
    /// Segments created from scratch.
    pub segments_allocated: u64,
    /// Segments rebuilt from a reclaimed file.
    pub segments_recycled: u64,
    /// Reclaimed segment files deleted outright.
    pub segments_deleted: u64,
}
