//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const NO_FRAME: u64 = u64::MAX;

/// Delivery state of one sink queue
///
/// Updated from both sides of the queue: the engine thread (enqueue, drop)
/// and the sink worker (write, failure).
#[derive(Debug)]
pub struct SinkMetrics {
    depth: AtomicUsize,
    high_water: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    last_frame_id: AtomicU64,
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self {
            depth: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_frame_id: AtomicU64::new(NO_FRAME),
        }
    }
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result entered the queue, leaving `depth` results waiting
    pub fn record_queued(&self, depth: usize) {
        self.set_depth(depth);
        self.high_water.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn set_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
    }

    pub fn record_written(&self, frame_id: u64) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.last_frame_id.store(frame_id, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frame id of the most recent successful write
    pub fn last_frame_id(&self) -> Option<u64> {
        match self.last_frame_id.load(Ordering::Relaxed) {
            NO_FRAME => None,
            id => Some(id),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            depth: self.depth(),
            high_water: self.high_water(),
            written: self.written(),
            failed: self.failed(),
            dropped: self.dropped(),
            last_frame_id: self.last_frame_id(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub depth: usize,
    pub high_water: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub last_frame_id: Option<u64>,
}

impl MetricsSnapshot {
    /// Results that never reached the sink
    pub fn lost(&self) -> u64 {
        self.failed + self.dropped
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} written, {} failed, {} dropped (peak queue {})",
            self.written, self.failed, self.dropped, self.high_water
        )?;
        if let Some(id) = self.last_frame_id {
            write!(f, ", last frame #{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_water_and_last_frame() {
        let metrics = SinkMetrics::new();
        assert_eq!(metrics.last_frame_id(), None);

        metrics.record_queued(3);
        metrics.record_queued(1);
        metrics.record_written(7);
        metrics.record_dropped();
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.depth, 1);
        assert_eq!(snapshot.high_water, 3);
        assert_eq!(snapshot.last_frame_id, Some(7));
        assert_eq!(snapshot.lost(), 2);
    }
}
