//! Ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

use fusion_engine::SubmitOutcome;

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Samples handed to the ingest interface
    pub samples_submitted: AtomicU64,

    /// Samples that evicted an older sample on the way in
    pub samples_overflowed: AtomicU64,

    /// Samples refused by the ingest interface
    pub samples_rejected: AtomicU64,

    /// Raw LiDAR frames decoded
    pub frames_decoded: AtomicU64,

    /// Raw LiDAR frames that failed to decode
    pub decode_errors: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one submit
    pub fn record_submit(&self, outcome: SubmitOutcome) {
        self.samples_submitted.fetch_add(1, Ordering::Relaxed);
        match outcome {
            SubmitOutcome::Accepted => {}
            SubmitOutcome::DroppedOldest => {
                self.samples_overflowed.fetch_add(1, Ordering::Relaxed);
            }
            SubmitOutcome::Rejected => {
                self.samples_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("road_lidar_decode_errors_total").increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_submitted: self.samples_submitted.load(Ordering::Relaxed),
            samples_overflowed: self.samples_overflowed.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub samples_submitted: u64,
    pub samples_overflowed: u64,
    pub samples_rejected: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
}
