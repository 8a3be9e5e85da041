//! Per-sensor sample buffer with bounded-drop semantics.
//!
//! Uses index-based separation:
//! - HeapRb stores lightweight metadata (timestamp + arrival sequence + slab key)
//! - Slab stores the actual RawSample data
//!
//! Ring order is arrival order, so the front of the ring is always the oldest
//! sample to drop on overflow. Time-ordered queries scan the metadata.

use std::cmp::Ordering;
use std::fmt;

use contracts::{RawSample, RoadError, SensorKind};
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct SampleMeta {
    /// Acquisition timestamp
    timestamp: f64,
    /// Monotonic arrival counter (tie-break: later arrival wins)
    arrival_seq: u64,
    /// Key into the slab storage
    slab_key: usize,
}

impl SampleMeta {
    /// Order by timestamp, then by arrival
    fn recency(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.arrival_seq.cmp(&other.arrival_seq))
    }
}

/// Bounded per-kind sample buffer
pub struct SampleBuffer {
    kind: SensorKind,
    /// Ring buffer of metadata, oldest arrival first
    index: HeapRb<SampleMeta>,
    /// Actual sample storage
    storage: Slab<RawSample>,
    capacity: usize,
    staleness_s: f64,
    next_seq: u64,
    dropped_count: u64,
    stale_count: u64,
    out_of_order_count: u64,
    last_timestamp: Option<f64>,
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("kind", &self.kind)
            .field("len", &self.index.occupied_len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count)
            .field("stale", &self.stale_count)
            .finish()
    }
}

impl SampleBuffer {
    /// Create a new sample buffer
    pub fn new(kind: SensorKind, capacity: usize, staleness_s: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            kind,
            index: HeapRb::new(capacity),
            storage: Slab::with_capacity(capacity),
            capacity,
            staleness_s,
            next_seq: 0,
            dropped_count: 0,
            stale_count: 0,
            out_of_order_count: 0,
            last_timestamp: None,
        }
    }

    /// Push a sample into the buffer
    ///
    /// The sample is always stored. When the buffer was full the oldest sample is
    /// dropped first and `BufferOverflow` is returned so the caller can log it.
    pub fn push(&mut self, sample: RawSample) -> Result<(), RoadError> {
        let timestamp = sample.timestamp;

        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.out_of_order_count += 1;
            }
        }
        self.last_timestamp = Some(timestamp);

        let overflowed = self.index.is_full();
        if overflowed {
            if let Some(old_meta) = self.index.try_pop() {
                self.storage.remove(old_meta.slab_key);
            }
            self.dropped_count += 1;
        }

        let slab_key = self.storage.insert(sample);
        let meta = SampleMeta {
            timestamp,
            arrival_seq: self.next_seq,
            slab_key,
        };
        self.next_seq += 1;
        let _ = self.index.try_push(meta);

        if overflowed {
            Err(RoadError::BufferOverflow {
                kind: self.kind,
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Most recent sample by timestamp (later arrival wins ties)
    pub fn peek_latest(&self) -> Option<&RawSample> {
        self.index
            .iter()
            .max_by(|a, b| a.recency(b))
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Remove and return every sample strictly older than `timestamp`, oldest first
    pub fn pop_before(&mut self, timestamp: f64) -> Vec<RawSample> {
        let mut removed = Vec::new();
        self.retain(|meta| meta.timestamp >= timestamp, |sample| removed.push(sample));
        removed.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        removed
    }

    /// Purge samples older than `now - staleness_s`
    ///
    /// Returns the number of purged samples.
    pub fn purge_stale(&mut self, now: f64) -> usize {
        let cutoff = now - self.staleness_s;
        let mut purged = 0;
        self.retain(|meta| meta.timestamp >= cutoff, |_| purged += 1);
        self.stale_count += purged as u64;
        purged
    }

    /// Samples with `lo <= timestamp < hi`, ordered by timestamp then arrival
    ///
    /// Half-open so that back-to-back windows never share a boundary sample.
    pub fn window(&self, lo: f64, hi: f64) -> Vec<&RawSample> {
        let mut metas: Vec<&SampleMeta> = self
            .index
            .iter()
            .filter(|m| m.timestamp >= lo && m.timestamp < hi)
            .collect();
        metas.sort_by(|a, b| a.recency(b));
        metas
            .into_iter()
            .filter_map(|meta| self.storage.get(meta.slab_key))
            .collect()
    }

    /// Closest sample at or before `t`
    pub fn latest_at_or_before(&self, t: f64) -> Option<&RawSample> {
        self.index
            .iter()
            .filter(|m| m.timestamp <= t)
            .max_by(|a, b| a.recency(b))
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Closest sample strictly after `t`
    pub fn earliest_after(&self, t: f64) -> Option<&RawSample> {
        self.index
            .iter()
            .filter(|m| m.timestamp > t)
            .min_by(|a, b| {
                a.timestamp
                    .total_cmp(&b.timestamp)
                    .then(b.arrival_seq.cmp(&a.arrival_seq))
            })
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Change capacity, dropping the oldest arrivals if the buffer no longer fits
    ///
    /// Returns the number of dropped samples.
    pub fn resize(&mut self, capacity: usize) -> usize {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return 0;
        }

        let mut metas: Vec<SampleMeta> = self.index.pop_iter().collect();
        let excess = metas.len().saturating_sub(capacity);
        for meta in metas.drain(..excess) {
            self.storage.remove(meta.slab_key);
        }
        self.dropped_count += excess as u64;

        self.index = HeapRb::new(capacity);
        for meta in metas {
            let _ = self.index.try_push(meta);
        }
        self.capacity = capacity;
        excess
    }

    pub fn set_staleness(&mut self, staleness_s: f64) {
        self.staleness_s = staleness_s;
    }

    /// Keep entries matching `keep`, handing removed samples to `on_removed`
    fn retain(&mut self, keep: impl Fn(&SampleMeta) -> bool, mut on_removed: impl FnMut(RawSample)) {
        let remaining: Vec<SampleMeta> = self.index.pop_iter().collect();
        for meta in remaining {
            if keep(&meta) {
                let _ = self.index.try_push(meta);
            } else {
                on_removed(self.storage.remove(meta.slab_key));
            }
        }
    }

    #[inline]
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples dropped on overflow or shrink
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Samples purged as stale
    #[inline]
    pub fn stale_count(&self) -> u64 {
        self.stale_count
    }

    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}
