//! Ingest interface: per-kind buffers shared between sensor producers and the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{BufferConfig, RawSample, RoadError, SamplePayload, SensorKind};
use tracing::{debug, error, warn};

use crate::buffer::SampleBuffer;

/// The three sample buffers, owned by the engine's construction context
///
/// Cloning yields another handle to the same buffers.
#[derive(Debug, Clone)]
pub struct SampleBuffers {
    lidar: Arc<Mutex<SampleBuffer>>,
    gps: Arc<Mutex<SampleBuffer>>,
    accel: Arc<Mutex<SampleBuffer>>,
}

impl SampleBuffers {
    pub fn new(config: &BufferConfig) -> Self {
        let make = |kind: SensorKind| {
            Arc::new(Mutex::new(SampleBuffer::new(
                kind,
                config.capacity(kind),
                config.staleness_s,
            )))
        };
        Self {
            lidar: make(SensorKind::Lidar),
            gps: make(SensorKind::Gps),
            accel: make(SensorKind::Accel),
        }
    }

    fn slot(&self, kind: SensorKind) -> &Arc<Mutex<SampleBuffer>> {
        match kind {
            SensorKind::Lidar => &self.lidar,
            SensorKind::Gps => &self.gps,
            SensorKind::Accel => &self.accel,
        }
    }

    /// Lock one buffer
    ///
    /// # Errors
    /// A poisoned lock means a producer panicked mid-update: `Structural`
    pub fn lock(&self, kind: SensorKind) -> Result<MutexGuard<'_, SampleBuffer>, RoadError> {
        self.slot(kind)
            .lock()
            .map_err(|_| RoadError::structural(format!("{kind} buffer lock poisoned")))
    }

    /// Apply capacity and staleness from a configuration snapshot
    ///
    /// Returns the number of samples dropped by shrinking.
    pub fn reconfigure(&self, config: &BufferConfig) -> Result<usize, RoadError> {
        let mut dropped = 0;
        for kind in SensorKind::ALL {
            let mut buffer = self.lock(kind)?;
            dropped += buffer.resize(config.capacity(kind));
            buffer.set_staleness(config.staleness_s);
        }
        Ok(dropped)
    }

    /// Overflow drops summed over all buffers
    pub fn total_dropped(&self) -> Result<u64, RoadError> {
        let mut total = 0;
        for kind in SensorKind::ALL {
            total += self.lock(kind)?.dropped_count();
        }
        Ok(total)
    }

    /// Late arrivals summed over all buffers
    pub fn total_out_of_order(&self) -> Result<u64, RoadError> {
        let mut total = 0;
        for kind in SensorKind::ALL {
            total += self.lock(kind)?.out_of_order_count();
        }
        Ok(total)
    }

    /// Current depth of every buffer
    pub fn depths(&self) -> Result<[(SensorKind, usize); 3], RoadError> {
        Ok([
            (SensorKind::Lidar, self.lock(SensorKind::Lidar)?.len()),
            (SensorKind::Gps, self.lock(SensorKind::Gps)?.len()),
            (SensorKind::Accel, self.lock(SensorKind::Accel)?.len()),
        ])
    }
}

/// Outcome of one `submit` call, for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored
    Accepted,
    /// Stored; the oldest sample of that kind was dropped to make room
    DroppedOldest,
    /// Not stored (malformed sample or unusable buffer)
    Rejected,
}

/// Push-only handle given to sensor drivers
#[derive(Debug, Clone)]
pub struct IngestHandle {
    buffers: SampleBuffers,
    submitted: Arc<AtomicU64>,
}

impl IngestHandle {
    pub(crate) fn new(buffers: SampleBuffers) -> Self {
        Self {
            buffers,
            submitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit one reading
    ///
    /// Never blocks beyond the buffer's critical section and never fails in a way
    /// that should stop acquisition.
    pub fn submit(&self, kind: SensorKind, timestamp: f64, payload: SamplePayload) -> SubmitOutcome {
        match RawSample::new(kind, timestamp, payload) {
            Ok(sample) => self.submit_sample(sample),
            Err(e) => {
                warn!(sensor = %kind, timestamp, error = %e, "rejected malformed sample");
                metrics::counter!("road_samples_rejected_total", "sensor" => kind.as_str())
                    .increment(1);
                SubmitOutcome::Rejected
            }
        }
    }

    /// Submit an already validated sample
    pub fn submit_sample(&self, sample: RawSample) -> SubmitOutcome {
        let kind = sample.kind;
        let mut buffer = match self.buffers.lock(kind) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!(sensor = %kind, error = %e, "sample dropped");
                return SubmitOutcome::Rejected;
            }
        };

        self.submitted.fetch_add(1, Ordering::Relaxed);
        observability::record_sample_submitted(kind.as_str());

        match buffer.push(sample) {
            Ok(()) => SubmitOutcome::Accepted,
            Err(e) => {
                debug!(sensor = %kind, dropped = buffer.dropped_count(), error = %e, "buffer overflow");
                observability::record_buffer_overflow(kind.as_str());
                SubmitOutcome::DroppedOldest
            }
        }
    }

    /// Samples accepted into a buffer so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}
