//! Fusion engine: one deterministic pass per tick.

use std::sync::Arc;

use contracts::{
    AnalysisConfig, AnalysisResult, BufferConfig, FrameHealth, ResultSink, RoadError,
};
use tracing::{debug, info, instrument, warn};

use crate::aligner::TimeAligner;
use crate::anomaly::{AnomalyDetector, DetectorCounters, FrameObservation};
use crate::classifier;
use crate::config_store::ConfigStore;
use crate::ingest::{IngestHandle, SampleBuffers};
use crate::profile;
use crate::roughness::{self, RoughnessEstimate};

/// Counters over the engine's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames: u64,
    /// Events from both detection paths
    pub anomalies: u64,
    /// Of which raised by the ranging hazard pass
    pub ranging_anomalies: u64,
    pub stage_faults: u64,
    pub rejected_ticks: u64,
    /// Samples that arrived behind a newer one of the same kind
    pub out_of_order_samples: u64,
    /// Detector runs that closed without an event
    pub suppressed_runs: DetectorCounters,
}

/// Road-quality fusion engine
///
/// Owns the sample buffers; producers only ever see an [`IngestHandle`].
pub struct FusionEngine {
    config: ConfigStore,
    buffers: SampleBuffers,
    ingest: IngestHandle,
    aligner: TimeAligner,
    detector: AnomalyDetector,
    sinks: Vec<Box<dyn ResultSink>>,
    applied_buffer: BufferConfig,
    frame_counter: u64,
    last_tick: Option<f64>,
    /// Timestamp of the last scan given to the hazard pass
    last_hazard_scan: Option<f64>,
    stats: EngineStats,
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("frame_counter", &self.frame_counter)
            .field("last_tick", &self.last_tick)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish()
    }
}

impl FusionEngine {
    pub fn new(config: ConfigStore) -> Self {
        let snapshot = config.snapshot();
        let buffers = SampleBuffers::new(&snapshot.buffer);
        let ingest = IngestHandle::new(buffers.clone());

        info!(
            tick_rate_hz = snapshot.tick.rate_hz,
            accel_window_s = snapshot.alignment.accel_window_s,
            "fusion engine created"
        );

        Self {
            config,
            buffers,
            ingest,
            aligner: TimeAligner::new(),
            detector: AnomalyDetector::new(),
            sinks: Vec::new(),
            applied_buffer: snapshot.buffer.clone(),
            frame_counter: 0,
            last_tick: None,
            last_hazard_scan: None,
            stats: EngineStats::default(),
        }
    }

    /// Handle for sensor producers
    pub fn ingest_handle(&self) -> IngestHandle {
        self.ingest.clone()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Register a result sink; called once per tick, in registration order
    pub fn register_sink(&mut self, sink: Box<dyn ResultSink>) {
        info!(sink = sink.name(), "result sink registered");
        self.sinks.push(sink);
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Run one tick for target timestamp `t`
    ///
    /// Either completes and emits to every sink, or returns an error and emits nothing.
    ///
    /// # Errors
    /// - `TimingFault` when `t` does not advance past the previous tick
    /// - `Structural` when a buffer is unusable (fatal)
    #[instrument(name = "engine_tick", skip(self), fields(frame_id = self.frame_counter + 1))]
    pub fn tick(&mut self, t: f64) -> Result<AnalysisResult, RoadError> {
        let config = self.config.snapshot();

        if let Some(last) = self.last_tick {
            if !(t > last) {
                self.stats.rejected_ticks += 1;
                return Err(RoadError::TimingFault {
                    lateness_ms: (last - t) * 1000.0,
                    period_ms: config.tick.period_s() * 1000.0,
                });
            }
        } else if !t.is_finite() {
            return Err(RoadError::TimingFault {
                lateness_ms: f64::INFINITY,
                period_ms: config.tick.period_s() * 1000.0,
            });
        }

        self.apply_buffer_config(&config)?;

        let frame_id = self.frame_counter + 1;
        let alignment = self.aligner.align(&self.buffers, t, frame_id, &config.alignment)?;
        for issue in &alignment.issues {
            debug!(error = %issue, "sensor unavailable for frame");
        }
        let frame = alignment.frame;
        for (kind, depth) in self.buffers.depths()? {
            observability::record_buffer_depth(kind.as_str(), depth);
        }

        let mut health = FrameHealth {
            missing_sensors: frame.meta.missing.clone(),
            stage_faults: Vec::new(),
        };

        let estimate = match roughness::estimate(&frame, &config.roughness) {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(frame_id, error = %e, "roughness stage failed, index undetermined");
                health.stage_faults.push(format!("roughness: {e}"));
                RoughnessEstimate::undetermined()
            }
        };

        let surface_profile = frame
            .lidar
            .as_ref()
            .and_then(|snapshot| profile::extract(&snapshot.scan, &config.profile));

        let quality_label =
            classifier::fused_label(estimate.index, surface_profile.as_ref(), &config.quality);

        let observation = FrameObservation {
            timestamp: frame.timestamp,
            level: estimate.level,
            vibration: estimate.rms,
            gps_fix: frame.gps.map(|g| g.fix),
        };
        let mut anomalies: Vec<_> = self
            .detector
            .observe(observation, &config.anomaly)
            .into_iter()
            .collect();

        // each scan is inspected once, however many ticks reuse it
        let mut ranging = 0;
        if let Some(snapshot) = frame.lidar.as_ref() {
            let fresh = self.last_hazard_scan.map_or(true, |seen| snapshot.timestamp > seen);
            if config.hazard.enabled && fresh {
                self.last_hazard_scan = Some(snapshot.timestamp);
                let hazards =
                    profile::detect_hazards(&snapshot.scan, &config.profile, &config.hazard);
                ranging = hazards.len() as u64;
                anomalies.extend(
                    hazards
                        .iter()
                        .map(|h| h.to_event(frame.timestamp, frame.gps.map(|g| g.fix))),
                );
            }
        }

        for event in &anomalies {
            info!(
                frame_id,
                kind = %event.kind,
                source = ?event.source,
                severity = event.severity,
                peak_sigma = event.peak_sigma,
                timestamp = event.timestamp,
                "anomaly detected"
            );
        }

        let result = AnalysisResult {
            frame_id,
            timestamp: frame.timestamp,
            gps_fix: frame.gps,
            speed_mps: frame.speed_mps,
            roughness_index: estimate.index,
            quality_label,
            surface_profile,
            anomalies,
            health,
        };

        self.frame_counter = frame_id;
        self.last_tick = Some(t);
        self.stats.frames += 1;
        self.stats.anomalies += result.anomalies.len() as u64;
        self.stats.ranging_anomalies += ranging;
        self.stats.stage_faults += result.health.stage_faults.len() as u64;
        self.stats.out_of_order_samples = self.buffers.total_out_of_order()?;
        self.stats.suppressed_runs = self.detector.counters();

        observability::record_analysis_metrics(&result);
        for sink in &mut self.sinks {
            sink.on_result(&result);
        }

        Ok(result)
    }

    fn apply_buffer_config(&mut self, config: &Arc<AnalysisConfig>) -> Result<(), RoadError> {
        if config.buffer == self.applied_buffer {
            return Ok(());
        }
        let dropped = self.buffers.reconfigure(&config.buffer)?;
        info!(
            dropped,
            accel_capacity = config.buffer.accel_capacity,
            gps_capacity = config.buffer.gps_capacity,
            lidar_capacity = config.buffer.lidar_capacity,
            "buffers reconfigured"
        );
        self.applied_buffer = config.buffer.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use contracts::{
        AccelReading, AnomalyEvent, AnomalyKind, AnomalySource, GpsFix, LidarPoint, LidarScan,
        QualityLabel, RoughnessIndex, SamplePayload, SensorKind,
    };

    const G: f64 = 9.81;

    struct Collect {
        results: Arc<Mutex<Vec<AnalysisResult>>>,
    }

    impl ResultSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn on_result(&mut self, result: &AnalysisResult) {
            self.results.lock().unwrap().push(result.clone());
        }
    }

    fn engine() -> FusionEngine {
        FusionEngine::new(ConfigStore::new(AnalysisConfig::default()).unwrap())
    }

    /// 100 Hz vertical samples for one 0.1 s tick centred on `t`
    fn feed_tick(handle: &IngestHandle, t: f64, z: impl Fn(f64) -> f64) {
        for i in 0..10 {
            let ts = t - 0.045 + i as f64 * 0.01;
            handle.submit(
                SensorKind::Accel,
                ts,
                SamplePayload::Accel(AccelReading {
                    x: 0.0,
                    y: 0.0,
                    z: z(ts),
                }),
            );
        }
    }

    #[test]
    fn test_tick_emits_to_sinks() {
        let mut engine = engine();
        let results = Arc::new(Mutex::new(Vec::new()));
        engine.register_sink(Box::new(Collect {
            results: results.clone(),
        }));

        let handle = engine.ingest_handle();
        for n in 1..=3 {
            let t = n as f64 * 0.1;
            feed_tick(&handle, t, |_| G);
            engine.tick(t).unwrap();
        }

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.frame_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(results.iter().all(|r| r.quality_label == QualityLabel::Smooth));
    }

    #[test]
    fn test_non_monotonic_tick_rejected_without_emitting() {
        let mut engine = engine();
        let results = Arc::new(Mutex::new(Vec::new()));
        engine.register_sink(Box::new(Collect {
            results: results.clone(),
        }));

        engine.tick(1.0).unwrap();
        let err = engine.tick(1.0).unwrap_err();
        assert!(matches!(err, RoadError::TimingFault { .. }));
        assert!(!err.is_fatal());
        assert_eq!(results.lock().unwrap().len(), 1);

        // recovery on the next tick
        let next = engine.tick(1.1).unwrap();
        assert_eq!(next.frame_id, 2);
        assert_eq!(engine.stats().rejected_ticks, 1);
    }

    #[test]
    fn test_no_data_is_undetermined_not_smooth() {
        let mut engine = engine();
        let result = engine.tick(0.5).unwrap();

        assert_eq!(result.roughness_index, RoughnessIndex::Undetermined);
        assert_eq!(result.quality_label, QualityLabel::Unknown);
        assert_eq!(result.health.missing_sensors.len(), 3);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_threshold_update_applies_next_tick() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        let rough = |ts: f64| G + 1.0 * (2.0 * std::f64::consts::PI * 20.0 * ts).sin();

        feed_tick(&handle, 0.1, rough);
        let first = engine.tick(0.1).unwrap();
        let index = first.roughness_index.value().unwrap();

        engine
            .config()
            .apply([
                ("quality.t1".to_string(), (index + 1.0).into()),
                ("quality.t2".to_string(), (index + 2.0).into()),
                ("quality.t3".to_string(), (index + 3.0).into()),
            ])
            .unwrap();

        feed_tick(&handle, 0.2, rough);
        let second = engine.tick(0.2).unwrap();
        assert_ne!(first.quality_label, QualityLabel::Smooth);
        assert_eq!(second.quality_label, QualityLabel::Smooth);
    }

    #[test]
    fn test_buffer_capacity_follows_config() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        for i in 0..100 {
            handle.submit(
                SensorKind::Accel,
                i as f64 * 0.01,
                SamplePayload::Accel(AccelReading { x: 0.0, y: 0.0, z: G }),
            );
        }
        engine.config().set("buffer.accel_capacity", 20).unwrap();
        engine.tick(0.5).unwrap();

        let buffer = engine.buffers.lock(SensorKind::Accel).unwrap();
        assert_eq!(buffer.capacity(), 20);
        assert!(buffer.len() <= 20);
    }

    #[test]
    fn test_geotagged_pothole() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        let fix = GpsFix {
            latitude: 31.2,
            longitude: 121.5,
            altitude: 4.0,
            satellites: Some(9),
        };

        let mut events = Vec::new();
        for n in 1..=40 {
            let t = n as f64 * 0.1;
            handle.submit(SensorKind::Gps, t - 0.05, SamplePayload::Gps(fix));
            let dip = if (20..23).contains(&n) { -1.5 } else { 0.0 };
            feed_tick(&handle, t, move |_| G + dip);
            events.extend(engine.tick(t).unwrap().anomalies);
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnomalyKind::Pothole);
        assert_eq!(events[0].gps_fix, Some(fix));
    }

    #[test]
    fn test_lidar_profile_attached() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        let scan = LidarScan {
            points: (0..30)
                .map(|i| LidarPoint {
                    angle_deg: i as f64 - 15.0,
                    distance_mm: 300.0,
                })
                .collect(),
        };
        handle.submit(SensorKind::Lidar, 0.95, SamplePayload::Lidar(scan));

        let result = engine.tick(1.0).unwrap();
        let profile = result.surface_profile.unwrap();
        assert_eq!(profile.valid_points, 30);
        assert!(!result.health.missing_sensors.contains(&SensorKind::Lidar));
    }

    /// 30 ground points with a 60 mm deep patch straight ahead
    fn pothole_scan() -> LidarScan {
        LidarScan {
            points: (0..30)
                .map(|i| {
                    let angle_deg = i as f64 - 15.0;
                    let depth = if angle_deg.abs() <= 2.0 { 60.0 } else { 0.0 };
                    LidarPoint {
                        angle_deg,
                        distance_mm: 300.0 + depth,
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_ranging_hazard_reported_once_per_scan() {
        let mut config = AnalysisConfig::default();
        config.hazard.enabled = true;
        let mut engine = FusionEngine::new(ConfigStore::new(config).unwrap());
        let handle = engine.ingest_handle();
        handle.submit(SensorKind::Lidar, 0.95, SamplePayload::Lidar(pothole_scan()));

        let first = engine.tick(1.0).unwrap();
        assert_eq!(first.anomalies.len(), 1, "{:?}", first.anomalies);
        let event = &first.anomalies[0];
        assert_eq!(event.kind, AnomalyKind::Pothole);
        assert_eq!(event.source, AnomalySource::Ranging);
        assert_eq!(event.timestamp, 1.0);
        assert!(event.severity >= AnomalyEvent::HIGH_SEVERITY);

        // same scan, still within tolerance
        let second = engine.tick(1.1).unwrap();
        assert!(second.surface_profile.is_some());
        assert!(second.anomalies.is_empty());

        let stats = engine.stats();
        assert_eq!(stats.anomalies, 1);
        assert_eq!(stats.ranging_anomalies, 1);
    }

    #[test]
    fn test_ranging_hazards_off_by_default() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        handle.submit(SensorKind::Lidar, 0.95, SamplePayload::Lidar(pothole_scan()));

        let result = engine.tick(1.0).unwrap();
        assert!(result.surface_profile.is_some());
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_stats_track_late_samples_and_suppressed_runs() {
        let mut engine = engine();
        let handle = engine.ingest_handle();
        let reading = SamplePayload::Accel(AccelReading { x: 0.0, y: 0.0, z: G });
        handle.submit(SensorKind::Accel, 0.02, reading.clone());
        handle.submit(SensorKind::Accel, 0.01, reading);

        for n in 1..=30 {
            let t = n as f64 * 0.1;
            // a lone one-frame dip closes as a too-short run
            let dip = if n == 20 { -1.5 } else { 0.0 };
            feed_tick(&handle, t, move |_| G + dip);
            assert!(engine.tick(t).unwrap().anomalies.is_empty());
        }

        let stats = engine.stats();
        assert_eq!(stats.out_of_order_samples, 1);
        assert_eq!(stats.suppressed_runs.too_short, 1);
        assert_eq!(stats.anomalies, 0);
    }
}
