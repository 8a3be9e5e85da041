//! HazardSink - alerts on detected anomalies

use std::collections::HashMap;

use contracts::{AnalysisResult, AnomalyEvent, AsyncResultSink, RoadError, SeverityLevel};
use tracing::{info, instrument, warn};

/// Sink that reports anomaly events and ignores clean frames
pub struct HazardSink {
    name: String,
    min_severity: f64,
    reported: u64,
}

impl HazardSink {
    pub fn new(name: impl Into<String>, min_severity: f64) -> Self {
        Self {
            name: name.into(),
            min_severity,
            reported: 0,
        }
    }

    /// Build from sink params
    ///
    /// Recognised keys: `min_severity` (0.0..=1.0, default 0.0)
    pub fn from_params(name: &str, params: &HashMap<String, String>) -> Result<Self, RoadError> {
        let min_severity = match params.get("min_severity") {
            None => 0.0,
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| (0.0..=1.0).contains(v))
                .ok_or_else(|| {
                    RoadError::configuration(
                        format!("sinks.{name}.params.min_severity"),
                        format!("expected a number in [0, 1], got '{raw}'"),
                    )
                })?,
        };
        Ok(Self::new(name, min_severity))
    }

    pub fn reported(&self) -> u64 {
        self.reported
    }

    fn report(&mut self, frame_id: u64, event: &AnomalyEvent) {
        if event.severity < self.min_severity {
            return;
        }
        self.reported += 1;

        let (lat, lon) = event
            .gps_fix
            .map(|f| (f.latitude, f.longitude))
            .unzip();
        match event.level() {
            SeverityLevel::High => warn!(
                sink = %self.name,
                frame_id,
                kind = %event.kind,
                source = ?event.source,
                t = event.timestamp,
                severity = event.severity,
                peak_sigma = event.peak_sigma,
                duration_frames = event.duration_frames,
                lat = ?lat,
                lon = ?lon,
                "Road hazard detected"
            ),
            SeverityLevel::Medium => info!(
                sink = %self.name,
                frame_id,
                kind = %event.kind,
                source = ?event.source,
                t = event.timestamp,
                severity = event.severity,
                peak_sigma = event.peak_sigma,
                duration_frames = event.duration_frames,
                lat = ?lat,
                lon = ?lon,
                "Road anomaly detected"
            ),
        }
    }
}

impl AsyncResultSink for HazardSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "hazard_sink_write",
        skip(self, result),
        fields(sink = %self.name, frame_id = result.frame_id)
    )]
    async fn write(&mut self, result: &AnalysisResult) -> Result<(), RoadError> {
        for event in &result.anomalies {
            self.report(result.frame_id, event);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), RoadError> {
        Ok(())
    }

    #[instrument(name = "hazard_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), RoadError> {
        info!(sink = %self.name, reported = self.reported, "HazardSink closed");
        Ok(())
    }
}
