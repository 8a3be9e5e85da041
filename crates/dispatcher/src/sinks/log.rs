//! LogSink - logs result summary via tracing

use contracts::{AnalysisResult, AsyncResultSink, RoadError};
use tracing::{info, instrument};

/// Sink that logs one line per analysed frame
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_result_summary(&self, result: &AnalysisResult) {
        let position = result
            .gps_fix
            .map(|f| format!("{:.6},{:.6}", f.fix.latitude, f.fix.longitude));

        info!(
            sink = %self.name,
            frame_id = result.frame_id,
            t = result.timestamp,
            label = %result.quality_label,
            roughness = %result.roughness_index,
            speed_mps = ?result.speed_mps,
            position = ?position,
            anomalies = result.anomalies.len(),
            degraded = result.health.is_degraded(),
            "AnalysisResult received"
        );
    }
}

impl AsyncResultSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, result),
        fields(sink = %self.name, frame_id = result.frame_id)
    )]
    async fn write(&mut self, result: &AnalysisResult) -> Result<(), RoadError> {
        self.log_result_summary(result);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), RoadError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), RoadError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
