//! Pipeline statistics and metrics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{AnalysisResult, ResultSink};
use fusion_engine::{DriverStats, EngineStats};
use observability::{AnalysisMetricsAggregator, MetricsSummary};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Tick loop counters
    pub driver: DriverStats,

    /// Engine counters
    pub engine: EngineStats,

    /// Synthetic sensor counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Per-sink dispatch counters
    pub sinks: Vec<(String, dispatcher::MetricsSnapshot)>,

    /// Aggregated analysis results
    pub analysis: MetricsSummary,
}

impl PipelineStats {
    /// Analysed frames per wall-clock second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.engine.frames as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Results lost across all sinks (dropped on a full queue or failed writes)
    pub fn sink_losses(&self) -> u64 {
        self.sinks.iter().map(|(_, s)| s.lost()).sum()
    }

    /// Detector runs closed without an event, all reasons
    pub fn suppressed_runs(&self) -> u64 {
        let runs = self.engine.suppressed_runs;
        runs.too_short + runs.sustained + runs.vibration
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frames analysed: {}", self.engine.frames);
        println!("   ├─ FPS: {:.2}", self.fps());
        println!(
            "   ├─ Anomalies: {} ({} from LiDAR)",
            self.engine.anomalies, self.engine.ranging_anomalies
        );
        let runs = self.engine.suppressed_runs;
        println!(
            "   ├─ Suppressed runs: {} (short {}, sustained {}, vibration {})",
            self.suppressed_runs(),
            runs.too_short,
            runs.sustained,
            runs.vibration
        );
        println!("   ├─ Stage faults: {}", self.engine.stage_faults);
        println!("   ├─ Timing faults: {}", self.driver.timing_faults);
        println!("   └─ Max tick lateness: {:.1}ms", self.driver.max_lateness_ms);

        println!("\n📡 Ingestion");
        println!("   ├─ Samples submitted: {}", self.ingestion.samples_submitted);
        println!("   ├─ Buffer overflows: {}", self.ingestion.samples_overflowed);
        println!("   ├─ Rejected samples: {}", self.ingestion.samples_rejected);
        println!("   ├─ Late samples: {}", self.engine.out_of_order_samples);
        println!(
            "   └─ LiDAR frames: {} decoded, {} failed",
            self.ingestion.frames_decoded, self.ingestion.decode_errors
        );

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, snapshot)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, name, snapshot);
            }
            if self.sink_losses() > 0 {
                println!("   ⚠ {} results never reached their sink", self.sink_losses());
            }
        }

        println!("\n{}", self.analysis);
    }
}

/// Engine sink that feeds the run aggregator
pub struct StatsSink {
    aggregator: Arc<Mutex<AnalysisMetricsAggregator>>,
}

impl StatsSink {
    pub fn new(aggregator: Arc<Mutex<AnalysisMetricsAggregator>>) -> Self {
        Self { aggregator }
    }
}

impl ResultSink for StatsSink {
    fn name(&self) -> &str {
        "stats"
    }

    fn on_result(&mut self, result: &AnalysisResult) {
        if let Ok(mut aggregator) = self.aggregator.lock() {
            aggregator.update(result);
        }
    }
}
