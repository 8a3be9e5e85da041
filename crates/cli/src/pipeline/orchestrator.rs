//! Pipeline orchestrator - wires the synthetic drive, engine and sinks.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::EngineSettings;
use dispatcher::Dispatcher;
use fusion_engine::{
    ConfigStore, DriverStats, EngineStats, FusionEngine, MonotonicClock, TickDriver,
};
use ingestion::{DriveConfig, MockSensorSource, RoadScript, SyntheticDrive};
use observability::AnalysisMetricsAggregator;
use serde_json::Value;
use tracing::{info, warn};

use super::{PipelineStats, StatsSink};
use crate::error::CliError;

/// How often the mock drivers push new samples
const SOURCE_POLL: Duration = Duration::from_millis(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded settings (analysis parameters and sinks)
    pub settings: EngineSettings,

    /// Key/value overrides applied on top of the settings
    pub overrides: Vec<(String, Value)>,

    /// Road to drive over
    pub script: RoadScript,

    /// Synthetic sensor parameters
    pub drive: DriveConfig,

    /// Drive time limit in seconds (None = whole script)
    pub duration_s: Option<f64>,

    /// Tick back to back instead of following the wall clock
    pub fast: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until the drive ends or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let PipelineConfig {
            settings,
            overrides,
            script,
            drive,
            duration_s,
            fast,
        } = self.config;

        let store =
            ConfigStore::new(settings.analysis).context("Invalid analysis configuration")?;
        if !overrides.is_empty() {
            store
                .apply(overrides)
                .context("Configuration override rejected")?;
        }

        let dispatcher =
            Dispatcher::from_configs(&settings.sinks).context("Failed to create sinks")?;
        let aggregator = Arc::new(Mutex::new(AnalysisMetricsAggregator::new()));

        let mut engine = FusionEngine::new(store);
        engine.register_sink(Box::new(dispatcher.result_sink()));
        engine.register_sink(Box::new(StatsSink::new(Arc::clone(&aggregator))));

        let drive = SyntheticDrive::new(script, drive).context("Invalid road script")?;
        let end_s = duration_s.map_or(drive.end_s(), |d| d.min(drive.end_s()));

        info!(
            end_s,
            sinks = dispatcher.sink_count(),
            mode = if fast { "fast" } else { "realtime" },
            "Starting drive"
        );

        let run = if fast {
            run_fast(engine, drive, end_s, shutdown).await
        } else {
            run_realtime(engine, drive, end_s, shutdown).await
        };

        let sinks = dispatcher.metrics();
        dispatcher.shutdown().await;
        let (driver, engine, ingestion) = run?;

        let analysis = aggregator
            .lock()
            .map(|a| a.summary())
            .map_err(|_| CliError::pipeline_execution("stats aggregator poisoned"))?;

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            driver,
            engine,
            ingestion,
            sinks,
            analysis,
        })
    }
}

type RunOutcome = (DriverStats, EngineStats, ingestion::MetricsSnapshot);

/// Tick on the wall clock while mock drivers push samples in the background
async fn run_realtime<F>(
    engine: FusionEngine,
    drive: SyntheticDrive,
    end_s: f64,
    shutdown: F,
) -> Result<RunOutcome>
where
    F: Future<Output = ()>,
{
    let config = engine.config().snapshot();
    let limit = Duration::from_secs_f64(
        (end_s + config.alignment_latency_s() + config.tick.period_s()).max(0.0),
    );

    let clock = MonotonicClock::new();
    let source = MockSensorSource::new(SOURCE_POLL);
    let source_task = source.start(drive, engine.ingest_handle(), clock);

    let mut driver = TickDriver::new(engine, clock);
    let result = driver
        .run(async {
            tokio::select! {
                _ = shutdown => warn!("Received shutdown signal, stopping drive..."),
                _ = tokio::time::sleep(limit) => info!("Drive complete"),
            }
        })
        .await;

    source.stop();
    let ingestion = source_task.await.context("Mock sensor task failed")?;
    let driver_stats = result.map_err(|e| CliError::pipeline_execution(e.to_string()))?;

    Ok((driver_stats, driver.engine().stats(), ingestion))
}

/// Tick back to back, generating samples just ahead of each tick
async fn run_fast<F>(
    mut engine: FusionEngine,
    mut drive: SyntheticDrive,
    end_s: f64,
    shutdown: F,
) -> Result<RunOutcome>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let config = engine.config().snapshot();
    let period = config.tick.period_s();
    let latency = config.alignment_latency_s();
    let handle = engine.ingest_handle();
    let mut stats = DriverStats::default();

    for k in 1_u64.. {
        let t = k as f64 * period;
        if t > end_s {
            break;
        }

        // let sink workers drain, and observe Ctrl+C between ticks
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping drive...");
                break;
            }
            _ = tokio::task::yield_now() => {}
        }

        drive.emit_until(&handle, t + latency);
        match engine.tick(t) {
            Ok(_) => stats.ticks += 1,
            Err(e) if e.is_fatal() => {
                return Err(CliError::pipeline_execution(e.to_string()).into());
            }
            Err(e) => {
                stats.tick_errors += 1;
                warn!(t, error = %e, "tick failed");
            }
        }
    }

    Ok((stats, engine.stats(), drive.metrics().snapshot()))
}
