//! `run` command implementation.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};
use ingestion::{DriveConfig, RoadScript};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    match &args.config {
        Some(path) => info!(config = %path.display(), "Loading configuration"),
        None => info!("No configuration file given, using defaults"),
    }

    let settings = super::load_settings(args.config.as_deref())?;
    let overrides = parse_overrides(&args.overrides)?;

    info!(
        tick_hz = settings.analysis.tick.rate_hz,
        sinks = settings.sinks.len(),
        overrides = overrides.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        // apply the overrides once so a bad key fails the dry run too
        let store = fusion_engine::ConfigStore::new(settings.analysis.clone())
            .context("Invalid analysis configuration")?;
        if !overrides.is_empty() {
            store
                .apply(overrides)
                .context("Configuration override rejected")?;
        }
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    if let Some(port) = (args.metrics_port != 0).then_some(args.metrics_port) {
        observability::init_metrics_only(port)?;
        info!("Metrics endpoint available on port {}", port);
    }

    let pipeline = Pipeline::new(PipelineConfig {
        settings,
        overrides,
        script: RoadScript::demo(),
        drive: DriveConfig {
            seed: args.seed,
            speed_mps: args.speed,
            ..Default::default()
        },
        duration_s: (args.duration > 0.0).then_some(args.duration),
        fast: args.fast,
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames = stats.engine.frames,
        anomalies = stats.engine.anomalies,
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Road Quality finished");
    Ok(())
}

/// Parse `key=value` overrides; values are read as JSON, falling back to a plain string
fn parse_overrides(raw: &[String]) -> Result<Vec<(String, Value)>, CliError> {
    raw.iter()
        .map(|item| {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| CliError::invalid_override(item, "expected KEY=VALUE"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::invalid_override(item, "empty key"));
            }
            let value = value.trim();
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            Ok((key.to_string(), value))
        })
        .collect()
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
