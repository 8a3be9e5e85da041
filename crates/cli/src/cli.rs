//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Road Quality - road-surface sensor fusion engine
#[derive(Parser, Debug)]
#[command(
    name = "road-quality",
    author,
    version,
    about = "Road-surface quality and anomaly analysis from fused vehicle sensors",
    long_about = "Fuses accelerometer, GPS and LiDAR streams on a fixed tick grid.\n\n\
                  Each tick yields a roughness index, a quality label and any detected \n\
                  pothole/bump events, dispatched to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "ROAD_QUALITY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "ROAD_QUALITY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine over a synthetic drive
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to settings file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "ROAD_QUALITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override a configuration key, e.g. `--set quality.t1=0.4` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Stop after this many seconds of drive time (0 = whole script)
    #[arg(long, default_value = "0", env = "ROAD_QUALITY_DURATION")]
    pub duration: f64,

    /// Seed of the synthetic sensor noise
    #[arg(long, default_value = "7")]
    pub seed: u64,

    /// Vehicle speed of the synthetic drive (m/s)
    #[arg(long, default_value = "10.0")]
    pub speed: f64,

    /// Run ticks back to back instead of following the wall clock
    #[arg(long)]
    pub fast: bool,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "ROAD_QUALITY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to settings file to validate
    #[arg(short, long, default_value = "road.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to settings file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
