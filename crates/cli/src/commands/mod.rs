//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use contracts::{EngineSettings, SinkConfig, SinkType};

use crate::error::CliError;

/// Load settings from `path`, or built-in defaults with a log and a hazard sink
fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let Some(path) = path else {
        return Ok(EngineSettings {
            sinks: default_sinks(),
            ..Default::default()
        });
    };

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }

    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![
        SinkConfig {
            name: "log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 256,
            params: HashMap::new(),
        },
        SinkConfig {
            name: "hazards".to_string(),
            sink_type: SinkType::Hazard,
            queue_capacity: 64,
            params: HashMap::new(),
        },
    ]
}
