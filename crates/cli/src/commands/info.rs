//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::EngineSettings;
use fusion_engine::ConfigStore;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    alignment_latency_s: f64,
    analysis: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    match &args.config {
        Some(path) => info!(config = %path.display(), "Loading configuration info"),
        None => info!("Showing built-in configuration"),
    }

    let settings = super::load_settings(args.config.as_deref())?;
    let info = build_config_info(&settings, args)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(settings: &EngineSettings, args: &InfoArgs) -> Result<ConfigInfo> {
    let store = ConfigStore::new(settings.analysis.clone())
        .context("Invalid analysis configuration")?;

    let sinks = if args.sinks {
        settings
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone().into_iter().collect(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConfigInfo {
        version: format!("{:?}", settings.version),
        alignment_latency_s: settings.analysis.alignment_latency_s(),
        analysis: store.entries().into_iter().collect(),
        sinks,
    })
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Road Quality Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Engine");
    println!("   ├─ Version: {}", info.version);
    println!("   └─ Alignment latency: {:.3}s", info.alignment_latency_s);

    // keys are sorted, so sections come out grouped
    let mut current_section = "";
    for (key, value) in &info.analysis {
        let (section, field) = key.split_once('.').unwrap_or(("", key.as_str()));
        if section != current_section {
            println!("\n📐 [{}]", section);
            current_section = section;
        }
        println!("   • {} = {}", field, value);
    }

    if !info.sinks.is_empty() {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
            for (k, v) in &sink.params {
                println!("   │     {} = {}", k, v);
            }
        }
    }

    println!();
}
