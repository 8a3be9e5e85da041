//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::EngineSettings;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    tick_rate_hz: f64,
    thresholds: [f64; 3],
    surface_profile_fused: bool,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(settings) => {
            let warnings = collect_warnings(&settings);
            let quality = &settings.analysis.quality;

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", settings.version),
                    tick_rate_hz: settings.analysis.tick.rate_hz,
                    thresholds: [quality.t1, quality.t2, quality.t3],
                    surface_profile_fused: quality.use_surface_profile,
                    sink_count: settings.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(settings: &EngineSettings) -> Vec<String> {
    let mut warnings = Vec::new();
    let analysis = &settings.analysis;

    if settings.sinks.is_empty() {
        warnings.push("No sinks configured - results only reach metrics".to_string());
    }

    let period = analysis.tick.period_s();
    if analysis.alignment.accel_window_s > period {
        warnings.push(format!(
            "alignment.accel_window_s ({}s) exceeds the tick period ({:.3}s) - consecutive windows overlap",
            analysis.alignment.accel_window_s, period
        ));
    }

    let warm_up = analysis.anomaly.min_baseline_frames as f64 * period;
    if warm_up > 10.0 {
        warnings.push(format!(
            "anomaly detection starts only after {warm_up:.1}s of driving"
        ));
    }

    if analysis.buffer.staleness_s < analysis.alignment.gps_max_interpolation_gap_s {
        warnings.push(format!(
            "buffer.staleness_s ({}s) is shorter than alignment.gps_max_interpolation_gap_s ({}s) - wide GPS gaps are purged before they can be interpolated",
            analysis.buffer.staleness_s, analysis.alignment.gps_max_interpolation_gap_s
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Tick rate: {} Hz", summary.tick_rate_hz);
            println!(
                "  Thresholds: {} / {} / {}",
                summary.thresholds[0], summary.thresholds[1], summary.thresholds[2]
            );
            println!("  Surface profile fused: {}", summary.surface_profile_fused);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_reports_summary() {
        let file = write_config("[tick]\nrate_hz = 5.0\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });

        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.tick_rate_hz, 5.0);
        assert_eq!(summary.sink_count, 0);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No sinks")));
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let file = write_config("[quality]\nt1 = 2.0\nt2 = 1.0\nt3 = 3.0\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });

        assert!(!result.valid);
        assert!(result.error.unwrap().contains("quality"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_config(&ValidateArgs {
            config: dir.path().join("absent.toml"),
            json: false,
        });
        assert!(!result.valid);
    }

    #[test]
    fn test_overlapping_window_warning() {
        let file = write_config("[alignment]\naccel_window_s = 0.3\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("overlap")));
    }
}
