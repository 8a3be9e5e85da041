//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON settings files
//! - Validate analysis parameters and sink routing
//! - Produce `EngineSettings`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("road.toml")).unwrap();
//! println!("tick rate: {} Hz", settings.analysis.tick.rate_hz);
//! ```

mod parser;
mod validator;

pub use contracts::EngineSettings;
pub use parser::ConfigFormat;

use contracts::RoadError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<EngineSettings, RoadError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<EngineSettings, RoadError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }

    /// Serialize EngineSettings to TOML string
    pub fn to_toml(settings: &EngineSettings) -> Result<String, RoadError> {
        toml::to_string_pretty(settings)
            .map_err(|e| RoadError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize EngineSettings to JSON string
    pub fn to_json(settings: &EngineSettings) -> Result<String, RoadError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| RoadError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, RoadError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            RoadError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| RoadError::config_parse(format!("unsupported config format: .{ext}")))
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, RoadError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
