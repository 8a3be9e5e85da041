//! Layered error definitions
//!
//! Categorized by source: ingest / alignment / timing / config / sink / internal state

use thiserror::Error;

use crate::SensorKind;

/// Whether an error may be absorbed by the pipeline or must stop it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Logged and counted; the pipeline keeps running (possibly degraded)
    Recoverable,
    /// Internal invariant violated; surfaced distinctly and stops the pipeline
    Fatal,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum RoadError {
    // ===== Ingest Errors =====
    /// Buffer was full: the oldest sample was dropped to make room
    #[error("buffer overflow for {kind} samples: capacity={capacity}, oldest sample dropped")]
    BufferOverflow { kind: SensorKind, capacity: usize },

    /// Sample is malformed (wrong payload, non-finite values)
    #[error("malformed {kind} sample: {message}")]
    MalformedSample { kind: SensorKind, message: String },

    // ===== Alignment Errors =====
    /// Sample too old to be used for the requested timestamp
    #[error("stale {kind} sample: age {age_s:.3}s exceeds tolerance")]
    StaleSample { kind: SensorKind, age_s: f64 },

    /// No usable sample for a sensor at the requested timestamp
    #[error("missing {kind} data")]
    MissingSensorData { kind: SensorKind },

    // ===== Timing Errors =====
    /// Tick cadence could not be sustained
    #[error("timing fault: tick late by {lateness_ms:.1}ms (period {period_ms:.1}ms)")]
    TimingFault { lateness_ms: f64, period_ms: f64 },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration value, rejected at update time
    #[error("configuration error at '{field}': {message}")]
    Configuration { field: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== Internal Errors =====
    /// Internal state invariant violated
    #[error("structural failure: {message}")]
    Structural { message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoadError {
    /// Create malformed sample error
    pub fn malformed(kind: SensorKind, message: impl Into<String>) -> Self {
        Self::MalformedSample {
            kind,
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create structural failure
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Structural { .. } => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Recoverable,
        }
    }

    /// Shorthand for `severity() == Fatal`
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_structural_is_fatal() {
        assert!(RoadError::structural("poisoned").is_fatal());
        assert!(!RoadError::BufferOverflow {
            kind: SensorKind::Accel,
            capacity: 4
        }
        .is_fatal());
        assert!(!RoadError::TimingFault {
            lateness_ms: 120.0,
            period_ms: 100.0
        }
        .is_fatal());
        assert!(!RoadError::configuration("quality.t1", "bad").is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = RoadError::configuration("quality.t2", "t1 < t2 < t3 required");
        assert_eq!(
            err.to_string(),
            "configuration error at 'quality.t2': t1 < t2 < t3 required"
        );
    }
}
