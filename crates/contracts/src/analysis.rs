//! AnalysisResult - engine output
//!
//! Roughness index, quality label, anomaly events and the per-frame result handed to sinks.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::{AlignedFix, GpsFix, SensorKind};

/// Roughness index
///
/// `Undetermined` is an explicit state and is never treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoughnessIndex {
    Determined(f64),
    Undetermined,
}

impl RoughnessIndex {
    pub fn value(&self) -> Option<f64> {
        match self {
            RoughnessIndex::Determined(v) => Some(*v),
            RoughnessIndex::Undetermined => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        matches!(self, RoughnessIndex::Determined(_))
    }
}

impl fmt::Display for RoughnessIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoughnessIndex::Determined(v) => write!(f, "{v:.3}"),
            RoughnessIndex::Undetermined => f.write_str("undetermined"),
        }
    }
}

/// Road quality label
///
/// The four bands are ordered `Smooth < Fair < Rough < Severe`. `Unknown` is not part
/// of that order: any comparison involving it yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Smooth,
    Fair,
    Rough,
    Severe,
    Unknown,
}

impl QualityLabel {
    /// The four named bands, best first
    pub const BANDS: [QualityLabel; 4] = [
        QualityLabel::Smooth,
        QualityLabel::Fair,
        QualityLabel::Rough,
        QualityLabel::Severe,
    ];

    fn rank(&self) -> Option<u8> {
        match self {
            QualityLabel::Smooth => Some(0),
            QualityLabel::Fair => Some(1),
            QualityLabel::Rough => Some(2),
            QualityLabel::Severe => Some(3),
            QualityLabel::Unknown => None,
        }
    }

    /// 0-100 quality score (higher is better), `None` for `Unknown`
    pub fn score(&self) -> Option<u8> {
        match self {
            QualityLabel::Smooth => Some(90),
            QualityLabel::Fair => Some(60),
            QualityLabel::Rough => Some(30),
            QualityLabel::Severe => Some(10),
            QualityLabel::Unknown => None,
        }
    }

    /// Worse of two labels; a known label wins over `Unknown`
    pub fn worst(self, other: QualityLabel) -> QualityLabel {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => {
                if b > a {
                    other
                } else {
                    self
                }
            }
            (Some(_), None) => self,
            (None, _) => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Smooth => "smooth",
            QualityLabel::Fair => "fair",
            QualityLabel::Rough => "rough",
            QualityLabel::Severe => "severe",
            QualityLabel::Unknown => "unknown",
        }
    }
}

impl PartialOrd for QualityLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly kind, inferred from the sign of the excursion or the ground shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Downward spike
    Pothole,
    /// Upward spike
    Bump,
    /// Mixed shape
    Unknown,
    /// Abrupt step between neighbouring ground points
    Crack,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Pothole => "pothole",
            AnomalyKind::Bump => "bump",
            AnomalyKind::Unknown => "unknown",
            AnomalyKind::Crack => "crack",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor path that raised an anomaly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySource {
    /// Run detector over the accelerometer level
    #[default]
    Vibration,
    /// Ground shape of a single LiDAR scan
    Ranging,
}

/// Coarse severity bucket used for alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Medium,
    High,
}

/// Anomaly event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Timestamp of the peak frame
    pub timestamp: f64,

    /// Fix of the peak frame, if it was geotagged
    pub gps_fix: Option<GpsFix>,

    /// Normalised peak deviation in `[0, 1)`
    pub severity: f64,

    /// Peak deviation from baseline in standard deviations
    ///
    /// For ranging events, the peak in multiples of the detection threshold.
    pub peak_sigma: f64,

    /// Number of consecutive frames over threshold (1 for ranging events)
    pub duration_frames: u32,

    pub kind: AnomalyKind,

    #[serde(default)]
    pub source: AnomalySource,
}

impl AnomalyEvent {
    pub const HIGH_SEVERITY: f64 = 0.5;

    pub fn level(&self) -> SeverityLevel {
        if self.severity >= Self::HIGH_SEVERITY {
            SeverityLevel::High
        } else {
            SeverityLevel::Medium
        }
    }
}

/// Ranging statistics over the ground points of a LiDAR scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceProfile {
    pub mean_distance_mm: f64,
    pub variance_mm2: f64,

    /// Coefficient of variation in percent (`variance / mean * 100`)
    pub roughness: f64,

    pub valid_points: usize,
}

/// Degraded-processing record for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameHealth {
    pub missing_sensors: Vec<SensorKind>,

    /// Stage failures that were absorbed (stage name + message)
    pub stage_faults: Vec<String>,
}

impl FrameHealth {
    pub fn is_degraded(&self) -> bool {
        !self.missing_sensors.is_empty() || !self.stage_faults.is_empty()
    }
}

/// Analysis result - the unit handed to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub frame_id: u64,
    pub timestamp: f64,
    pub gps_fix: Option<AlignedFix>,
    pub speed_mps: Option<f64>,
    pub roughness_index: RoughnessIndex,
    pub quality_label: QualityLabel,
    pub surface_profile: Option<SurfaceProfile>,

    /// Events closed on this frame, in emission order
    pub anomalies: Vec<AnomalyEvent>,

    pub health: FrameHealth,
}
