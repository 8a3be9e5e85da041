//! Analysis configuration snapshot
//!
//! Immutable once published: the engine takes one snapshot per tick and the
//! configuration store swaps whole snapshots between ticks.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::{RoadError, SensorKind};

/// Full analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalysisConfig {
    #[validate(nested)]
    pub buffer: BufferConfig,

    #[validate(nested)]
    pub alignment: AlignmentConfig,

    #[validate(nested)]
    pub roughness: RoughnessConfig,

    #[validate(nested)]
    pub quality: QualityConfig,

    #[validate(nested)]
    pub profile: ProfileConfig,

    #[validate(nested)]
    pub hazard: HazardConfig,

    #[validate(nested)]
    pub anomaly: AnomalyConfig,

    #[validate(nested)]
    pub tick: TickConfig,
}

impl AnalysisConfig {
    /// Run every rule and map the first violation to a `Configuration` error
    ///
    /// # Errors
    /// `RoadError::Configuration` naming the offending dotted key
    pub fn validate_all(&self) -> Result<(), RoadError> {
        self.validate().map_err(|errors| {
            let (field, message) = first_violation("", &errors)
                .unwrap_or_else(|| (String::from("config"), String::from("invalid value")));
            RoadError::configuration(field, message)
        })
    }

    /// Delay between a sample's acquisition and the earliest tick that can use it
    pub fn alignment_latency_s(&self) -> f64 {
        self.alignment.accel_window_s / 2.0 + self.tick.latency_margin_s
    }
}

/// Collect the first violation in key order, as (dotted path, message)
fn first_violation(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut keys: Vec<_> = errors.errors().keys().collect();
    keys.sort();

    for key in keys {
        let path = match (prefix.is_empty(), key.as_ref()) {
            (true, "__all__") => String::from("config"),
            (false, "__all__") => prefix.to_string(),
            (true, k) => k.to_string(),
            (false, k) => format!("{prefix}.{k}"),
        };
        match &errors.errors()[key] {
            ValidationErrorsKind::Field(list) => {
                if let Some(err) = list.first() {
                    return Some((path, describe(err)));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(&path, inner) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(&format!("{path}[{idx}]"), inner) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn describe(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    let mut text = format!("failed rule '{}'", err.code);
    let mut bounds: Vec<_> = err
        .params
        .iter()
        .filter(|(k, _)| k.as_ref() != "value")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    bounds.sort();
    if !bounds.is_empty() {
        text.push_str(&format!(" ({})", bounds.join(", ")));
    }
    text
}

fn violation(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn require_finite(values: &[(&'static str, f64)]) -> Result<(), ValidationError> {
    match values.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, _)) => Err(violation("finite", format!("{name} must be finite"))),
        None => Ok(()),
    }
}

/// Per-sensor buffer sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_buffer"))]
pub struct BufferConfig {
    #[validate(range(min = 1))]
    pub accel_capacity: usize,

    #[validate(range(min = 1))]
    pub gps_capacity: usize,

    #[validate(range(min = 1))]
    pub lidar_capacity: usize,

    /// Samples older than this (relative to the newest access time) are purged
    #[validate(range(exclusive_min = 0.0))]
    pub staleness_s: f64,
}

impl BufferConfig {
    pub fn capacity(&self, kind: SensorKind) -> usize {
        match kind {
            SensorKind::Accel => self.accel_capacity,
            SensorKind::Gps => self.gps_capacity,
            SensorKind::Lidar => self.lidar_capacity,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            accel_capacity: 500,
            gps_capacity: 16,
            lidar_capacity: 64,
            staleness_s: 5.0,
        }
    }
}

fn validate_buffer(cfg: &BufferConfig) -> Result<(), ValidationError> {
    require_finite(&[("staleness_s", cfg.staleness_s)])
}

/// Time aligner windows and tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_alignment"))]
pub struct AlignmentConfig {
    /// Accelerometer window duration `w`; the window is `[t - w/2, t + w/2]`
    #[validate(range(exclusive_min = 0.0))]
    pub accel_window_s: f64,

    #[validate(range(exclusive_min = 0.0))]
    pub gps_tolerance_s: f64,

    /// Largest gap between two fixes that may still be interpolated
    #[validate(range(exclusive_min = 0.0))]
    pub gps_max_interpolation_gap_s: f64,

    #[validate(range(exclusive_min = 0.0))]
    pub lidar_tolerance_s: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            accel_window_s: 0.1,
            gps_tolerance_s: 1.5,
            gps_max_interpolation_gap_s: 5.0,
            lidar_tolerance_s: 0.5,
        }
    }
}

fn validate_alignment(cfg: &AlignmentConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("accel_window_s", cfg.accel_window_s),
        ("gps_tolerance_s", cfg.gps_tolerance_s),
        ("gps_max_interpolation_gap_s", cfg.gps_max_interpolation_gap_s),
        ("lidar_tolerance_s", cfg.lidar_tolerance_s),
    ])
}

/// Roughness estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_roughness"))]
pub struct RoughnessConfig {
    /// Cut-off of the low-pass trend removed from the vertical axis
    #[validate(range(exclusive_min = 0.0))]
    pub lowpass_cutoff_hz: f64,

    #[validate(range(min = 2))]
    pub min_samples: usize,

    pub speed_normalization: bool,

    #[validate(range(exclusive_min = 0.0))]
    pub reference_speed_mps: f64,

    /// Below this speed the index is left un-normalised
    #[validate(range(min = 0.0))]
    pub min_speed_mps: f64,
}

impl Default for RoughnessConfig {
    fn default() -> Self {
        Self {
            lowpass_cutoff_hz: 1.0,
            min_samples: 4,
            speed_normalization: true,
            reference_speed_mps: 10.0,
            min_speed_mps: 2.0,
        }
    }
}

fn validate_roughness(cfg: &RoughnessConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("lowpass_cutoff_hz", cfg.lowpass_cutoff_hz),
        ("reference_speed_mps", cfg.reference_speed_mps),
        ("min_speed_mps", cfg.min_speed_mps),
    ])
}

/// Quality band thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_quality"))]
pub struct QualityConfig {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,

    /// Fuse the LiDAR surface profile label into the final label (worse of both)
    pub use_surface_profile: bool,

    pub profile_t1: f64,
    pub profile_t2: f64,
    pub profile_t3: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            t1: 0.5,
            t2: 1.2,
            t3: 2.5,
            use_surface_profile: false,
            profile_t1: 3.0,
            profile_t2: 7.0,
            profile_t3: 15.0,
        }
    }
}

fn validate_quality(cfg: &QualityConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("t1", cfg.t1),
        ("t2", cfg.t2),
        ("t3", cfg.t3),
        ("profile_t1", cfg.profile_t1),
        ("profile_t2", cfg.profile_t2),
        ("profile_t3", cfg.profile_t3),
    ])?;
    if !(cfg.t1 < cfg.t2 && cfg.t2 < cfg.t3) {
        return Err(violation(
            "monotonic_thresholds",
            format!(
                "t1 < t2 < t3 required (got {}, {}, {})",
                cfg.t1, cfg.t2, cfg.t3
            ),
        ));
    }
    if !(cfg.profile_t1 < cfg.profile_t2 && cfg.profile_t2 < cfg.profile_t3) {
        return Err(violation(
            "monotonic_thresholds",
            format!(
                "profile_t1 < profile_t2 < profile_t3 required (got {}, {}, {})",
                cfg.profile_t1, cfg.profile_t2, cfg.profile_t3
            ),
        ));
    }
    Ok(())
}

/// Ground-point selection for the LiDAR surface profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_profile"))]
pub struct ProfileConfig {
    /// Angles are folded into `(-180, 180]` before the range check
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,

    pub min_distance_mm: f64,
    pub max_distance_mm: f64,

    #[validate(range(min = 1))]
    pub min_valid_points: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_angle_deg: -45.0,
            max_angle_deg: 45.0,
            min_distance_mm: 50.0,
            max_distance_mm: 1000.0,
            min_valid_points: 10,
        }
    }
}

fn validate_profile(cfg: &ProfileConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("min_angle_deg", cfg.min_angle_deg),
        ("max_angle_deg", cfg.max_angle_deg),
        ("min_distance_mm", cfg.min_distance_mm),
        ("max_distance_mm", cfg.max_distance_mm),
    ])?;
    if cfg.min_angle_deg >= cfg.max_angle_deg {
        return Err(violation(
            "angle_range",
            "min_angle_deg must be below max_angle_deg",
        ));
    }
    if cfg.min_distance_mm >= cfg.max_distance_mm {
        return Err(violation(
            "distance_range",
            "min_distance_mm must be below max_distance_mm",
        ));
    }
    Ok(())
}

/// Anomaly detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_anomaly"))]
pub struct AnomalyConfig {
    /// Rolling baseline length `N` (frames)
    #[validate(range(min = 2))]
    pub baseline_frames: usize,

    /// Frames required before detection starts
    #[validate(range(min = 2))]
    pub min_baseline_frames: usize,

    /// Deviation threshold in standard deviations
    #[validate(range(exclusive_min = 0.0))]
    pub k: f64,

    /// Shortest run that counts as an event (`m`)
    #[validate(range(min = 1))]
    pub min_duration_frames: u32,

    /// Longest run that still counts as an event (`M`)
    #[validate(range(min = 1))]
    pub max_duration_frames: u32,

    /// Floor applied to the baseline standard deviation
    #[validate(range(exclusive_min = 0.0))]
    pub min_sigma: f64,

    /// Minor/major sign-energy ratio at or above which the shape is ambiguous
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub ambiguity_ratio: f64,

    /// Fraction of the frame's residual RMS used as a floor under σ
    #[validate(range(min = 0.0))]
    pub vibration_sigma_ratio: f64,

    /// A run's peak deviation must reach this multiple of its residual RMS
    #[validate(range(min = 0.0))]
    pub min_peak_to_vibration: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            baseline_frames: 50,
            min_baseline_frames: 10,
            k: 4.0,
            min_duration_frames: 2,
            max_duration_frames: 10,
            min_sigma: 0.02,
            ambiguity_ratio: 0.5,
            vibration_sigma_ratio: 0.1,
            min_peak_to_vibration: 3.0,
        }
    }
}

fn validate_anomaly(cfg: &AnomalyConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("k", cfg.k),
        ("min_sigma", cfg.min_sigma),
        ("ambiguity_ratio", cfg.ambiguity_ratio),
        ("vibration_sigma_ratio", cfg.vibration_sigma_ratio),
        ("min_peak_to_vibration", cfg.min_peak_to_vibration),
    ])?;
    if cfg.min_duration_frames > cfg.max_duration_frames {
        return Err(violation(
            "duration_range",
            format!(
                "min_duration_frames ({}) must not exceed max_duration_frames ({})",
                cfg.min_duration_frames, cfg.max_duration_frames
            ),
        ));
    }
    if cfg.min_baseline_frames > cfg.baseline_frames {
        return Err(violation(
            "baseline_range",
            format!(
                "min_baseline_frames ({}) must not exceed baseline_frames ({})",
                cfg.min_baseline_frames, cfg.baseline_frames
            ),
        ));
    }
    Ok(())
}

/// LiDAR ground hazard thresholds
///
/// Deviations are measured against the median ground distance of one scan;
/// positive is further from the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_hazard"))]
pub struct HazardConfig {
    /// Ranging hazards join the frame's anomalies
    pub enabled: bool,

    #[validate(range(exclusive_min = 0.0))]
    pub pothole_depth_mm: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub bump_height_mm: f64,
    /// Step between neighbouring ground points that reads as a crack
    #[validate(range(exclusive_min = 0.0))]
    pub crack_step_mm: f64,

    pub high_pothole_depth_mm: f64,
    pub high_bump_height_mm: f64,

    /// Largest index gap still joining two flagged points into one cluster
    #[validate(range(min = 1))]
    pub max_gap: usize,
    #[validate(range(min = 1))]
    pub min_cluster_points: usize,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pothole_depth_mm: 30.0,
            bump_height_mm: 20.0,
            crack_step_mm: 15.0,
            high_pothole_depth_mm: 50.0,
            high_bump_height_mm: 30.0,
            max_gap: 2,
            min_cluster_points: 2,
        }
    }
}

fn validate_hazard(cfg: &HazardConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("pothole_depth_mm", cfg.pothole_depth_mm),
        ("bump_height_mm", cfg.bump_height_mm),
        ("crack_step_mm", cfg.crack_step_mm),
        ("high_pothole_depth_mm", cfg.high_pothole_depth_mm),
        ("high_bump_height_mm", cfg.high_bump_height_mm),
    ])?;
    if cfg.high_pothole_depth_mm <= cfg.pothole_depth_mm
        || cfg.high_bump_height_mm <= cfg.bump_height_mm
    {
        return Err(violation(
            "severity_range",
            "high-severity thresholds must exceed the detection thresholds",
        ));
    }
    Ok(())
}

/// Tick cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_tick"))]
pub struct TickConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub rate_hz: f64,

    /// Extra delay added to the alignment latency
    #[validate(range(min = 0.0))]
    pub latency_margin_s: f64,
}

impl TickConfig {
    pub fn period_s(&self) -> f64 {
        1.0 / self.rate_hz
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10.0,
            latency_margin_s: 0.0,
        }
    }
}

fn validate_tick(cfg: &TickConfig) -> Result<(), ValidationError> {
    require_finite(&[
        ("rate_hz", cfg.rate_hz),
        ("latency_margin_s", cfg.latency_margin_s),
    ])
}
