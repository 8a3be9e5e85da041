//! FusedFrame - Time aligner output
//!
//! One time-aligned composite of the three sensor streams at a target timestamp.

use serde::{Deserialize, Serialize};

use crate::{AccelReading, GpsFix, LidarScan, SensorKind};

/// Fused frame
///
/// Transient: consumed immediately by the analysis stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedFrame {
    /// Frame sequence number (assigned by the engine, monotonically increasing)
    pub frame_id: u64,

    /// Target timestamp (seconds, sensor clock)
    pub timestamp: f64,

    /// Selected or interpolated GPS fix; `None` means `gps_valid=false`
    pub gps: Option<AlignedFix>,

    /// Accelerometer samples within the window, ordered by timestamp
    pub accel_window: Vec<AccelSample>,

    /// Latest LiDAR scan within tolerance; `None` means `lidar_valid=false`
    pub lidar: Option<LidarSnapshot>,

    /// Vehicle speed derived from consecutive fixes
    pub speed_mps: Option<f64>,

    /// Alignment bookkeeping
    pub meta: AlignmentMeta,
}

impl FusedFrame {
    /// Whether a GPS fix within tolerance (or interpolated) is attached
    pub fn gps_valid(&self) -> bool {
        self.gps.is_some()
    }

    /// Whether the accelerometer window holds at least one sample
    pub fn accel_valid(&self) -> bool {
        !self.accel_window.is_empty()
    }

    /// Whether a LiDAR scan within tolerance is attached
    pub fn lidar_valid(&self) -> bool {
        self.lidar.is_some()
    }

    /// Vertical-axis values of the accelerometer window
    pub fn vertical(&self) -> impl Iterator<Item = f64> + '_ {
        self.accel_window.iter().map(|s| s.reading.z)
    }
}

/// GPS fix as attached to a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedFix {
    pub fix: GpsFix,

    /// Timestamp of the source sample (target timestamp when interpolated)
    pub sample_timestamp: f64,

    /// Whether the fix was linearly interpolated between two bracketing fixes
    pub interpolated: bool,
}

/// Accelerometer sample inside a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub timestamp: f64,
    pub reading: AccelReading,
}

/// LiDAR scan attached to a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarSnapshot {
    pub timestamp: f64,
    pub scan: LidarScan,
}

/// Alignment metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMeta {
    /// Sensors without usable data for this frame
    pub missing: Vec<SensorKind>,

    /// Samples purged as stale while building this frame
    pub stale_purged: u32,

    /// Total samples dropped on overflow so far (all buffers)
    pub overflow_dropped: u64,
}
