//! Scripted road surfaces for synthetic drives.

use std::f64::consts::PI;

use crate::error::{IngestionError, Result};

/// Surface under one stretch of road
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    Smooth,
    /// Sinusoidal vertical excitation (m/s², Hz)
    Rough { amplitude: f64, frequency_hz: f64 },
    /// Half-sine dip of the given depth (m/s²)
    Pothole { depth: f64 },
    /// Half-sine crest of the given height (m/s²)
    Bump { height: f64 },
    /// Narrow slot under the forward beam; felt by the ranging sensor only (mm)
    Crack { step_mm: f64 },
}

/// Half-width of the patch a pothole or bump covers in front of the vehicle
const HAZARD_HALF_WIDTH_DEG: f64 = 12.0;

/// Half-width of a crack, narrower than the beam spacing of a 120-point scan
const CRACK_HALF_WIDTH_DEG: f64 = 1.5;

/// Angle folded into `(-180, 180]`, zero straight ahead
fn forward_angle(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub duration_s: f64,
}

/// Ordered list of road segments, traversed from time zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadScript {
    segments: Vec<Segment>,
}

impl RoadScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn smooth(self, duration_s: f64) -> Self {
        self.then(SegmentKind::Smooth, duration_s)
    }

    pub fn rough(self, duration_s: f64, amplitude: f64, frequency_hz: f64) -> Self {
        self.then(
            SegmentKind::Rough {
                amplitude,
                frequency_hz,
            },
            duration_s,
        )
    }

    pub fn pothole(self, duration_s: f64, depth: f64) -> Self {
        self.then(SegmentKind::Pothole { depth }, duration_s)
    }

    pub fn bump(self, duration_s: f64, height: f64) -> Self {
        self.then(SegmentKind::Bump { height }, duration_s)
    }

    pub fn crack(self, duration_s: f64, step_mm: f64) -> Self {
        self.then(SegmentKind::Crack { step_mm }, duration_s)
    }

    pub fn then(mut self, kind: SegmentKind, duration_s: f64) -> Self {
        self.segments.push(Segment { kind, duration_s });
        self
    }

    /// Two minutes of mixed road used by the demo drive
    pub fn demo() -> Self {
        Self::new()
            .smooth(20.0)
            .pothole(0.4, 3.0)
            .smooth(15.0)
            .rough(20.0, 1.6, 18.0)
            .smooth(15.0)
            .bump(0.3, 2.5)
            .smooth(10.0)
            .rough(15.0, 3.2, 22.0)
            .smooth(24.3)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn duration_s(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_s).sum()
    }

    /// Check every segment has a positive duration and finite parameters
    ///
    /// # Errors
    /// `InvalidScript` naming the first bad segment
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(IngestionError::invalid_script("script has no segments"));
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if !(segment.duration_s.is_finite() && segment.duration_s > 0.0) {
                return Err(IngestionError::invalid_script(format!(
                    "segment {idx}: duration must be > 0, got {}",
                    segment.duration_s
                )));
            }
            let finite = match segment.kind {
                SegmentKind::Smooth => true,
                SegmentKind::Rough {
                    amplitude,
                    frequency_hz,
                } => amplitude.is_finite() && frequency_hz.is_finite() && frequency_hz > 0.0,
                SegmentKind::Pothole { depth } => depth.is_finite(),
                SegmentKind::Bump { height } => height.is_finite(),
                SegmentKind::Crack { step_mm } => step_mm.is_finite() && step_mm > 0.0,
            };
            if !finite {
                return Err(IngestionError::invalid_script(format!(
                    "segment {idx}: invalid parameters {:?}",
                    segment.kind
                )));
            }
        }
        Ok(())
    }

    /// Segment under script time `s`, with the offset into it
    pub fn segment_at(&self, s: f64) -> Option<(&Segment, f64)> {
        if s < 0.0 {
            return None;
        }
        let mut start = 0.0;
        for segment in &self.segments {
            if s < start + segment.duration_s {
                return Some((segment, s - start));
            }
            start += segment.duration_s;
        }
        None
    }

    /// Vertical acceleration added by the surface at script time `s` (m/s²)
    pub fn vertical_excitation(&self, s: f64) -> f64 {
        let Some((segment, offset)) = self.segment_at(s) else {
            return 0.0;
        };
        let phase = offset / segment.duration_s;
        match segment.kind {
            SegmentKind::Smooth => 0.0,
            SegmentKind::Rough {
                amplitude,
                frequency_hz,
            } => amplitude * (2.0 * PI * frequency_hz * offset).sin(),
            SegmentKind::Pothole { depth } => -depth * (PI * phase).sin(),
            SegmentKind::Bump { height } => height * (PI * phase).sin(),
            SegmentKind::Crack { .. } => 0.0,
        }
    }

    /// Change in sensor-to-ground range at script time `s` (mm, positive = farther)
    ///
    /// Potholes and bumps cover a patch straight ahead, cracks a single beam.
    pub fn range_offset_mm(&self, s: f64, angle_deg: f64) -> f64 {
        let Some((segment, offset)) = self.segment_at(s) else {
            return 0.0;
        };
        let phase = offset / segment.duration_s;
        let ahead = forward_angle(angle_deg).abs();
        match segment.kind {
            SegmentKind::Smooth => 0.0,
            SegmentKind::Rough { amplitude, .. } => {
                amplitude * 25.0 * (angle_deg.to_radians() * 9.0 + offset * 5.0).sin()
            }
            SegmentKind::Pothole { depth } if ahead <= HAZARD_HALF_WIDTH_DEG => {
                depth * 40.0 * (PI * phase).sin()
            }
            SegmentKind::Bump { height } if ahead <= HAZARD_HALF_WIDTH_DEG => {
                -height * 40.0 * (PI * phase).sin()
            }
            SegmentKind::Crack { step_mm } if ahead < CRACK_HALF_WIDTH_DEG => step_mm,
            SegmentKind::Pothole { .. } | SegmentKind::Bump { .. } | SegmentKind::Crack { .. } => {
                0.0
            }
        }
    }
}
