//! Time aligner: merges the three buffers into one fused frame per tick.

use contracts::{
    AccelSample, AlignedFix, AlignmentConfig, AlignmentMeta, FusedFrame, GpsFix, LidarSnapshot,
    RoadError, SensorKind,
};
use tracing::{instrument, trace};

use crate::geo;
use crate::ingest::SampleBuffers;

/// Aligned frame plus the recoverable conditions met while building it
#[derive(Debug)]
pub struct Alignment {
    pub frame: FusedFrame,
    /// `StaleSample` / `MissingSensorData` per invalid sensor
    pub issues: Vec<RoadError>,
}

/// Last fix used for speed derivation
#[derive(Debug, Clone, Copy)]
struct SpeedAnchor {
    timestamp: f64,
    fix: GpsFix,
    speed_mps: Option<f64>,
}

#[derive(Debug, Default)]
pub struct TimeAligner {
    anchor: Option<SpeedAnchor>,
}

impl TimeAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the frame for target timestamp `t` and discard samples no later tick can use
    ///
    /// # Errors
    /// Only `Structural` (poisoned buffer)
    #[instrument(name = "aligner_align", level = "trace", skip(self, buffers, config))]
    pub fn align(
        &mut self,
        buffers: &SampleBuffers,
        t: f64,
        frame_id: u64,
        config: &AlignmentConfig,
    ) -> Result<Alignment, RoadError> {
        let mut meta = AlignmentMeta::default();
        let mut issues = Vec::new();

        let accel_window = {
            let mut buffer = buffers.lock(SensorKind::Accel)?;
            meta.stale_purged += buffer.purge_stale(t) as u32;
            let half = config.accel_window_s / 2.0;
            let window: Vec<AccelSample> = buffer
                .window(t - half, t + half)
                .into_iter()
                .filter_map(|s| {
                    s.as_accel().map(|reading| AccelSample {
                        timestamp: s.timestamp,
                        reading: *reading,
                    })
                })
                .collect();
            buffer.pop_before(t - half);
            window
        };
        if accel_window.is_empty() {
            meta.missing.push(SensorKind::Accel);
            issues.push(RoadError::MissingSensorData {
                kind: SensorKind::Accel,
            });
        }

        let gps = {
            let mut buffer = buffers.lock(SensorKind::Gps)?;
            meta.stale_purged += buffer.purge_stale(t) as u32;
            let selection = select_fix(&buffer, t, config);
            if let Some(before) = buffer.latest_at_or_before(t).map(|s| s.timestamp) {
                buffer.pop_before(before);
            }
            selection
        };
        let gps = match gps {
            Ok(fix) => Some(fix),
            Err(issue) => {
                meta.missing.push(SensorKind::Gps);
                issues.push(issue);
                None
            }
        };

        let lidar = {
            let mut buffer = buffers.lock(SensorKind::Lidar)?;
            meta.stale_purged += buffer.purge_stale(t) as u32;
            let latest = buffer.latest_at_or_before(t).map(|s| (s.timestamp, s.as_lidar().cloned()));
            match latest {
                Some((timestamp, Some(scan))) => {
                    buffer.pop_before(timestamp);
                    let age_s = t - timestamp;
                    if age_s <= config.lidar_tolerance_s {
                        Ok(LidarSnapshot { timestamp, scan })
                    } else {
                        Err(RoadError::StaleSample {
                            kind: SensorKind::Lidar,
                            age_s,
                        })
                    }
                }
                _ => Err(RoadError::MissingSensorData {
                    kind: SensorKind::Lidar,
                }),
            }
        };
        let lidar = match lidar {
            Ok(snapshot) => Some(snapshot),
            Err(issue) => {
                meta.missing.push(SensorKind::Lidar);
                issues.push(issue);
                None
            }
        };

        meta.overflow_dropped = buffers.total_dropped()?;
        let speed_mps = self.update_speed(gps.as_ref(), config);

        trace!(
            frame_id,
            accel = accel_window.len(),
            gps_valid = gps.is_some(),
            lidar_valid = lidar.is_some(),
            "frame aligned"
        );

        Ok(Alignment {
            frame: FusedFrame {
                frame_id,
                timestamp: t,
                gps,
                accel_window,
                lidar,
                speed_mps,
                meta,
            },
            issues,
        })
    }

    /// Speed from the previous distinct fix, reused while the fix does not change
    fn update_speed(&mut self, fix: Option<&AlignedFix>, config: &AlignmentConfig) -> Option<f64> {
        let fix = fix?;
        let anchor = match self.anchor {
            Some(anchor) if fix.sample_timestamp == anchor.timestamp => return anchor.speed_mps,
            Some(anchor) => anchor,
            None => {
                self.anchor = Some(SpeedAnchor {
                    timestamp: fix.sample_timestamp,
                    fix: fix.fix,
                    speed_mps: None,
                });
                return None;
            }
        };

        let dt = fix.sample_timestamp - anchor.timestamp;
        let speed_mps = if dt > 0.0 && dt <= config.gps_max_interpolation_gap_s {
            Some(geo::haversine_m(&anchor.fix, &fix.fix) / dt)
        } else {
            None
        };
        self.anchor = Some(SpeedAnchor {
            timestamp: fix.sample_timestamp,
            fix: fix.fix,
            speed_mps,
        });
        speed_mps
    }
}

/// Latest fix within tolerance, else interpolation between the bracketing fixes
fn select_fix(
    buffer: &crate::buffer::SampleBuffer,
    t: f64,
    config: &AlignmentConfig,
) -> Result<AlignedFix, RoadError> {
    let before = buffer
        .latest_at_or_before(t)
        .and_then(|s| s.as_gps().map(|fix| (s.timestamp, *fix)));

    if let Some((timestamp, fix)) = before {
        if t - timestamp <= config.gps_tolerance_s {
            return Ok(AlignedFix {
                fix,
                sample_timestamp: timestamp,
                interpolated: false,
            });
        }
    }

    let after = buffer
        .earliest_after(t)
        .and_then(|s| s.as_gps().map(|fix| (s.timestamp, *fix)));

    match (before, after) {
        (Some((t0, a)), Some((t1, b))) if t1 - t0 <= config.gps_max_interpolation_gap_s => {
            let ratio = (t - t0) / (t1 - t0);
            Ok(AlignedFix {
                fix: geo::interpolate(&a, &b, ratio),
                sample_timestamp: t,
                interpolated: true,
            })
        }
        (Some((t0, _)), _) => Err(RoadError::StaleSample {
            kind: SensorKind::Gps,
            age_s: t - t0,
        }),
        (None, _) => Err(RoadError::MissingSensorData {
            kind: SensorKind::Gps,
        }),
    }
}
