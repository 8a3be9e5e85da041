//! Roughness estimator over the vertical accelerometer axis.
//!
//! The slow component (gravity, slope, body pitch) is tracked by a first-order
//! low-pass filter seeded with the window mean; the index is the RMS of what is
//! left, optionally scaled to a reference speed.

use std::f64::consts::PI;

use contracts::{FusedFrame, RoadError, RoughnessConfig, RoughnessIndex, SensorKind};

/// Per-frame estimator output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoughnessEstimate {
    pub index: RoughnessIndex,

    /// RMS residual before speed normalisation (m/s²)
    pub rms: Option<f64>,

    /// Mean vertical acceleration of the window, signed (m/s²)
    pub level: Option<f64>,
}

impl RoughnessEstimate {
    pub fn undetermined() -> Self {
        Self {
            index: RoughnessIndex::Undetermined,
            rms: None,
            level: None,
        }
    }
}

/// Estimate roughness for one fused frame
///
/// # Errors
/// `MalformedSample` when the window holds non-finite values
pub fn estimate(frame: &FusedFrame, config: &RoughnessConfig) -> Result<RoughnessEstimate, RoadError> {
    if !frame.accel_valid() {
        return Ok(RoughnessEstimate::undetermined());
    }
    if let Some(bad) = frame.accel_window.iter().find(|s| !s.reading.z.is_finite()) {
        return Err(RoadError::malformed(
            SensorKind::Accel,
            format!("non-finite vertical acceleration at t={:.3}", bad.timestamp),
        ));
    }

    let n = frame.accel_window.len() as f64;
    let level = frame.vertical().sum::<f64>() / n;

    if frame.accel_window.len() < config.min_samples {
        return Ok(RoughnessEstimate {
            index: RoughnessIndex::Undetermined,
            rms: None,
            level: Some(level),
        });
    }

    let rms = residual_rms(frame, level, config.lowpass_cutoff_hz);
    let index = match frame.speed_mps {
        Some(speed) if config.speed_normalization && speed >= config.min_speed_mps && speed > 0.0 => {
            rms * config.reference_speed_mps / speed
        }
        _ => rms,
    };

    Ok(RoughnessEstimate {
        index: RoughnessIndex::Determined(index),
        rms: Some(rms),
        level: Some(level),
    })
}

/// RMS of the vertical signal after removing the low-pass trend
fn residual_rms(frame: &FusedFrame, seed: f64, cutoff_hz: f64) -> f64 {
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let mut trend = seed;
    let mut last_t: Option<f64> = None;
    let mut sum_sq = 0.0;

    for sample in &frame.accel_window {
        let dt = last_t.map_or(0.0, |prev| (sample.timestamp - prev).max(0.0));
        last_t = Some(sample.timestamp);

        let alpha = dt / (rc + dt);
        trend += alpha * (sample.reading.z - trend);
        let residual = sample.reading.z - trend;
        sum_sq += residual * residual;
    }

    (sum_sq / frame.accel_window.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AccelReading, AccelSample, AlignmentMeta};

    fn frame_from(values: &[f64], speed_mps: Option<f64>) -> FusedFrame {
        FusedFrame {
            frame_id: 1,
            timestamp: 0.05,
            gps: None,
            accel_window: values
                .iter()
                .enumerate()
                .map(|(i, z)| AccelSample {
                    timestamp: 0.005 + i as f64 * 0.01,
                    reading: AccelReading { x: 0.0, y: 0.0, z: *z },
                })
                .collect(),
            lidar: None,
            speed_mps,
            meta: AlignmentMeta::default(),
        }
    }

    fn vibration(amplitude: f64) -> Vec<f64> {
        (0..10)
            .map(|i| 9.81 + amplitude * (2.0 * PI * 20.0 * (0.005 + i as f64 * 0.01)).sin())
            .collect()
    }

    #[test]
    fn test_flat_signal_is_zero() {
        let est = estimate(&frame_from(&[9.81; 10], None), &RoughnessConfig::default()).unwrap();
        assert!(est.index.value().unwrap() < 1e-9);
        assert!((est.level.unwrap() - 9.81).abs() < 1e-12);
    }

    #[test]
    fn test_empty_window_is_undetermined() {
        let est = estimate(&frame_from(&[], None), &RoughnessConfig::default()).unwrap();
        assert_eq!(est.index, RoughnessIndex::Undetermined);
        assert!(est.level.is_none());
    }

    #[test]
    fn test_too_few_samples_is_undetermined() {
        let est = estimate(&frame_from(&[9.8, 9.9], None), &RoughnessConfig::default()).unwrap();
        assert_eq!(est.index, RoughnessIndex::Undetermined);
        assert!(est.level.is_some());
    }

    #[test]
    fn test_monotonic_in_amplitude() {
        let config = RoughnessConfig::default();
        let mut previous = 0.0;
        for step in 0..8 {
            let amplitude = step as f64 * 0.25;
            let value = estimate(&frame_from(&vibration(amplitude), None), &config)
                .unwrap()
                .index
                .value()
                .unwrap();
            assert!(value >= previous, "amplitude {amplitude}: {value} < {previous}");
            previous = value;
        }
        assert!(previous > 0.5);
    }

    #[test]
    fn test_speed_normalisation() {
        let config = RoughnessConfig::default();
        let raw = estimate(&frame_from(&vibration(1.0), None), &config).unwrap();
        let fast = estimate(&frame_from(&vibration(1.0), Some(20.0)), &config).unwrap();
        let crawl = estimate(&frame_from(&vibration(1.0), Some(1.0)), &config).unwrap();

        let raw = raw.index.value().unwrap();
        assert!((fast.index.value().unwrap() - raw / 2.0).abs() < 1e-12);
        // below min_speed_mps the index stays per unit time
        assert_eq!(crawl.index.value().unwrap(), raw);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut frame = frame_from(&[9.81; 6], None);
        frame.accel_window[3].reading.z = f64::NAN;
        assert!(estimate(&frame, &RoughnessConfig::default()).is_err());
    }
}
