//! Anomaly detector.
//!
//! Tracks a rolling baseline of the per-frame vertical level and looks for short
//! excursions beyond `k` standard deviations. Runs shorter than `m` frames are
//! noise; runs longer than `M` frames are sustained sections and feed the
//! baseline instead of producing events.
//!
//! On a vibrating surface the frame level swings with the phase of the
//! vibration inside each window. The per-frame residual RMS puts a floor under
//! σ, and a closed run must stand clear of the vibration it rode on before it
//! becomes an event.

use std::collections::VecDeque;

use contracts::{AnomalyConfig, AnomalyEvent, AnomalyKind, AnomalySource, GpsFix};
use tracing::{debug, trace};

/// What the detector needs from one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameObservation {
    pub timestamp: f64,
    /// Signed frame level; `None` when the accelerometer window was empty
    pub level: Option<f64>,
    /// Residual RMS of the same window, m/s²
    pub vibration: Option<f64>,
    pub gps_fix: Option<GpsFix>,
}

#[derive(Debug, Clone, Copy)]
struct RunFrame {
    timestamp: f64,
    gps_fix: Option<GpsFix>,
    level: f64,
    deviation: f64,
    sigma_dev: f64,
    vibration: f64,
}

/// Excursion in progress; baseline statistics are frozen at its start
#[derive(Debug, Clone)]
struct Run {
    mean: f64,
    sigma: f64,
    frames: Vec<RunFrame>,
}

#[derive(Debug, Default)]
pub struct AnomalyDetector {
    baseline: VecDeque<f64>,
    run: Option<Run>,
    counters: DetectorCounters,
}

/// Runs that did not become events, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorCounters {
    /// Longer than the maximum duration; re-seeded the baseline
    pub sustained: u64,
    /// Shorter than the minimum duration
    pub too_short: u64,
    /// Peak within the vibration envelope of the run
    pub vibration: u64,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame; returns an event when a qualifying run closes on this frame
    pub fn observe(
        &mut self,
        obs: FrameObservation,
        config: &AnomalyConfig,
    ) -> Option<AnomalyEvent> {
        let level = obs.level?;
        if !level.is_finite() {
            return None;
        }

        let (mean, sigma) = match &self.run {
            Some(run) => (run.mean, run.sigma),
            None => {
                if self.baseline.len() < config.min_baseline_frames {
                    self.push_baseline(level, config);
                    return None;
                }
                self.baseline_stats(config)
            }
        };

        let vibration = obs.vibration.filter(|v| v.is_finite()).unwrap_or(0.0);
        let sigma_eff = sigma.max(config.vibration_sigma_ratio * vibration);
        let deviation = level - mean;
        let sigma_dev = deviation.abs() / sigma_eff;

        if sigma_dev > config.k {
            let run = self.run.get_or_insert_with(|| Run {
                mean,
                sigma,
                frames: Vec::new(),
            });
            run.frames.push(RunFrame {
                timestamp: obs.timestamp,
                gps_fix: obs.gps_fix,
                level,
                deviation,
                sigma_dev,
                vibration,
            });
            trace!(sigma_dev, run_len = run.frames.len(), "excursion");

            if run.frames.len() > config.max_duration_frames as usize {
                self.absorb_sustained(config);
            }
            return None;
        }

        let event = self.run.take().and_then(|run| self.close_run(run, config));
        self.push_baseline(level, config);
        event
    }

    pub fn counters(&self) -> DetectorCounters {
        self.counters
    }

    fn push_baseline(&mut self, level: f64, config: &AnomalyConfig) {
        self.baseline.push_back(level);
        while self.baseline.len() > config.baseline_frames {
            self.baseline.pop_front();
        }
    }

    fn baseline_stats(&self, config: &AnomalyConfig) -> (f64, f64) {
        let n = self.baseline.len() as f64;
        let mean = self.baseline.iter().sum::<f64>() / n;
        let variance = self.baseline.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, variance.sqrt().max(config.min_sigma))
    }

    /// A sustained section becomes the new baseline
    fn absorb_sustained(&mut self, config: &AnomalyConfig) {
        if let Some(run) = self.run.take() {
            debug!(
                frames = run.frames.len(),
                start = run.frames.first().map(|f| f.timestamp),
                "sustained excursion re-seeds baseline"
            );
            self.counters.sustained += 1;
            self.baseline.clear();
            for frame in &run.frames {
                self.push_baseline(frame.level, config);
            }
        }
    }

    fn close_run(&mut self, run: Run, config: &AnomalyConfig) -> Option<AnomalyEvent> {
        let len = run.frames.len() as u32;
        if len < config.min_duration_frames || len > config.max_duration_frames {
            self.counters.too_short += 1;
            trace!(len, "excursion too short");
            return None;
        }

        let peak = run
            .frames
            .iter()
            .max_by(|a, b| a.sigma_dev.total_cmp(&b.sigma_dev))?;

        let vibration = (run.frames.iter().map(|f| f.vibration.powi(2)).sum::<f64>()
            / run.frames.len() as f64)
            .sqrt();
        if peak.deviation.abs() < config.min_peak_to_vibration * vibration {
            self.counters.vibration += 1;
            debug!(
                peak = peak.deviation,
                vibration, "excursion inside vibration envelope"
            );
            return None;
        }

        let severity = 1.0 - (-(peak.sigma_dev - config.k) / config.k).exp();
        let kind = classify_shape(&run.frames, config.ambiguity_ratio);

        Some(AnomalyEvent {
            timestamp: peak.timestamp,
            gps_fix: peak.gps_fix,
            severity: severity.clamp(0.0, 1.0),
            peak_sigma: peak.sigma_dev,
            duration_frames: len,
            kind,
            source: AnomalySource::Vibration,
        })
    }
}

/// Sign dominance of the deviation energy
fn classify_shape(frames: &[RunFrame], ambiguity_ratio: f64) -> AnomalyKind {
    let (down, up) = frames.iter().fold((0.0, 0.0), |(down, up), f| {
        if f.deviation < 0.0 {
            (down + f.deviation * f.deviation, up)
        } else {
            (down, up + f.deviation * f.deviation)
        }
    });

    let (major, minor) = if down >= up { (down, up) } else { (up, down) };
    if major <= 0.0 || minor / major >= ambiguity_ratio {
        AnomalyKind::Unknown
    } else if down > up {
        AnomalyKind::Pothole
    } else {
        AnomalyKind::Bump
    }
}
