//! Surface profile from a ranging scan: statistics over the ground-facing points,
//! plus a per-scan pass that looks for local ground hazards.

use contracts::{
    AnomalyEvent, AnomalyKind, AnomalySource, GpsFix, HazardConfig, LidarScan, ProfileConfig,
    SurfaceProfile,
};

/// Fold an angle into `(-180, 180]`
fn fold_angle(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Ground points as `(folded angle, distance)`, ordered by angle across the forward seam
fn ground_points(scan: &LidarScan, config: &ProfileConfig) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = scan
        .points
        .iter()
        .map(|p| (fold_angle(p.angle_deg), p.distance_mm))
        .filter(|&(angle, distance)| {
            angle >= config.min_angle_deg
                && angle <= config.max_angle_deg
                && distance > config.min_distance_mm
                && distance < config.max_distance_mm
        })
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

/// Extract the profile, `None` when too few ground points remain
pub fn extract(scan: &LidarScan, config: &ProfileConfig) -> Option<SurfaceProfile> {
    let distances: Vec<f64> = ground_points(scan, config)
        .into_iter()
        .map(|(_, d)| d)
        .collect();

    if distances.len() < config.min_valid_points {
        return None;
    }

    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    Some(SurfaceProfile {
        mean_distance_mm: mean,
        variance_mm2: variance,
        roughness: variance / mean * 100.0,
        valid_points: distances.len(),
    })
}

/// Local ground hazard found in one scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHazard {
    pub kind: AnomalyKind,
    /// Peak depth, height or step, mm
    pub magnitude_mm: f64,
    /// Angle of the peak point
    pub angle_deg: f64,
    pub points: usize,
    /// Normalised severity, `>= 0.5` only past the high-severity threshold
    pub severity: f64,
    /// Magnitude in multiples of the detection threshold
    pub threshold_ratio: f64,
}

impl SurfaceHazard {
    pub fn to_event(&self, timestamp: f64, gps_fix: Option<GpsFix>) -> AnomalyEvent {
        AnomalyEvent {
            timestamp,
            gps_fix,
            severity: self.severity,
            peak_sigma: self.threshold_ratio,
            duration_frames: 1,
            kind: self.kind,
            source: AnomalySource::Ranging,
        }
    }
}

/// Scan the ground points for potholes, bumps and cracks
///
/// Deviations are taken from the median ground distance. Potholes (farther) and
/// bumps (nearer) need a cluster of `min_cluster_points` flagged points; a crack
/// is a single step between neighbours that does not border an accepted cluster.
pub fn detect_hazards(
    scan: &LidarScan,
    profile: &ProfileConfig,
    config: &HazardConfig,
) -> Vec<SurfaceHazard> {
    let ground = ground_points(scan, profile);
    if ground.len() < profile.min_valid_points {
        return Vec::new();
    }
    let median = median(ground.iter().map(|&(_, d)| d));

    let mut hazards = Vec::new();
    let mut covered = vec![false; ground.len()];

    let shapes = [
        (AnomalyKind::Pothole, 1.0, config.pothole_depth_mm, config.high_pothole_depth_mm),
        (AnomalyKind::Bump, -1.0, config.bump_height_mm, config.high_bump_height_mm),
    ];
    for (kind, sign, threshold, high) in shapes {
        let flagged: Vec<usize> = ground
            .iter()
            .enumerate()
            .filter(|(_, point)| sign * (point.1 - median) > threshold)
            .map(|(i, _)| i)
            .collect();

        for cluster in clusters(&flagged, config.max_gap) {
            if cluster.len() < config.min_cluster_points {
                continue;
            }
            let (peak, magnitude) = cluster
                .iter()
                .map(|&i| (i, sign * (ground[i].1 - median)))
                .fold((cluster[0], f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if let (Some(&first), Some(&last)) = (cluster.first(), cluster.last()) {
                covered[first..=last].fill(true);
            }
            hazards.push(SurfaceHazard {
                kind,
                magnitude_mm: magnitude,
                angle_deg: ground[peak].0,
                points: cluster.len(),
                severity: graded(magnitude, threshold, high),
                threshold_ratio: magnitude / threshold,
            });
        }
    }

    // step i sits between points i and i + 1
    let steps: Vec<usize> = ground
        .windows(2)
        .enumerate()
        .filter(|(i, pair)| {
            (pair[1].1 - pair[0].1).abs() > config.crack_step_mm && !covered[*i] && !covered[i + 1]
        })
        .map(|(i, _)| i)
        .collect();
    for cluster in clusters(&steps, config.max_gap) {
        let (peak, step) = cluster
            .iter()
            .map(|&i| (i, (ground[i + 1].1 - ground[i].1).abs()))
            .fold((cluster[0], f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        hazards.push(SurfaceHazard {
            kind: AnomalyKind::Crack,
            magnitude_mm: step,
            angle_deg: ground[peak].0,
            points: cluster.len() + 1,
            severity: (0.5 * (step - config.crack_step_mm) / config.crack_step_mm).clamp(0.0, 0.49),
            threshold_ratio: step / config.crack_step_mm,
        });
    }

    hazards
}

/// Medium below `high`, high beyond it
fn graded(magnitude: f64, threshold: f64, high: f64) -> f64 {
    let s = 0.5 * (magnitude - threshold) / (high - threshold);
    if magnitude > high {
        s.clamp(0.5, 0.99)
    } else {
        s.clamp(0.0, 0.49)
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Split sorted indices wherever the gap exceeds `max_gap`
fn clusters(indices: &[usize], max_gap: usize) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = Vec::new();
    for &i in indices {
        let joins = out
            .last()
            .and_then(|c| c.last())
            .is_some_and(|&prev| i - prev <= max_gap);
        match out.last_mut() {
            Some(current) if joins => current.push(i),
            _ => out.push(vec![i]),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LidarPoint;

    fn scan(points: &[(f64, f64)]) -> LidarScan {
        LidarScan {
            points: points
                .iter()
                .map(|&(angle_deg, distance_mm)| LidarPoint {
                    angle_deg,
                    distance_mm,
                })
                .collect(),
        }
    }

    #[test]
    fn test_fold_angle() {
        assert_eq!(fold_angle(350.0), -10.0);
        assert_eq!(fold_angle(10.0), 10.0);
        assert_eq!(fold_angle(-30.0), -30.0);
        assert_eq!(fold_angle(180.0), 180.0);
    }

    #[test]
    fn test_flat_ground() {
        let points: Vec<(f64, f64)> = (0..20).map(|i| (i as f64 * 2.0 - 20.0, 300.0)).collect();
        let profile = extract(&scan(&points), &ProfileConfig::default()).unwrap();
        assert_eq!(profile.valid_points, 20);
        assert_eq!(profile.mean_distance_mm, 300.0);
        assert_eq!(profile.roughness, 0.0);
    }

    #[test]
    fn test_points_outside_range_ignored() {
        let mut points: Vec<(f64, f64)> = (0..10).map(|i| (320.0 + i as f64, 200.0)).collect();
        points.push((90.0, 200.0));
        points.push((0.0, 20.0));
        points.push((0.0, 5000.0));
        let profile = extract(&scan(&points), &ProfileConfig::default()).unwrap();
        assert_eq!(profile.valid_points, 10);
    }

    #[test]
    fn test_needs_min_valid_points() {
        let points: Vec<(f64, f64)> = (0..9).map(|i| (i as f64, 300.0)).collect();
        assert!(extract(&scan(&points), &ProfileConfig::default()).is_none());
    }

    #[test]
    fn test_uneven_ground_roughness() {
        let points: Vec<(f64, f64)> = (0..10)
            .map(|i| (i as f64, if i % 2 == 0 { 280.0 } else { 320.0 }))
            .collect();
        let profile = extract(&scan(&points), &ProfileConfig::default()).unwrap();
        assert_eq!(profile.mean_distance_mm, 300.0);
        assert_eq!(profile.variance_mm2, 400.0);
        assert!((profile.roughness - 400.0 / 300.0 * 100.0).abs() < 1e-9);
    }

    fn flat_ground() -> Vec<(f64, f64)> {
        (0..31).map(|i| (i as f64 * 3.0 - 45.0, 300.0)).collect()
    }

    /// Offset the points at the given folded angles
    fn with_offsets(offsets: &[(f64, f64)]) -> LidarScan {
        let points: Vec<(f64, f64)> = flat_ground()
            .into_iter()
            .map(|(angle, d)| {
                let extra = offsets
                    .iter()
                    .find(|(a, _)| (*a - angle).abs() < 1e-9)
                    .map_or(0.0, |(_, o)| *o);
                (angle.rem_euclid(360.0), d + extra)
            })
            .collect();
        scan(&points)
    }

    fn hazards(scan: &LidarScan) -> Vec<SurfaceHazard> {
        detect_hazards(scan, &ProfileConfig::default(), &HazardConfig::default())
    }

    #[test]
    fn test_flat_ground_has_no_hazards() {
        assert!(hazards(&scan(&flat_ground())).is_empty());
    }

    #[test]
    fn test_pothole_cluster_across_forward_seam() {
        // -3 folds from 357; the patch straddles the seam
        let scan = with_offsets(&[(-6.0, 45.0), (-3.0, 60.0), (0.0, 55.0), (3.0, 40.0)]);
        let found = hazards(&scan);

        assert_eq!(found.len(), 1, "{found:?}");
        let hazard = found[0];
        assert_eq!(hazard.kind, AnomalyKind::Pothole);
        assert_eq!(hazard.points, 4);
        assert_eq!(hazard.magnitude_mm, 60.0);
        assert_eq!(hazard.angle_deg, -3.0);
        assert!(hazard.severity >= AnomalyEvent::HIGH_SEVERITY);
    }

    #[test]
    fn test_bump_severity_bands() {
        let medium = hazards(&with_offsets(&[(9.0, -25.0), (12.0, -28.0)]));
        assert_eq!(medium.len(), 1);
        assert_eq!(medium[0].kind, AnomalyKind::Bump);
        assert!(medium[0].severity < AnomalyEvent::HIGH_SEVERITY);

        let high = hazards(&with_offsets(&[(9.0, -25.0), (12.0, -35.0)]));
        assert!(high[0].severity >= AnomalyEvent::HIGH_SEVERITY);
    }

    #[test]
    fn test_gap_joins_cluster() {
        // 3 and 9 are two indices apart
        let found = hazards(&with_offsets(&[(3.0, 40.0), (9.0, 40.0)]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].points, 2);

        let split = hazards(&with_offsets(&[(3.0, 40.0), (12.0, 40.0)]));
        assert!(split.iter().all(|h| h.kind == AnomalyKind::Crack), "{split:?}");
    }

    #[test]
    fn test_single_point_is_a_crack_not_a_pothole() {
        let found = hazards(&with_offsets(&[(0.0, 25.0)]));
        assert_eq!(found.len(), 1, "{found:?}");
        assert_eq!(found[0].kind, AnomalyKind::Crack);
        assert_eq!(found[0].magnitude_mm, 25.0);
        assert!(found[0].severity < AnomalyEvent::HIGH_SEVERITY);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let found = hazards(&with_offsets(&[(0.0, 30.0), (3.0, 30.0)]));
        assert!(found.iter().all(|h| h.kind != AnomalyKind::Pothole), "{found:?}");

        let step = hazards(&with_offsets(&[(0.0, 15.0)]));
        assert!(step.is_empty(), "{step:?}");
    }

    #[test]
    fn test_hazard_becomes_ranging_event() {
        let found = hazards(&with_offsets(&[(0.0, 25.0)]));
        let event = found[0].to_event(4.2, None);
        assert_eq!(event.source, AnomalySource::Ranging);
        assert_eq!(event.kind, AnomalyKind::Crack);
        assert_eq!(event.duration_frames, 1);
        assert!((event.peak_sigma - 25.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_ground_points() {
        let points: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, 300.0 + i as f64 * 50.0)).collect();
        assert!(hazards(&scan(&points)).is_empty());
    }
}
