//! Quality classifier: closed-lower / open-upper threshold bands.

use contracts::{QualityConfig, QualityLabel, RoughnessIndex, SurfaceProfile};

fn band(value: f64, t1: f64, t2: f64, t3: f64) -> QualityLabel {
    if value < t1 {
        QualityLabel::Smooth
    } else if value < t2 {
        QualityLabel::Fair
    } else if value < t3 {
        QualityLabel::Rough
    } else {
        QualityLabel::Severe
    }
}

/// Label from the accelerometer roughness index
pub fn classify(index: RoughnessIndex, config: &QualityConfig) -> QualityLabel {
    match index {
        RoughnessIndex::Determined(v) if v.is_finite() => band(v, config.t1, config.t2, config.t3),
        _ => QualityLabel::Unknown,
    }
}

/// Label from the ranging surface profile
pub fn classify_profile(profile: &SurfaceProfile, config: &QualityConfig) -> QualityLabel {
    if !profile.roughness.is_finite() {
        return QualityLabel::Unknown;
    }
    band(
        profile.roughness,
        config.profile_t1,
        config.profile_t2,
        config.profile_t3,
    )
}

/// Final label: accelerometer band, worsened by the profile band when fusion is enabled
pub fn fused_label(
    index: RoughnessIndex,
    profile: Option<&SurfaceProfile>,
    config: &QualityConfig,
) -> QualityLabel {
    let accel = classify(index, config);
    match profile {
        Some(profile) if config.use_surface_profile => {
            accel.worst(classify_profile(profile, config))
        }
        _ => accel,
    }
}
