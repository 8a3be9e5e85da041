//! GPS helpers: fix interpolation and ground distance.

use contracts::GpsFix;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two fixes (metres, altitude ignored)
pub fn haversine_m(a: &GpsFix, b: &GpsFix) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Linear interpolation between two fixes, `ratio` in `[0, 1]`
///
/// Longitude takes the short way across the antimeridian.
pub fn interpolate(a: &GpsFix, b: &GpsFix, ratio: f64) -> GpsFix {
    let ratio = ratio.clamp(0.0, 1.0);
    let lerp = |x: f64, y: f64| x + (y - x) * ratio;

    let mut dlon = b.longitude - a.longitude;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let mut longitude = a.longitude + dlon * ratio;
    if longitude > 180.0 {
        longitude -= 360.0;
    } else if longitude <= -180.0 {
        longitude += 360.0;
    }

    GpsFix {
        latitude: lerp(a.latitude, b.latitude),
        longitude,
        altitude: lerp(a.altitude, b.altitude),
        satellites: match (a.satellites, b.satellites) {
            (Some(x), Some(y)) => Some(x.min(y)),
            _ => None,
        },
    }
}
