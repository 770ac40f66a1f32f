//! Geographic utilities: distances, speeds and small-scale geometry.
//!
//! All distance functions fail closed: a malformed point yields `+INFINITY`
//! rather than a panic, so downstream threshold comparisons reject it
//! naturally.

use crate::GpsPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine great-circle distance between two points in meters.
///
/// Returns `f64::INFINITY` for any malformed point so that callers comparing
/// against a radius or speed threshold reject it without special-casing.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    if !p1.is_valid() || !p2.is_valid() {
        return f64::INFINITY;
    }

    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Speed in km/h between two timestamped points.
///
/// Returns 0.0 when the time delta is zero (never divides by zero); a
/// malformed point propagates as `+INFINITY` via the distance.
pub fn speed_kmh(p1: &GpsPoint, p2: &GpsPoint, t1_ms: i64, t2_ms: i64) -> f64 {
    let dt_ms = (t2_ms - t1_ms).abs();
    if dt_ms == 0 {
        return 0.0;
    }
    let distance_km = haversine_distance(p1, p2) / 1000.0;
    let hours = dt_ms as f64 / 3_600_000.0;
    distance_km / hours
}

/// Perpendicular distance in meters from `p` to the chord through `a` and `b`.
///
/// Computed in a locally-flattened (lat, lng) plane, which is only valid at
/// neighborhood scale (up to a few kilometers). Do not use for long chords.
/// Degenerate chords (`a` ≈ `b`) fall back to the distance from `p` to `a`.
pub fn point_to_chord_deviation(p: &GpsPoint, a: &GpsPoint, b: &GpsPoint) -> f64 {
    if !p.is_valid() || !a.is_valid() || !b.is_valid() {
        return f64::INFINITY;
    }

    // Local planar projection centered on `a`, scaled to meters
    let cos_lat = a.latitude.to_radians().cos();
    let px = (p.longitude - a.longitude) * METERS_PER_DEGREE * cos_lat;
    let py = (p.latitude - a.latitude) * METERS_PER_DEGREE;
    let bx = (b.longitude - a.longitude) * METERS_PER_DEGREE * cos_lat;
    let by = (b.latitude - a.latitude) * METERS_PER_DEGREE;

    let chord_len_sq = bx * bx + by * by;
    if chord_len_sq < 1e-12 {
        return haversine_distance(p, a);
    }

    // |cross product| / |chord| = perpendicular distance to the infinite line
    (px * by - py * bx).abs() / chord_len_sq.sqrt()
}

/// Total distance along a polyline in meters.
///
/// Malformed points are skipped rather than poisoning the sum with infinity.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .filter(|d| d.is_finite())
        .sum()
}

/// Convert a radius in meters to a degree radius that covers both axes at
/// the given latitude.
///
/// Longitude degrees shrink with latitude, so the longitude conversion is
/// the larger of the two and is used for both. Intended for conservative
/// bounding-box prefilters that are confirmed with [`haversine_distance`].
pub fn meters_to_degrees(meters: f64, at_latitude: f64) -> f64 {
    let cos_lat = at_latitude.to_radians().cos().abs().max(0.01);
    meters / (METERS_PER_DEGREE * cos_lat)
}
