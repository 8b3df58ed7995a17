//! Local flat-earth conversions between metres and degrees.
//!
//! Markers only ever look a few metres around themselves, so an
//! equirectangular approximation with a latitude-corrected longitude scale is
//! accurate enough and stays deterministic across platforms.

/// Metres per degree of longitude at the equator.
pub const METERS_PER_DEG_LNG: f64 = 111_320.0;
/// Metres per degree of latitude.
pub const METERS_PER_DEG_LAT: f64 = 110_540.0;

const MIN_COS_LAT: f64 = 1e-6;

/// Convert an east/north offset in metres into a `(d_lng, d_lat)` offset in
/// degrees around `lat`.
pub fn meters_to_degrees(lat: f64, dx_m: f64, dy_m: f64) -> (f64, f64) {
    let cos = lat.to_radians().cos().max(MIN_COS_LAT);
    (dx_m / (METERS_PER_DEG_LNG * cos), dy_m / METERS_PER_DEG_LAT)
}

/// Planar distance in metres between two nearby positions.
///
/// The longitude scale uses the latitude of the destination point, floored
/// like [`meters_to_degrees`] so both stay consistent at the poles.
pub fn planar_distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (from_lng, from_lat) = from;
    let (to_lng, to_lat) = to;
    let cos = to_lat.to_radians().cos().max(MIN_COS_LAT);
    let dx = (to_lng - from_lng) * METERS_PER_DEG_LNG * cos;
    let dy = (to_lat - from_lat) * METERS_PER_DEG_LAT;
    dx.hypot(dy)
}
