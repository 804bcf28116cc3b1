//! Great-circle distance and coordinate rounding.

/// Mean Earth radius used for distance calculations.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two WGS84 points in kilometres.
///
/// Inputs are expected to be valid latitudes/longitudes; the result is always
/// finite and non-negative for such inputs, including across the antimeridian
/// and at the poles.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let hav = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // rounding can push this a hair outside [0, 1] for antipodal points
    let hav = hav.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * hav.sqrt().atan2((1.0 - hav).sqrt())
}

/// Round `value` to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
