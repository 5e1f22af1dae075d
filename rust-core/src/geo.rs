//! Great-circle geometry.
//!
//! Pure distance and bearing math on WGS84 coordinates (lat/lng in
//! degrees). Used by the navigator for step advancement, off-route
//! detection and arrival checks.

use serde::{Deserialize, Serialize};

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True if both components are finite and inside the lat/lng ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Haversine distance between two points in meters.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    // Rounding can push h marginally above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.min(1.0).sqrt().asin()
}

/// Initial bearing from point A to point B in degrees [0, 360).
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let bearing = y.atan2(x).to_degrees();
    let normalized = (bearing + 360.0) % 360.0;
    // -0.0 + 360.0 lands exactly on 360.0 after the modulo in rare cases
    if normalized >= 360.0 { 0.0 } else { normalized }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[test]
    fn distance_same_point() {
        let p = pt(48.2082, 16.3738);
        assert_eq!(distance_meters(&p, &p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = pt(51.7548, -1.2544);
        let b = pt(51.7520, -1.2577);
        let ab = distance_meters(&a, &b);
        let ba = distance_meters(&b, &a);
        assert!((ab - ba).abs() < 1e-9, "{ab} != {ba}");
        assert!(ab > 0.0);
    }

    #[test]
    fn distance_known_value() {
        // Vienna to Bratislava ~55 km
        let vienna = pt(48.2082, 16.3738);
        let bratislava = pt(48.1486, 17.1077);
        let dist = distance_meters(&vienna, &bratislava);
        assert!(dist > 50_000.0 && dist < 60_000.0,
            "Expected ~55 km, got {:.0} m", dist);
    }

    #[test]
    fn distance_thousandth_degree_at_equator() {
        let dist = distance_meters(&pt(0.0, 0.0), &pt(0.0, 0.001));
        assert!((dist - 111.2).abs() < 0.5, "Expected ~111 m, got {dist}");
    }

    #[test]
    fn distance_antipodal_is_finite() {
        let dist = distance_meters(&pt(0.0, 0.0), &pt(0.0, 180.0));
        assert!(dist.is_finite());
        assert!((dist - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn bearing_east() {
        let b = bearing_degrees(&pt(0.0, 0.0), &pt(0.0, 1.0));
        assert!((b - 90.0).abs() < 0.1, "Expected ~90, got {b}");
    }

    #[test]
    fn bearing_north() {
        let b = bearing_degrees(&pt(0.0, 0.0), &pt(1.0, 0.0));
        assert!(b.abs() < 0.1, "Expected ~0, got {b}");
    }

    #[test]
    fn bearing_west_in_range() {
        let b = bearing_degrees(&pt(0.0, 0.0), &pt(0.0, -1.0));
        assert!((b - 270.0).abs() < 0.1, "Expected ~270, got {b}");
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn validity() {
        assert!(pt(48.0, 16.0).is_valid());
        assert!(!pt(f64::NAN, 16.0).is_valid());
        assert!(!pt(91.0, 0.0).is_valid());
        assert!(!pt(0.0, f64::INFINITY).is_valid());
    }
}
