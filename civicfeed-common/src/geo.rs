//! WGS84 points and great-circle distances.

use serde::Serialize;
use thiserror::Error;

/// Mean earth radius, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Copy, Clone, PartialEq, Debug, Error)]
#[error("Coordinates out of range: longitude {longitude}, latitude {latitude}")]
pub struct InvalidCoordinatesError {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct GeoPoint {
    longitude: f64,
    latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, InvalidCoordinatesError> {
        if longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude)
        {
            Ok(Self {
                longitude,
                latitude,
            })
        } else {
            Err(InvalidCoordinatesError {
                longitude,
                latitude,
            })
        }
    }

    #[must_use]
    pub fn longitude(self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn latitude(self) -> f64 {
        self.latitude
    }

    /// Haversine distance in meters.
    #[must_use]
    pub fn distance_meters(self, other: GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lng = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

#[cfg(test)]
mod tests {
    use crate::geo::GeoPoint;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(-75.0, 40.0).is_ok());
        assert!(GeoPoint::new(180.0, -90.0).is_ok());
        assert!(GeoPoint::new(180.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -90.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(-75.0, 40.0).unwrap();
        let b = GeoPoint::new(-75.0, 41.0).unwrap();

        let distance = a.distance_meters(b);
        assert!((111_000.0..111_400.0).contains(&distance), "{distance}");
        assert!((distance - b.distance_meters(a)).abs() < 1e-6);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let point = GeoPoint::new(13.4, 52.5).unwrap();
        assert!(point.distance_meters(point).abs() < 1e-9);
    }

    #[test]
    fn antipodes_are_half_the_circumference_apart() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(180.0, 0.0).unwrap();
        let half = std::f64::consts::PI * crate::geo::EARTH_RADIUS_METERS;
        assert!((a.distance_meters(b) - half).abs() < 1.0);
    }
}
