//! Geodetic Coordinates
//!
//! The coordinate type shared by mission files, the airdrop synthesizer and
//! the autopilot wire encoding (lat/lon scaled by 1e7 as signed 32-bit).

use crate::error::{Error, Result};
use std::fmt;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Relative-altitude ceiling for constructed coordinates: 400 ft AGL.
pub const ALTITUDE_CEILING_M: f32 = 121.92;

/// A geodetic position: latitude/longitude in degrees, altitude in meters
/// above home.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
    alt: f32,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range latitude/longitude and
    /// altitudes above [`ALTITUDE_CEILING_M`].
    pub fn new(lat: f64, lon: f64, alt: f32) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidCoordinate { lat, lon });
        }
        if alt > ALTITUDE_CEILING_M {
            return Err(Error::InvalidAltitude(alt, ALTITUDE_CEILING_M));
        }
        Ok(Self { lat, lon, alt })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn alt(&self) -> f32 {
        self.alt
    }

    /// Same position at a different relative altitude.
    pub fn with_altitude(&self, alt: f32) -> Result<Self> {
        Self::new(self.lat, self.lon, alt)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Initial bearing from this position to `other`, degrees in [0, 360).
    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        y.atan2(x).to_degrees().rem_euclid(360.0)
    }

    /// Position `distance_m` meters away along `bearing_deg`, same altitude.
    pub fn offset(&self, distance_m: f64, bearing_deg: f64) -> Result<Self> {
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();
        let bearing = bearing_deg.to_radians();
        let angular = distance_m / EARTH_RADIUS_M;

        let lat2 = (lat1.sin() * angular.cos()
            + lat1.cos() * angular.sin() * bearing.cos())
        .asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        let lon2_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
        Self::new(lat2.to_degrees(), lon2_deg, self.alt)
    }

    /// Latitude in the autopilot's fixed-point form (degrees x 1e7).
    pub fn lat_e7(&self) -> i32 {
        (self.lat * 1e7) as i32
    }

    /// Longitude in the autopilot's fixed-point form (degrees x 1e7).
    pub fn lon_e7(&self) -> i32 {
        (self.lon * 1e7) as i32
    }

    /// Build a coordinate from the autopilot's fixed-point form.
    pub fn from_e7(lat_e7: i32, lon_e7: i32, alt: f32) -> Result<Self> {
        Self::new(lat_e7 as f64 / 1e7, lon_e7 as f64 / 1e7, alt)
    }

    /// Ray-casting point-in-polygon test over the lat/lon plane. Used for
    /// geofence containment; altitude is ignored.
    pub fn within_polygon(&self, vertices: &[Coordinate]) -> bool {
        if vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (xi, yi) = (vertices[i].lon, vertices[i].lat);
            let (xj, yj) = (vertices[j].lon, vertices[j].lat);
            if ((yi > self.lat) != (yj > self.lat))
                && self.lon < (xj - xi) * (self.lat - yi) / (yj - yi) + xi
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7}, {:.1} m)", self.lat, self.lon, self.alt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon, 30.0).unwrap()
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(matches!(
            Coordinate::new(91.0, 0.0, 10.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            Coordinate::new(0.0, -181.0, 10.0),
            Err(Error::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn rejects_altitude_above_ceiling() {
        assert!(matches!(
            Coordinate::new(40.0, -76.0, 200.0),
            Err(Error::InvalidAltitude(_, _))
        ));
        assert!(Coordinate::new(40.0, -76.0, ALTITUDE_CEILING_M).is_ok());
    }

    #[test]
    fn distance_over_a_known_baseline() {
        // One arc-minute of latitude is one nautical mile (~1855 m at the
        // mean-radius sphere).
        let a = coord(38.0, -76.55);
        let b = coord(38.0 + 1.0 / 60.0, -76.55);
        let d = a.distance_to(&b);
        assert!((d - 1853.0).abs() < 5.0, "distance was {d}");
    }

    #[test]
    fn bearing_is_normalized() {
        let origin = coord(38.315, -76.549);
        let north = coord(38.325, -76.549);
        let west = coord(38.315, -76.560);
        assert!(origin.bearing_to(&north) < 1.0);
        let b = origin.bearing_to(&west);
        assert!((b - 270.0).abs() < 1.0, "bearing was {b}");
    }

    #[test]
    fn offset_round_trips_through_distance_and_bearing() {
        let origin = coord(38.315276, -76.549083);
        let moved = origin.offset(250.0, 135.0).unwrap();
        assert!((origin.distance_to(&moved) - 250.0).abs() < 0.5);
        assert!((origin.bearing_to(&moved) - 135.0).abs() < 0.5);
    }

    #[test]
    fn fixed_point_round_trip() {
        let c = Coordinate::new(38.3152762, -76.5490833, 55.0).unwrap();
        let back = Coordinate::from_e7(c.lat_e7(), c.lon_e7(), c.alt()).unwrap();
        assert!((back.lat() - c.lat()).abs() < 1e-7);
        assert!((back.lon() - c.lon()).abs() < 1e-7);
    }

    #[test]
    fn polygon_containment() {
        let fence = [
            coord(38.31, -76.56),
            coord(38.32, -76.56),
            coord(38.32, -76.54),
            coord(38.31, -76.54),
        ];
        assert!(coord(38.315, -76.55).within_polygon(&fence));
        assert!(!coord(38.33, -76.55).within_polygon(&fence));
        assert!(!coord(38.315, -76.55).within_polygon(&fence[..2]));
    }
}
