//! Great-circle math
//!
//! Coordinates are plain WGS84 degrees. Distances use the haversine formula on a
//! sphere of radius [`EARTH_RADIUS_M`], which is accurate to ~0.5% and plenty for
//! "who is within two kilometres of me".

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate without range checks.
    ///
    /// Use [`Coordinate::try_new`] for anything that came from a client.
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a coordinate, rejecting out-of-range or non-finite components
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self> {
        let coord = Self::new(latitude, longitude);
        coord.validate()?;
        Ok(coord)
    }

    /// True when both components are finite and inside their ranges
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SpaceError::InvalidCoordinate(format!(
                "({}, {}) is outside lat [-90,90] / lon [-180,180]",
                self.latitude, self.longitude
            )))
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// Haversine great-circle distance between `a` and `b` in metres.
///
/// Symmetric and zero for identical points. Non-finite inputs yield NaN, which
/// compares false against every radius and so never matches a proximity filter.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points
    let h = h.min(1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Point reached by travelling `distance_m` from `origin` along `bearing_deg`
/// (clockwise from north) on the same sphere used by [`distance_meters`].
pub fn destination(origin: &Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.latitude.to_radians();
    let lambda1 = origin.longitude.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    // Normalise longitude back into [-180, 180)
    let lon = (lambda2.to_degrees() + 540.0) % 360.0 - 180.0;
    Coordinate::new(phi2.to_degrees(), lon)
}
