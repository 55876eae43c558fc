//! Earth-related constants and the coordinate transform service
//!
//! All occlusion and filtering math runs in a planar, meters-based local frame. Inputs recorded
//! in geodetic coordinates (degrees of latitude/longitude plus an altitude in meters) have to be
//! projected into that frame first. This module models the Earth as the WGS84 ellipsoid and
//! provides the projection as an injectable [`CoordinateTransform`] rather than a process-wide
//! coordinate manager, so several frames can coexist in one process (and in one test binary).
//!
//! # Local tangent plane
//! For the extent of a city block or a drive through a district, a flat-Earth approximation
//! around a fixed origin is accurate to well under a meter. Offsets in latitude and longitude
//! are scaled by the principal radii of curvature at the origin:
//!
//! $$
//! \Delta N = \Delta\phi \, (R_N + h_0) \qquad \Delta E = \Delta\lambda \, (R_E + h_0) \cos\phi_0
//! $$
//!
//! Altitude is carried through unchanged.
use serde::{Deserialize, Serialize};

use crate::Point3D;

/// Earth's equitorial radius in meters
pub const EQUATORIAL_RADIUS: f64 = 6378137.0; // meters
/// Earth's eccentricity ($e$)
pub const ECCENTRICITY: f64 = 0.0818191908425; // unit-less
/// Earth's eccentricity squared ($e^2$)
pub const ECCENTRICITY_SQUARED: f64 = ECCENTRICITY * ECCENTRICITY;

/// Calculate principal radii of curvature
///
/// # Parameters
/// - `latitude` - The WGS84 latitude in degrees
/// - `altitude` - The WGS84 altitude in meters
///
/// # Returns
/// A tuple `(r_n, r_e, r_p)` in meters: r_n is the radius of curvature in the meridian, r_e the
/// radius of curvature in the prime vertical, and r_p the radius of the parallel circle at
/// the given altitude.
///
/// # Example
/// ```rust
/// use urbanlos::earth;
/// let (r_n, r_e, _) = earth::principal_radii(&45.0, &0.0);
/// assert!(r_n < r_e);
/// ```
pub fn principal_radii(latitude: &f64, altitude: &f64) -> (f64, f64, f64) {
    let latitude_rad: f64 = latitude.to_radians();
    let sin_lat_sq: f64 = latitude_rad.sin().powi(2);
    let r_n: f64 = (EQUATORIAL_RADIUS * (1.0 - ECCENTRICITY_SQUARED))
        / (1.0 - ECCENTRICITY_SQUARED * sin_lat_sq).powf(3.0 / 2.0);
    let r_e: f64 = EQUATORIAL_RADIUS / (1.0 - ECCENTRICITY_SQUARED * sin_lat_sq).sqrt();
    let r_p: f64 = (r_e + altitude) * latitude_rad.cos();
    (r_n, r_e, r_p)
}

/// Projection between an input coordinate frame and the planar local frame.
///
/// Implementations must be pure: the same input always maps to the same output.
pub trait CoordinateTransform {
    /// Map an input point into the local, meters-based frame.
    fn to_local(&self, point: &Point3D) -> Point3D;
    /// Map a local point back into the input frame.
    fn to_input(&self, point: &Point3D) -> Point3D;
}

/// Identity transform for inputs that are already planar meters (e.g. UTM).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Planar;

impl CoordinateTransform for Planar {
    fn to_local(&self, point: &Point3D) -> Point3D {
        *point
    }
    fn to_input(&self, point: &Point3D) -> Point3D {
        *point
    }
}

/// Flat-Earth projection around a geodetic origin.
///
/// Input points carry longitude in `x` and latitude in `y` (degrees) and altitude in `z`
/// (meters). Local points are east/north meters from the origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalTangentPlane {
    pub origin_latitude: f64,
    pub origin_longitude: f64,
    #[serde(default)]
    pub origin_altitude: f64,
}

impl LocalTangentPlane {
    pub fn new(origin_latitude: f64, origin_longitude: f64, origin_altitude: f64) -> Self {
        LocalTangentPlane {
            origin_latitude,
            origin_longitude,
            origin_altitude,
        }
    }
    /// Meters per radian of latitude and of longitude at the origin.
    fn scales(&self) -> (f64, f64) {
        let (r_n, _, r_p) = principal_radii(&self.origin_latitude, &self.origin_altitude);
        (r_n + self.origin_altitude, r_p)
    }
}

impl CoordinateTransform for LocalTangentPlane {
    fn to_local(&self, point: &Point3D) -> Point3D {
        let (north_scale, east_scale) = self.scales();
        let east = (point.x - self.origin_longitude).to_radians() * east_scale;
        let north = (point.y - self.origin_latitude).to_radians() * north_scale;
        Point3D::new(east, north, point.z)
    }
    fn to_input(&self, point: &Point3D) -> Point3D {
        let (north_scale, east_scale) = self.scales();
        let longitude = self.origin_longitude + (point.x / east_scale).to_degrees();
        let latitude = self.origin_latitude + (point.y / north_scale).to_degrees();
        Point3D::new(longitude, latitude, point.z)
    }
}
