//! Urban GNSS positioning with LOS/NLOS-aided particle filtering
//!
//! This crate estimates a moving receiver's position from a sequence of noisy position fixes by
//! combining a sequential Monte Carlo (particle) filter with a geometric and signal-based
//! Line-of-Sight (LOS) / Non-Line-of-Sight (NLOS) classifier. The classifier models satellite
//! visibility occlusion by buildings: every building is a vertical prism (a closed footprint
//! polygon plus a scalar height), and a satellite is blocked for an observer when the ray towards
//! it passes through one of the prism's walls below the roof line.
//!
//! The particle filter uses the agreement between a candidate position's LOS/NLOS *signature*
//! (satellite id → visible flag) and the signature observed at the reference fix to weight,
//! resample, and track a population of position hypotheses over time.
//!
//! Crate layout:
//! - This module: geometry primitives ([`Point3D`], [`Point2D`], [`Ray`], [`Building`],
//!   [`Satellite`]) and the [`LosSignature`] observation type.
//! - [`earth`]: WGS84 constants and the injectable [`earth::CoordinateTransform`] service.
//! - [`los`]: the occlusion classifier and classification policies.
//! - [`particle`]: particle population, weighting, resampling, and the filter driver.
//! - [`sim`]: configuration, input loading, batch runs and result export.
//!
//! # Coordinate conventions
//!
//! All core computations happen in a planar, meters-based local frame: `x` is easting-like,
//! `y` is northing-like and `z` is altitude. Azimuths are measured from north, clockwise, in
//! degrees. Elevations are measured from the horizon, in degrees. A unit direction towards a
//! satellite is built in the local East-North-Up convention:
//!
//! $$
//! d = \begin{bmatrix} \sin(az)\cos(el) \\\\ \cos(az)\cos(el) \\\\ \sin(el) \end{bmatrix}
//! $$
//!
//! Callers are responsible for projecting geographic inputs into this frame (see
//! [`earth::LocalTangentPlane`]).

pub mod earth;
pub mod error;
pub mod los;
pub mod particle;
pub mod sim;

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

pub use crate::error::{LosError, Result};

/// Denominator magnitude below which a ray is treated as parallel to a wall.
pub const PARALLEL_EPSILON: f64 = 1e-10;
/// Minimum horizontal wall length (meters); shorter segments are skipped as degenerate.
pub const DEGENERATE_WALL_EPSILON: f64 = 1e-9;

/// Per-position mapping of satellite identifier to LOS (`true`) / NLOS (`false`).
///
/// A `BTreeMap` keeps iteration order stable, which keeps seeded runs reproducible.
pub type LosSignature = BTreeMap<String, bool>;

/// Count the LOS and NLOS entries of a signature, returned as `(los, nlos)`.
pub fn los_nlos_count(signature: &LosSignature) -> (usize, usize) {
    let los = signature.values().filter(|&&is_los| is_los).count();
    (los, signature.len() - los)
}

/// A position in the local planar frame (meters).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    /// Easting-like coordinate in meters
    pub x: f64,
    /// Northing-like coordinate in meters
    pub y: f64,
    /// Altitude in meters
    pub z: f64,
}
impl Display for Point3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}
impl From<[f64; 3]> for Point3D {
    fn from(xyz: [f64; 3]) -> Self {
        Point3D::new(xyz[0], xyz[1], xyz[2])
    }
}
impl From<Vector3<f64>> for Point3D {
    fn from(v: Vector3<f64>) -> Self {
        Point3D::new(v[0], v[1], v[2])
    }
}
impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Point3D {
        Point3D { x, y, z }
    }
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
    /// Drop the altitude and return the horizontal footprint of this point.
    pub fn horizontal(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
    /// Straight-line (3D) distance to another point.
    pub fn distance_to(&self, other: &Point3D) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }
    /// Distance to another point ignoring altitude.
    pub fn horizontal_distance_to(&self, other: &Point3D) -> f64 {
        self.horizontal().distance_to(&other.horizontal())
    }
    /// Bearing from this point to `other` in degrees, clockwise from north, in `[0, 360)`.
    ///
    /// Coincident points have no defined bearing; `0.0` is returned for them.
    ///
    /// # Example
    /// ```rust
    /// use urbanlos::Point3D;
    /// let origin = Point3D::new(0.0, 0.0, 0.0);
    /// let east = Point3D::new(10.0, 0.0, 0.0);
    /// assert!((origin.azimuth_to(&east) - 90.0).abs() < 1e-9);
    /// ```
    pub fn azimuth_to(&self, other: &Point3D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0.0 && dy == 0.0 {
            return 0.0;
        }
        wrap_to_360(dx.atan2(dy).to_degrees())
    }
    /// Displace this point horizontally by `distance` meters along `azimuth` degrees.
    ///
    /// Uses the ENU convention: east = `distance * sin(az)`, north = `distance * cos(az)`.
    /// Altitude is unchanged.
    pub fn moved_by(&self, distance: f64, azimuth: f64) -> Point3D {
        let azimuth_rad = azimuth.to_radians();
        Point3D::new(
            self.x + distance * azimuth_rad.sin(),
            self.y + distance * azimuth_rad.cos(),
            self.z,
        )
    }
}

/// A position on the horizontal plane (meters).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}
impl Display for Point2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
impl Point2D {
    pub fn new(x: f64, y: f64) -> Point2D {
        Point2D { x, y }
    }
    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }
}

/// 2D cross product (z component of the 3D cross product).
fn cross_2d(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Intersection point of the finite segments `a1→a2` and `b1→b2`, if any.
///
/// Parallel and collinear segments report no intersection, as do segments whose supporting
/// lines cross outside either segment.
///
/// # Example
/// ```rust
/// use urbanlos::{Point2D, segment_intersection};
/// let hit = segment_intersection(
///     &Point2D::new(-1.0, 0.0), &Point2D::new(1.0, 0.0),
///     &Point2D::new(0.0, -1.0), &Point2D::new(0.0, 1.0),
/// ).unwrap();
/// assert!(hit.x.abs() < 1e-12 && hit.y.abs() < 1e-12);
/// ```
pub fn segment_intersection(
    a1: &Point2D,
    a2: &Point2D,
    b1: &Point2D,
    b2: &Point2D,
) -> Option<Point2D> {
    let r = a2.to_vector() - a1.to_vector();
    let s = b2.to_vector() - b1.to_vector();
    let denominator = cross_2d(&r, &s);
    if denominator.abs() < PARALLEL_EPSILON {
        return None;
    }
    let offset = b1.to_vector() - a1.to_vector();
    let t = cross_2d(&offset, &s) / denominator;
    let u = cross_2d(&offset, &r) / denominator;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return None;
    }
    let hit = a1.to_vector() + r * t;
    Some(Point2D::new(hit.x, hit.y))
}

/// Where a [`Ray`] crosses a vertical wall.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WallCrossing {
    /// Horizontal intersection point
    pub point: Point2D,
    /// Horizontal distance from the ray origin to the wall (meters)
    pub horizontal_distance: f64,
    /// Altitude of the ray above the intersection point (meters)
    pub ray_height: f64,
}

/// A directional ray from an observer towards a satellite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3D,
    /// Unit direction in local ENU
    pub direction: Vector3<f64>,
    /// Elevation of the ray in radians
    pub elevation: f64,
}
impl Ray {
    /// Build a ray from an azimuth and elevation given in degrees.
    pub fn from_azimuth_elevation(origin: Point3D, azimuth: f64, elevation: f64) -> Ray {
        let azimuth_rad = azimuth.to_radians();
        let elevation_rad = elevation.to_radians();
        let direction = Vector3::new(
            azimuth_rad.sin() * elevation_rad.cos(),
            azimuth_rad.cos() * elevation_rad.cos(),
            elevation_rad.sin(),
        );
        Ray {
            origin,
            direction,
            elevation: elevation_rad,
        }
    }
    /// Horizontal (east, north) part of the direction. Not normalized.
    pub fn horizontal_direction(&self) -> Vector2<f64> {
        Vector2::new(self.direction.x, self.direction.y)
    }
    /// Altitude of the ray after travelling `horizontal_distance` meters over the ground.
    pub fn height_at(&self, horizontal_distance: f64) -> f64 {
        self.origin.z + horizontal_distance * self.elevation.tan()
    }
    /// Intersect the ray with the vertical wall standing on the segment `p1→p2`.
    ///
    /// Walls are vertical so the solve happens in the horizontal plane: the ray parameter `t`
    /// comes from the wall's in-plane normal, and the crossing's normalized position `s` along
    /// the wall must lie in `[0, 1]`. Returns `None` for degenerate (zero-length) walls, walls
    /// parallel to the ray, crossings behind the observer, and crossings off the finite wall.
    pub fn intersect_wall(&self, p1: &Point2D, p2: &Point2D) -> Option<WallCrossing> {
        let wall = p2.to_vector() - p1.to_vector();
        let wall_length_sq = wall.norm_squared();
        if wall_length_sq.sqrt() < DEGENERATE_WALL_EPSILON {
            return None;
        }
        let normal = Vector2::new(-wall.y, wall.x);
        let heading = self.horizontal_direction();
        let dot = heading.dot(&normal);
        if dot.abs() < PARALLEL_EPSILON {
            return None;
        }
        let origin = self.origin.horizontal().to_vector();
        let t = (p1.to_vector() - origin).dot(&normal) / dot;
        if t <= 0.0 {
            return None;
        }
        let hit = origin + heading * t;
        let s = (hit - p1.to_vector()).dot(&wall) / wall_length_sq;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }
        let horizontal_distance = t * heading.norm();
        Some(WallCrossing {
            point: Point2D::new(hit.x, hit.y),
            horizontal_distance,
            ray_height: self.height_at(horizontal_distance),
        })
    }
}

/// A vertical prism: closed footprint polygon plus a roof height.
///
/// The footprint ring is always stored closed (first vertex == last vertex). Vertex altitudes are
/// carried through for export but ignored for occlusion; only [`Building::height`] matters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Building {
    vertices: Vec<Point3D>,
    height: f64,
}
impl Building {
    /// Create a building, closing the ring if needed.
    ///
    /// # Errors
    /// [`LosError::InvalidBuilding`] if the ring has fewer than three distinct vertices or the
    /// height is not finite.
    ///
    /// Distinctness is judged on the full 3-D vertices, so a ring whose footprint collapses onto
    /// one segment (see [`Building::wall`]) is accepted. Such a footprint still occludes: its two
    /// opposite walls coincide with the segment. Zero-length footprint edges are skipped by
    /// [`Ray::intersect_wall`].
    pub fn new(mut vertices: Vec<Point3D>, height: f64) -> Result<Building> {
        let mut unique: Vec<Point3D> = Vec::with_capacity(vertices.len());
        for vertex in &vertices {
            if !unique.contains(vertex) {
                unique.push(*vertex);
            }
        }
        if unique.len() < 3 || !height.is_finite() {
            return Err(LosError::InvalidBuilding {
                unique_vertices: unique.len(),
                height,
            });
        }
        if vertices.first() != vertices.last() {
            vertices.push(vertices[0]);
        }
        Ok(Building { vertices, height })
    }
    /// A free-standing wall of zero thickness between two ground points.
    ///
    /// The ring is `start, end, end (top), start (top)`, so it has four distinct 3-D vertices
    /// while its footprint collapses onto the single segment `start→end`.
    pub fn wall(start: Point2D, end: Point2D, height: f64) -> Result<Building> {
        Building::new(
            vec![
                Point3D::new(start.x, start.y, 0.0),
                Point3D::new(end.x, end.y, 0.0),
                Point3D::new(end.x, end.y, height),
                Point3D::new(start.x, start.y, height),
            ],
            height,
        )
    }
    /// Closed footprint ring.
    pub fn vertices(&self) -> &[Point3D] {
        &self.vertices
    }
    pub fn height(&self) -> f64 {
        self.height
    }
    /// Consecutive footprint vertex pairs, projected onto the horizontal plane.
    pub fn walls(&self) -> impl Iterator<Item = (Point2D, Point2D)> + '_ {
        self.vertices
            .windows(2)
            .map(|pair| (pair[0].horizontal(), pair[1].horizontal()))
    }
    /// Mean of the ring vertices, closing vertex excluded.
    pub fn centroid(&self) -> Point2D {
        let ring = &self.vertices[..self.vertices.len() - 1];
        let n = ring.len() as f64;
        let (sum_x, sum_y) = ring
            .iter()
            .fold((0.0, 0.0), |(sx, sy), v| (sx + v.x, sy + v.y));
        Point2D::new(sum_x / n, sum_y / n)
    }
}

/// A tracked satellite for one observation epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    /// Identifier, unique per epoch
    pub name: String,
    /// Azimuth in degrees, clockwise from north
    pub azimuth: f64,
    /// Elevation in degrees above the horizon
    pub elevation: f64,
    /// Carrier-to-noise density in dB-Hz, when the receiver reported one
    #[serde(default)]
    pub cn0: Option<f64>,
}
impl Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cn0 {
            Some(cn0) => write!(
                f,
                "{} (az {:.1} deg, el {:.1} deg, C/N0 {:.1} dB-Hz)",
                self.name, self.azimuth, self.elevation, cn0
            ),
            None => write!(
                f,
                "{} (az {:.1} deg, el {:.1} deg)",
                self.name, self.azimuth, self.elevation
            ),
        }
    }
}
impl Satellite {
    pub fn new(name: &str, azimuth: f64, elevation: f64) -> Satellite {
        Satellite {
            name: name.to_string(),
            azimuth,
            elevation,
            cn0: None,
        }
    }
    pub fn with_cn0(mut self, cn0: f64) -> Satellite {
        self.cn0 = Some(cn0);
        self
    }
    pub fn is_above_horizon(&self) -> bool {
        self.elevation > 0.0
    }
    /// Signal-strength LOS test: `C/N0 >= threshold`.
    ///
    /// Without a C/N0 reading the test is inconclusive and reports LOS, leaving the decision to
    /// geometry.
    pub fn is_los_from_signal(&self, threshold: f64) -> bool {
        self.cn0.is_none_or(|cn0| cn0 >= threshold)
    }
    /// Ray from `origin` towards this satellite.
    pub fn ray_from(&self, origin: Point3D) -> Ray {
        Ray::from_azimuth_elevation(origin, self.azimuth, self.elevation)
    }
}

/// Wrap an angle to the range `[0, 360)` degrees
///
/// # Example
/// ```rust
/// use urbanlos::wrap_to_360;
/// assert_eq!(wrap_to_360(370.0), 10.0);
/// assert_eq!(wrap_to_360(360.0), 0.0);
/// ```
pub fn wrap_to_360<T>(angle: T) -> T
where
    T: PartialOrd + Copy + std::ops::SubAssign + std::ops::AddAssign + From<f64>,
{
    let mut wrapped: T = angle;
    while wrapped >= T::from(360.0) {
        wrapped -= T::from(360.0);
    }
    while wrapped < T::from(0.0) {
        wrapped += T::from(360.0);
    }
    wrapped
}
/// Wrap an angle to the range -180 to 180 degrees
///
/// # Example
/// ```rust
/// use urbanlos::wrap_to_180;
/// assert_eq!(wrap_to_180(190.0), -170.0);
/// ```
pub fn wrap_to_180<T>(angle: T) -> T
where
    T: PartialOrd + Copy + std::ops::SubAssign + std::ops::AddAssign + From<f64>,
{
    let mut wrapped: T = angle;
    while wrapped > T::from(180.0) {
        wrapped -= T::from(360.0);
    }
    while wrapped < T::from(-180.0) {
        wrapped += T::from(360.0);
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square(center_x: f64, center_y: f64, half: f64, height: f64) -> Building {
        Building::new(
            vec![
                Point3D::new(center_x - half, center_y - half, 0.0),
                Point3D::new(center_x + half, center_y - half, 0.0),
                Point3D::new(center_x + half, center_y + half, 0.0),
                Point3D::new(center_x - half, center_y + half, 0.0),
            ],
            height,
        )
        .unwrap()
    }

    #[test]
    fn test_wrap_to_360() {
        assert_eq!(wrap_to_360(370.0), 10.0);
        assert_eq!(wrap_to_360(-10.0), 350.0);
        assert_eq!(wrap_to_360(0.0), 0.0);
        assert_eq!(wrap_to_360(360.0), 0.0);
    }
    #[test]
    fn test_wrap_to_180() {
        assert_eq!(wrap_to_180(190.0), -170.0);
        assert_eq!(wrap_to_180(-190.0), 170.0);
        assert_eq!(wrap_to_180(180.0), 180.0);
    }
    #[test]
    fn test_azimuth_cardinal_directions() {
        let origin = Point3D::new(100.0, 200.0, 5.0);
        assert_approx_eq!(origin.azimuth_to(&Point3D::new(100.0, 210.0, 0.0)), 0.0, 1e-9);
        assert_approx_eq!(origin.azimuth_to(&Point3D::new(110.0, 200.0, 0.0)), 90.0, 1e-9);
        assert_approx_eq!(origin.azimuth_to(&Point3D::new(100.0, 190.0, 0.0)), 180.0, 1e-9);
        assert_approx_eq!(origin.azimuth_to(&Point3D::new(90.0, 200.0, 0.0)), 270.0, 1e-9);
        assert_eq!(origin.azimuth_to(&origin), 0.0);
    }
    #[test]
    fn test_move_and_measure_are_consistent() {
        let start = Point3D::new(10.0, -4.0, 1.8);
        let end = start.moved_by(25.0, 135.0);
        assert_approx_eq!(start.horizontal_distance_to(&end), 25.0, 1e-9);
        assert_approx_eq!(start.azimuth_to(&end), 135.0, 1e-9);
        assert_eq!(end.z, start.z);
    }
    #[test]
    fn test_distance_is_three_dimensional() {
        let a = Point3D::new(0.0, 0.0, 0.0);
        let b = Point3D::new(3.0, 4.0, 12.0);
        assert_approx_eq!(a.distance_to(&b), 13.0, 1e-12);
        assert_approx_eq!(a.horizontal_distance_to(&b), 5.0, 1e-12);
    }
    #[test]
    fn test_segment_intersection() {
        let hit = segment_intersection(
            &Point2D::new(0.0, 0.0),
            &Point2D::new(4.0, 4.0),
            &Point2D::new(0.0, 4.0),
            &Point2D::new(4.0, 0.0),
        )
        .unwrap();
        assert_approx_eq!(hit.x, 2.0, 1e-12);
        assert_approx_eq!(hit.y, 2.0, 1e-12);
        // Lines cross, segments do not
        assert!(
            segment_intersection(
                &Point2D::new(0.0, 0.0),
                &Point2D::new(1.0, 1.0),
                &Point2D::new(0.0, 4.0),
                &Point2D::new(4.0, 0.0),
            )
            .is_none()
        );
        // Parallel
        assert!(
            segment_intersection(
                &Point2D::new(0.0, 0.0),
                &Point2D::new(1.0, 0.0),
                &Point2D::new(0.0, 1.0),
                &Point2D::new(1.0, 1.0),
            )
            .is_none()
        );
    }
    #[test]
    fn test_ray_direction_is_unit_enu() {
        let ray = Ray::from_azimuth_elevation(Point3D::default(), 90.0, 0.0);
        assert_approx_eq!(ray.direction.x, 1.0, 1e-12);
        assert_approx_eq!(ray.direction.y, 0.0, 1e-12);
        assert_approx_eq!(ray.direction.z, 0.0, 1e-12);
        let ray = Ray::from_azimuth_elevation(Point3D::default(), 30.0, 60.0);
        assert_approx_eq!(ray.direction.norm(), 1.0, 1e-12);
    }
    #[test]
    fn test_ray_crosses_wall_ahead() {
        let ray = Ray::from_azimuth_elevation(Point3D::new(0.0, 0.0, 10.0), 0.0, 45.0);
        let crossing = ray
            .intersect_wall(&Point2D::new(-5.0, 20.0), &Point2D::new(5.0, 20.0))
            .unwrap();
        assert_approx_eq!(crossing.point.x, 0.0, 1e-9);
        assert_approx_eq!(crossing.point.y, 20.0, 1e-9);
        assert_approx_eq!(crossing.horizontal_distance, 20.0, 1e-9);
        assert_approx_eq!(crossing.ray_height, 30.0, 1e-9);
    }
    #[test]
    fn test_ray_ignores_walls_behind_parallel_or_off_segment() {
        let ray = Ray::from_azimuth_elevation(Point3D::default(), 0.0, 30.0);
        // Behind the observer
        assert!(
            ray.intersect_wall(&Point2D::new(-5.0, -20.0), &Point2D::new(5.0, -20.0))
                .is_none()
        );
        // Parallel to the ray
        assert!(
            ray.intersect_wall(&Point2D::new(3.0, 0.0), &Point2D::new(3.0, 50.0))
                .is_none()
        );
        // Supporting line crossed beyond the wall's end
        assert!(
            ray.intersect_wall(&Point2D::new(1.0, 20.0), &Point2D::new(5.0, 20.0))
                .is_none()
        );
        // Degenerate wall
        assert!(
            ray.intersect_wall(&Point2D::new(0.0, 20.0), &Point2D::new(0.0, 20.0))
                .is_none()
        );
    }
    #[test]
    fn test_zenith_ray_never_crosses_walls() {
        let ray = Ray::from_azimuth_elevation(Point3D::default(), 0.0, 90.0);
        assert!(
            ray.intersect_wall(&Point2D::new(-5.0, 1.0), &Point2D::new(5.0, 1.0))
                .is_none()
        );
    }
    #[test]
    fn test_building_closes_ring() {
        let building = square(0.0, 0.0, 5.0, 20.0);
        assert_eq!(building.vertices().len(), 5);
        assert_eq!(building.vertices().first(), building.vertices().last());
        assert_eq!(building.walls().count(), 4);
        let centroid = building.centroid();
        assert_approx_eq!(centroid.x, 0.0, 1e-12);
        assert_approx_eq!(centroid.y, 0.0, 1e-12);
    }
    #[test]
    fn test_building_rejects_too_few_vertices() {
        let result = Building::new(
            vec![
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(1.0, 0.0, 0.0),
                Point3D::new(0.0, 0.0, 0.0),
            ],
            10.0,
        );
        assert!(matches!(
            result,
            Err(LosError::InvalidBuilding {
                unique_vertices: 2,
                ..
            })
        ));
        assert!(Building::new(vec![], 10.0).is_err());
    }
    #[test]
    fn test_building_accepts_collapsed_footprint() {
        // Three distinct 3-D vertices, two distinct footprint points
        let building = Building::new(
            vec![
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(10.0, 0.0, 0.0),
                Point3D::new(10.0, 0.0, 5.0),
            ],
            5.0,
        )
        .unwrap();
        let ray = Ray::from_azimuth_elevation(Point3D::new(5.0, -10.0, 0.0), 0.0, 10.0);
        let crossings: Vec<WallCrossing> = building
            .walls()
            .filter_map(|(p1, p2)| ray.intersect_wall(&p1, &p2))
            .collect();
        assert_eq!(crossings.len(), 2);
        for crossing in &crossings {
            assert_approx_eq!(crossing.horizontal_distance, 10.0, 1e-9);
            assert!(crossing.ray_height < building.height());
        }
    }
    #[test]
    fn test_signal_threshold() {
        let strong = Satellite::new("G01", 0.0, 45.0).with_cn0(40.0);
        let weak = Satellite::new("G02", 0.0, 45.0).with_cn0(30.0);
        let unknown = Satellite::new("G03", 0.0, 45.0);
        assert!(strong.is_los_from_signal(37.0));
        assert!(!weak.is_los_from_signal(37.0));
        assert!(unknown.is_los_from_signal(37.0));
        assert!(Satellite::new("G04", 0.0, 37.0).with_cn0(37.0).is_los_from_signal(37.0));
    }
    #[test]
    fn test_los_nlos_count() {
        let mut signature = LosSignature::new();
        signature.insert("G01".to_string(), true);
        signature.insert("G02".to_string(), false);
        signature.insert("G03".to_string(), true);
        assert_eq!(los_nlos_count(&signature), (2, 1));
    }
}
