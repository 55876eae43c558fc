//! End-to-end occlusion scenarios for the LOS/NLOS classifier
//!
//! The reference scenario is a single 20 m long, 100 m tall wall centred 15 m from the observer,
//! perpendicular to a satellite at azimuth 45 deg and elevation 45 deg. From 85 m the ray reaches
//! the wall at exactly roof height (a grazing ray, classified LOS); from 50 m it passes 35 m
//! below the roof.
use assert_approx_eq::assert_approx_eq;

use urbanlos::los::{ClassificationMode, Classifier, LosCalculator, LosConfig};
use urbanlos::{Building, LosError, Point2D, Point3D, Satellite};

const WALL_DISTANCE: f64 = 15.0;
const WALL_LENGTH: f64 = 20.0;
const WALL_HEIGHT: f64 = 100.0;

/// Wall perpendicular to `azimuth`, centred `WALL_DISTANCE` meters from `observer`
fn test_wall(observer: &Point3D, azimuth: f64) -> Building {
    let center = observer.moved_by(WALL_DISTANCE, azimuth);
    let start = center.moved_by(WALL_LENGTH / 2.0, azimuth - 90.0);
    let end = center.moved_by(WALL_LENGTH / 2.0, azimuth + 90.0);
    Building::wall(start.horizontal(), end.horizontal(), WALL_HEIGHT).unwrap()
}

fn geometric() -> LosConfig {
    LosConfig {
        mode: ClassificationMode::GeometricOnly,
        ..Default::default()
    }
}

#[test]
fn test_grazing_ray_from_85_m_is_los() {
    let observer = Point3D::new(0.0, 0.0, 85.0);
    let satellite = Satellite::new("TEST", 45.0, 45.0);
    let calculator = LosCalculator::new(
        vec![test_wall(&observer, 45.0)],
        vec![satellite.clone()],
        geometric(),
    );
    let result = calculator.geometric_los(&observer, &satellite);
    assert!(result.is_los);
    assert_eq!(result.required_height(&satellite).unwrap(), 0.0);
}

#[test]
fn test_ray_from_50_m_is_blocked_by_35_m() {
    let observer = Point3D::new(0.0, 0.0, 50.0);
    let satellite = Satellite::new("TEST", 45.0, 45.0);
    let mut calculator = LosCalculator::new(
        vec![test_wall(&observer, 45.0)],
        vec![satellite.clone()],
        geometric(),
    );
    let result = calculator.geometric_los(&observer, &satellite);
    assert!(!result.is_los);
    assert_approx_eq!(result.delta_h, 35.0, 1e-6);
    let hit = result.intersection.unwrap();
    assert_approx_eq!(hit.distance_to(&Point2D::new(0.0, 0.0)), WALL_DISTANCE, 1e-6);
    assert_eq!(calculator.calculate_los(&observer)["TEST"], false);

    // Raising the observer by the deficit makes it a grazing ray again
    let raised = Point3D::new(0.0, 0.0, 50.0 + result.delta_h);
    assert!(calculator.geometric_los(&raised, &satellite).is_los);
}

#[test]
fn test_scenario_holds_away_from_the_origin() {
    let observer = Point3D::new(684_512.3, 3_551_020.8, 50.0);
    let satellite = Satellite::new("TEST", 45.0, 45.0);
    let calculator = LosCalculator::new(
        vec![test_wall(&observer, 45.0)],
        vec![satellite.clone()],
        geometric(),
    );
    assert_approx_eq!(calculator.geometric_los(&observer, &satellite).delta_h, 35.0, 1e-6);
}

#[test]
fn test_elevation_sweep_switches_at_the_wall_angle() {
    let observer = Point3D::new(0.0, 0.0, 0.0);
    let critical = (WALL_HEIGHT / WALL_DISTANCE).atan().to_degrees();
    let wall = test_wall(&observer, 45.0);
    let calculator = LosCalculator::new(vec![wall], vec![], geometric());
    for step in 1..90 {
        let elevation = step as f64;
        let satellite = Satellite::new("SWEEP", 45.0, elevation);
        let result = calculator.geometric_los(&observer, &satellite);
        if elevation > critical + 1e-6 {
            assert!(result.is_los, "elevation {elevation}");
        } else if elevation < critical - 1e-6 {
            assert!(!result.is_los, "elevation {elevation}");
            assert!(result.delta_h > 0.0);
        }
    }
}

#[test]
fn test_azimuth_sweep_only_blocks_towards_the_wall() {
    let observer = Point3D::new(0.0, 0.0, 1.8);
    let calculator = LosCalculator::new(vec![test_wall(&observer, 45.0)], vec![], geometric());
    // Half-width of the wall seen from the observer
    let half_angle = (WALL_LENGTH / 2.0 / WALL_DISTANCE).atan().to_degrees();
    for azimuth in (0..360).step_by(5) {
        let azimuth = azimuth as f64;
        let satellite = Satellite::new("SWEEP", azimuth, 30.0);
        let off_axis = urbanlos::wrap_to_180(azimuth - 45.0).abs();
        let result = calculator.geometric_los(&observer, &satellite);
        if off_axis < half_angle - 1.0 {
            assert!(!result.is_los, "azimuth {azimuth}");
        } else if off_axis > half_angle + 1.0 {
            assert!(result.is_los, "azimuth {azimuth}");
        }
    }
}

#[test]
fn test_required_height_is_rejected_below_horizon() {
    let observer = Point3D::new(0.0, 0.0, 50.0);
    let satellite = Satellite::new("LOW", 45.0, -1.0);
    let calculator = LosCalculator::new(vec![test_wall(&observer, 45.0)], vec![], geometric());
    let result = calculator.geometric_los(&observer, &satellite);
    assert!(!result.is_los);
    assert!(matches!(
        result.required_height(&satellite),
        Err(LosError::BelowHorizon { .. })
    ));
}

#[test]
fn test_misclassification_inverts_the_scenario() {
    let observer = Point3D::new(0.0, 0.0, 50.0);
    let satellites = vec![
        Satellite::new("BLOCKED", 45.0, 45.0),
        Satellite::new("CLEAR", 225.0, 45.0),
    ];
    let buildings = vec![test_wall(&observer, 45.0)];
    let mut exact = LosCalculator::new(buildings.clone(), satellites.clone(), geometric());
    let mut inverted = LosCalculator::new(
        buildings,
        satellites,
        LosConfig {
            misclassification_percent: 100.0,
            ..geometric()
        },
    );
    let truth = exact.calculate_los(&observer);
    let flipped = inverted.calculate_los(&observer);
    assert_eq!(truth["BLOCKED"], false);
    assert_eq!(truth["CLEAR"], true);
    assert_eq!(flipped["BLOCKED"], true);
    assert_eq!(flipped["CLEAR"], false);
}
