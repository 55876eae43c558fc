//! Building-occlusion LOS/NLOS classification
//!
//! The geometric test treats every building as a vertical prism and shoots a ray from the
//! observer towards the satellite. Because walls are vertical the intersection is solved in the
//! horizontal plane; the ray's altitude above the crossing point is then compared with the roof
//! height. A satellite is NLOS as soon as one wall of one building rises above the ray.
//!
//! On top of the geometric test the [`LosCalculator`] applies a runtime-selectable
//! [`ClassificationMode`]:
//! - `GeometricOnly`: the ray/wall test alone.
//! - `SignalStrengthOnly`: LOS iff C/N0 reaches the configured threshold.
//! - `Hybrid`: LOS iff both agree on LOS. When geometry says LOS but the signal is weak, the
//!   satellite's C/N0 is degraded by a random attenuation to mimic multipath that the prism model
//!   cannot see. The degraded value is returned in [`SatelliteLos::effective_cn0`]; the caller's
//!   satellite list is never modified.
//!
//! Two optional stochastic layers exist for experiments: misclassification injection (flip each
//! label with a configured probability) and ray-shooting culling, which only tests the most
//! relevant `ceil(2 ln(B + 1))` buildings. Ray-shooting can miss a true occluder and report a
//! false LOS, so it must stay disabled when exact geometry matters.
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::{
    Building, LosError, LosSignature, Point2D, Point3D, Result, Satellite, WallCrossing,
    los_nlos_count,
};

/// Distance below which an observer is considered to stand on a building's centroid.
const CENTROID_EPSILON: f64 = 1e-10;
/// Height scale (meters) of the logarithmic height bonus in the ray-shooting score.
const RELEVANCE_HEIGHT_SCALE: f64 = 50.0;

/// How the final LOS/NLOS label is derived for a satellite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClassificationMode {
    /// Ray/wall geometry only
    GeometricOnly,
    /// C/N0 threshold only
    SignalStrengthOnly,
    /// Geometry AND signal strength
    #[default]
    Hybrid,
}
impl From<String> for ClassificationMode {
    fn from(mode: String) -> Self {
        ClassificationMode::from(mode.as_str())
    }
}
impl From<&str> for ClassificationMode {
    /// Parse a mode name, ignoring case and `_`/`-`/space separators.
    ///
    /// Unknown names fall back to [`ClassificationMode::GeometricOnly`] with a warning.
    fn from(mode: &str) -> Self {
        let normalized: String = mode
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "GEOMETRICONLY" | "GEOMETRIC" => ClassificationMode::GeometricOnly,
            "SIGNALSTRENGTHONLY" | "SIGNALONLY" | "SIGNAL" => {
                ClassificationMode::SignalStrengthOnly
            }
            "HYBRID" => ClassificationMode::Hybrid,
            _ => {
                warn!("Unknown classification mode '{mode}', falling back to GEOMETRIC_ONLY");
                ClassificationMode::GeometricOnly
            }
        }
    }
}
impl From<ClassificationMode> for String {
    fn from(mode: ClassificationMode) -> Self {
        mode.to_string()
    }
}
impl Display for ClassificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassificationMode::GeometricOnly => "GEOMETRIC_ONLY",
            ClassificationMode::SignalStrengthOnly => "SIGNAL_STRENGTH_ONLY",
            ClassificationMode::Hybrid => "HYBRID",
        };
        write!(f, "{name}")
    }
}

/// Classifier settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LosConfig {
    pub mode: ClassificationMode,
    /// C/N0 at or above which a signal counts as LOS (dB-Hz)
    pub signal_threshold_dbhz: f64,
    /// Cull buildings with the ray-shooting heuristic
    pub ray_shooting: bool,
    /// Probability in percent of flipping each final label
    pub misclassification_percent: f64,
    /// A wall blocks only if it rises more than this above the ray (meters)
    pub los_tolerance_m: f64,
    pub degradation_min_dbhz: f64,
    pub degradation_max_dbhz: f64,
    /// Degraded C/N0 never drops below this value (dB-Hz)
    pub degradation_floor_dbhz: f64,
    /// When set, replace geometry with random labels that are LOS with this probability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_los_probability: Option<f64>,
    pub seed: u64,
}
impl Default for LosConfig {
    fn default() -> Self {
        LosConfig {
            mode: ClassificationMode::Hybrid,
            signal_threshold_dbhz: 37.0,
            ray_shooting: false,
            misclassification_percent: 0.0,
            los_tolerance_m: 1e-6,
            degradation_min_dbhz: 10.0,
            degradation_max_dbhz: 20.0,
            degradation_floor_dbhz: 20.0,
            stub_los_probability: None,
            seed: 42,
        }
    }
}
impl LosConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.signal_threshold_dbhz.is_finite() {
            return Err(LosError::InvalidConfig(
                "signal threshold must be finite".to_string(),
            ));
        }
        if !(self.los_tolerance_m >= 0.0) {
            return Err(LosError::InvalidConfig(format!(
                "LOS tolerance must be non-negative, got {}",
                self.los_tolerance_m
            )));
        }
        if !(self.degradation_min_dbhz <= self.degradation_max_dbhz) {
            return Err(LosError::InvalidConfig(format!(
                "degradation range [{}, {}) is empty",
                self.degradation_min_dbhz, self.degradation_max_dbhz
            )));
        }
        if let Some(p) = self.stub_los_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(LosError::InvalidConfig(format!(
                    "stub LOS probability must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of testing one (position, satellite) pair against the building set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LosResult {
    pub is_los: bool,
    /// Roof height minus ray height at the blocking wall; zero when LOS
    pub delta_h: f64,
    /// Horizontal crossing point of the blocking wall
    pub intersection: Option<Point2D>,
    /// Ray altitude at the blocking wall
    pub ray_height: Option<f64>,
}
impl LosResult {
    pub fn clear() -> LosResult {
        LosResult {
            is_los: true,
            delta_h: 0.0,
            intersection: None,
            ray_height: None,
        }
    }
    fn blocked(crossing: &WallCrossing, height: f64) -> LosResult {
        LosResult {
            is_los: false,
            delta_h: height - crossing.ray_height,
            intersection: Some(crossing.point),
            ray_height: Some(crossing.ray_height),
        }
    }
    /// Additional observer height needed to see `satellite` over the blocking wall.
    ///
    /// Raising the observer raises the ray by the same amount at every distance, so the answer
    /// is `delta_h` (zero when already LOS).
    ///
    /// # Errors
    /// [`LosError::BelowHorizon`] when the satellite's elevation is not positive: the ray never
    /// climbs and no finite height guarantees visibility.
    pub fn required_height(&self, satellite: &Satellite) -> Result<f64> {
        if !satellite.is_above_horizon() {
            return Err(LosError::BelowHorizon {
                satellite: satellite.name.clone(),
                elevation: satellite.elevation,
            });
        }
        Ok(if self.is_los { 0.0 } else { self.delta_h })
    }
}

/// Test one building: the first wall rising more than `tolerance` above the ray blocks it.
///
/// Degenerate and parallel walls never block. See [`crate::Ray::intersect_wall`].
pub fn classify_against_building(
    observer: &Point3D,
    building: &Building,
    satellite: &Satellite,
    tolerance: f64,
) -> LosResult {
    let ray = satellite.ray_from(*observer);
    for (p1, p2) in building.walls() {
        if let Some(crossing) = ray.intersect_wall(&p1, &p2) {
            if building.height() - crossing.ray_height > tolerance {
                return LosResult::blocked(&crossing, building.height());
            }
        }
    }
    LosResult::clear()
}

/// Ray-shooting relevance of `building` for a ray leaving `observer` towards `satellite`.
///
/// `max(0, d_h · u) / (1 + dist) · ln(1 + height / 50)`, where `d_h` is the horizontal part of
/// the ray direction and `u` the unit vector towards the building centroid. An observer standing
/// on the centroid gets the maximum score.
pub fn relevance_score(observer: &Point3D, building: &Building, satellite: &Satellite) -> f64 {
    let to_centroid = building.centroid().to_vector() - observer.horizontal().to_vector();
    let distance = to_centroid.norm();
    if distance < CENTROID_EPSILON {
        return f64::MAX;
    }
    let alignment = satellite
        .ray_from(*observer)
        .horizontal_direction()
        .dot(&(to_centroid / distance));
    alignment.max(0.0) / (1.0 + distance) * (1.0 + building.height() / RELEVANCE_HEIGHT_SCALE).ln()
}

/// Number of buildings the ray-shooting heuristic tests out of `total`.
pub fn ray_shooting_budget(total: usize) -> usize {
    let budget = (2.0 * ((total + 1) as f64).ln()).ceil() as usize;
    budget.min(total)
}

/// Attenuate a C/N0 reading by `attenuation` dB-Hz without going below `floor`.
pub fn degraded_cn0(cn0: f64, attenuation: f64, floor: f64) -> f64 {
    (cn0 - attenuation).max(floor)
}

/// Draw an attenuation from `[min, max)`; an empty range yields `min`.
pub(crate) fn draw_attenuation(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if min < max {
        rng.random_range(min..max)
    } else {
        min
    }
}

/// Per-satellite diagnostics of a classification query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SatelliteLos {
    pub name: String,
    /// Final label, after the mode policy and misclassification
    pub is_los: bool,
    /// Signal-strength verdict, when the mode consulted it
    pub signal_los: Option<bool>,
    /// Geometric verdict, when the mode consulted it
    pub geometric: Option<LosResult>,
    /// C/N0 after hybrid degradation, or the reported value
    pub effective_cn0: Option<f64>,
    /// Whether misclassification injection flipped the label
    pub flipped: bool,
}

/// Something that labels every tracked satellite as LOS or NLOS for a position.
///
/// Takes `&mut self` because classifiers may draw random numbers.
pub trait Classifier {
    fn calculate_los(&mut self, position: &Point3D) -> LosSignature;
}
impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn calculate_los(&mut self, position: &Point3D) -> LosSignature {
        (**self).calculate_los(position)
    }
}

/// Occlusion classifier over a fixed building set.
#[derive(Clone, Debug)]
pub struct LosCalculator {
    buildings: Vec<Building>,
    satellites: Vec<Satellite>,
    config: LosConfig,
    rng: StdRng,
}

impl LosCalculator {
    pub fn new(buildings: Vec<Building>, satellites: Vec<Satellite>, config: LosConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let mut calculator = LosCalculator {
            buildings,
            satellites,
            config,
            rng,
        };
        calculator.set_misclassification_percent(calculator.config.misclassification_percent);
        debug!(
            "LOS calculator: {} buildings, {} satellites, mode {}, ray shooting {}",
            calculator.buildings.len(),
            calculator.satellites.len(),
            calculator.config.mode,
            calculator.config.ray_shooting
        );
        calculator
    }
    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }
    pub fn satellites(&self) -> &[Satellite] {
        &self.satellites
    }
    pub fn config(&self) -> &LosConfig {
        &self.config
    }
    /// Replace the tracked satellites, e.g. for a new observation epoch.
    pub fn set_satellites(&mut self, satellites: Vec<Satellite>) {
        self.satellites = satellites;
    }
    pub fn set_mode(&mut self, mode: ClassificationMode) {
        self.config.mode = mode;
    }
    pub fn set_ray_shooting(&mut self, enabled: bool) {
        self.config.ray_shooting = enabled;
    }
    /// Set the misclassification probability in percent, clamped to `[0, 100]`.
    pub fn set_misclassification_percent(&mut self, percent: f64) {
        self.config.misclassification_percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
    }
    /// Buildings to test for this ray, most relevant first.
    ///
    /// Without ray shooting this is every building in load order.
    pub fn candidate_buildings(&self, position: &Point3D, satellite: &Satellite) -> Vec<&Building> {
        candidates(&self.buildings, &self.config, position, satellite)
    }
    /// Geometric verdict for one satellite: the first blocking candidate building wins.
    pub fn geometric_los(&self, position: &Point3D, satellite: &Satellite) -> LosResult {
        geometric_los(&self.buildings, &self.config, position, satellite)
    }
    /// Classify an arbitrary satellite from `position` under the configured policy.
    pub fn classify_satellite(&mut self, position: &Point3D, satellite: &Satellite) -> SatelliteLos {
        classify_satellite(
            &self.buildings,
            &self.config,
            &mut self.rng,
            position,
            satellite,
        )
    }
    /// Classify every tracked satellite and keep the diagnostics.
    pub fn classify_detailed(&mut self, position: &Point3D) -> Vec<SatelliteLos> {
        self.satellites
            .iter()
            .map(|satellite| {
                classify_satellite(
                    &self.buildings,
                    &self.config,
                    &mut self.rng,
                    position,
                    satellite,
                )
            })
            .collect()
    }
}

impl Classifier for LosCalculator {
    fn calculate_los(&mut self, position: &Point3D) -> LosSignature {
        self.classify_detailed(position)
            .into_iter()
            .map(|result| (result.name, result.is_los))
            .collect()
    }
}

fn candidates<'a>(
    buildings: &'a [Building],
    config: &LosConfig,
    position: &Point3D,
    satellite: &Satellite,
) -> Vec<&'a Building> {
    if !config.ray_shooting {
        return buildings.iter().collect();
    }
    let mut scored: Vec<(f64, &Building)> = buildings
        .iter()
        .map(|building| (relevance_score(position, building, satellite), building))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let budget = ray_shooting_budget(buildings.len());
    debug!(
        "Ray shooting towards {}: testing {} of {} buildings",
        satellite.name,
        budget,
        buildings.len()
    );
    scored.truncate(budget);
    scored.into_iter().map(|(_, building)| building).collect()
}

fn geometric_los(
    buildings: &[Building],
    config: &LosConfig,
    position: &Point3D,
    satellite: &Satellite,
) -> LosResult {
    candidates(buildings, config, position, satellite)
        .into_iter()
        .map(|building| {
            classify_against_building(position, building, satellite, config.los_tolerance_m)
        })
        .find(|result| !result.is_los)
        .unwrap_or_else(LosResult::clear)
}

fn classify_satellite(
    buildings: &[Building],
    config: &LosConfig,
    rng: &mut StdRng,
    position: &Point3D,
    satellite: &Satellite,
) -> SatelliteLos {
    let mut effective_cn0 = satellite.cn0;
    let (is_los, signal_los, geometric) = match config.mode {
        ClassificationMode::GeometricOnly => {
            let geometric = geometric_los(buildings, config, position, satellite);
            (geometric.is_los, None, Some(geometric))
        }
        ClassificationMode::SignalStrengthOnly => {
            let signal_los = satellite.is_los_from_signal(config.signal_threshold_dbhz);
            (signal_los, Some(signal_los), None)
        }
        ClassificationMode::Hybrid => {
            let signal_los = satellite.is_los_from_signal(config.signal_threshold_dbhz);
            let geometric = geometric_los(buildings, config, position, satellite);
            if !signal_los && geometric.is_los {
                effective_cn0 = satellite.cn0.map(|cn0| {
                    let attenuation = draw_attenuation(
                        rng,
                        config.degradation_min_dbhz,
                        config.degradation_max_dbhz,
                    );
                    degraded_cn0(cn0, attenuation, config.degradation_floor_dbhz)
                });
            }
            (signal_los && geometric.is_los, Some(signal_los), Some(geometric))
        }
    };
    let flipped = config.misclassification_percent > 0.0
        && rng.random::<f64>() * 100.0 < config.misclassification_percent;
    SatelliteLos {
        name: satellite.name.clone(),
        is_los: is_los != flipped,
        signal_los,
        geometric,
        effective_cn0,
        flipped,
    }
}

/// Classifier that ignores geometry and labels satellites LOS at random.
///
/// Used for demos and for checking how the filter behaves without any occlusion information.
#[derive(Clone, Debug)]
pub struct RandomStubClassifier {
    satellites: Vec<Satellite>,
    los_probability: f64,
    rng: StdRng,
}
impl RandomStubClassifier {
    /// `los_probability` is clamped to `[0, 1]`.
    pub fn new(satellites: Vec<Satellite>, los_probability: f64, seed: u64) -> Self {
        let los_probability = if los_probability.is_nan() {
            0.5
        } else {
            los_probability.clamp(0.0, 1.0)
        };
        RandomStubClassifier {
            satellites,
            los_probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}
impl Classifier for RandomStubClassifier {
    fn calculate_los(&mut self, _position: &Point3D) -> LosSignature {
        self.satellites
            .iter()
            .map(|satellite| {
                (
                    satellite.name.clone(),
                    self.rng.random_bool(self.los_probability),
                )
            })
            .collect()
    }
}

/// Compact `LOS n / NLOS m` summary of a signature.
pub fn status_line(signature: &LosSignature) -> String {
    let (los, nlos) = los_nlos_count(signature);
    format!("LOS {los} / NLOS {nlos}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// A 20 m wall centred `distance` meters from the origin, perpendicular to `azimuth`.
    fn facing_wall(azimuth: f64, distance: f64, height: f64) -> Building {
        let az = azimuth.to_radians();
        let center = Point2D::new(distance * az.sin(), distance * az.cos());
        let along = Point2D::new(az.cos(), -az.sin());
        Building::wall(
            Point2D::new(center.x - 10.0 * along.x, center.y - 10.0 * along.y),
            Point2D::new(center.x + 10.0 * along.x, center.y + 10.0 * along.y),
            height,
        )
        .unwrap()
    }

    fn geometric_config() -> LosConfig {
        LosConfig {
            mode: ClassificationMode::GeometricOnly,
            ..Default::default()
        }
    }

    #[test]
    fn test_grazing_ray_is_los() {
        let wall = facing_wall(45.0, 15.0, 100.0);
        let satellite = Satellite::new("G01", 45.0, 45.0);
        let result = classify_against_building(&Point3D::new(0.0, 0.0, 85.0), &wall, &satellite, 1e-6);
        assert!(result.is_los);
        assert_eq!(result.delta_h, 0.0);
        assert!(result.intersection.is_none());
    }
    #[test]
    fn test_lower_observer_is_blocked() {
        let wall = facing_wall(45.0, 15.0, 100.0);
        let satellite = Satellite::new("G01", 45.0, 45.0);
        let result = classify_against_building(&Point3D::new(0.0, 0.0, 50.0), &wall, &satellite, 1e-6);
        assert!(!result.is_los);
        assert_approx_eq!(result.delta_h, 35.0, 1e-9);
        assert_approx_eq!(result.ray_height.unwrap(), 65.0, 1e-9);
        let hit = result.intersection.unwrap();
        assert_approx_eq!(hit.x, 15.0 * 45f64.to_radians().sin(), 1e-9);
        assert_approx_eq!(hit.y, 15.0 * 45f64.to_radians().cos(), 1e-9);
        assert_approx_eq!(result.required_height(&satellite).unwrap(), 35.0, 1e-9);
    }
    #[test]
    fn test_elevation_boundary_follows_wall_angle() {
        let wall = facing_wall(0.0, 20.0, 30.0);
        let critical = (30.0f64 / 20.0).atan().to_degrees();
        let observer = Point3D::new(0.0, 0.0, 0.0);
        let above = Satellite::new("G01", 0.0, critical + 1.0);
        let below = Satellite::new("G02", 0.0, critical - 1.0);
        assert!(classify_against_building(&observer, &wall, &above, 1e-6).is_los);
        let blocked = classify_against_building(&observer, &wall, &below, 1e-6);
        assert!(!blocked.is_los);
        assert!(blocked.delta_h > 0.0);
    }
    #[test]
    fn test_satellite_behind_observer_is_not_blocked() {
        let wall = facing_wall(0.0, 20.0, 300.0);
        let satellite = Satellite::new("G01", 180.0, 10.0);
        assert!(classify_against_building(&Point3D::default(), &wall, &satellite, 1e-6).is_los);
    }
    #[test]
    fn test_required_height_rejects_low_satellites() {
        let horizon = Satellite::new("G09", 90.0, 0.0);
        let below = Satellite::new("G10", 90.0, -5.0);
        let result = LosResult::clear();
        assert!(matches!(
            result.required_height(&horizon),
            Err(LosError::BelowHorizon { .. })
        ));
        assert!(result.required_height(&below).is_err());
        assert_eq!(
            result
                .required_height(&Satellite::new("G11", 90.0, 30.0))
                .unwrap(),
            0.0
        );
    }
    #[test]
    fn test_calculator_short_circuits_on_first_blocker() {
        let buildings = vec![
            facing_wall(0.0, 50.0, 10.0),
            facing_wall(0.0, 20.0, 80.0),
            facing_wall(0.0, 40.0, 200.0),
        ];
        let satellite = Satellite::new("G05", 0.0, 30.0);
        let calculator = LosCalculator::new(buildings, vec![satellite.clone()], geometric_config());
        let result = calculator.geometric_los(&Point3D::default(), &satellite);
        assert!(!result.is_los);
        // Second building in load order blocks first
        assert_approx_eq!(result.intersection.unwrap().y, 20.0, 1e-9);
    }
    #[test]
    fn test_signature_covers_every_satellite() {
        let satellites = vec![
            Satellite::new("G01", 0.0, 20.0),
            Satellite::new("G02", 180.0, 20.0),
            Satellite::new("G03", 0.0, 85.0),
        ];
        let mut calculator = LosCalculator::new(
            vec![facing_wall(0.0, 10.0, 30.0)],
            satellites,
            geometric_config(),
        );
        let signature = calculator.calculate_los(&Point3D::default());
        assert_eq!(signature.len(), 3);
        assert_eq!(signature["G01"], false);
        assert_eq!(signature["G02"], true);
        assert_eq!(signature["G03"], true);
        assert_eq!(status_line(&signature), "LOS 2 / NLOS 1");
    }
    #[test]
    fn test_empty_building_set_is_all_los() {
        let mut calculator = LosCalculator::new(
            vec![],
            vec![Satellite::new("G01", 0.0, 5.0)],
            geometric_config(),
        );
        assert!(calculator.calculate_los(&Point3D::default())["G01"]);
    }
    #[test]
    fn test_signal_only_uses_threshold() {
        let satellites = vec![
            Satellite::new("G01", 0.0, 20.0).with_cn0(45.0),
            Satellite::new("G02", 0.0, 20.0).with_cn0(25.0),
        ];
        let config = LosConfig {
            mode: ClassificationMode::SignalStrengthOnly,
            ..Default::default()
        };
        // The wall would block both; signal-only ignores it
        let mut calculator = LosCalculator::new(vec![facing_wall(0.0, 10.0, 100.0)], satellites, config);
        let detailed = calculator.classify_detailed(&Point3D::default());
        assert!(detailed[0].is_los);
        assert!(!detailed[1].is_los);
        assert!(detailed.iter().all(|result| result.geometric.is_none()));
    }
    #[test]
    fn test_hybrid_degrades_weak_signal_without_mutating_input() {
        let satellite = Satellite::new("G01", 0.0, 60.0).with_cn0(35.0);
        let mut calculator = LosCalculator::new(vec![], vec![satellite.clone()], LosConfig::default());
        let result = calculator.classify_satellite(&Point3D::default(), &satellite);
        assert!(!result.is_los);
        assert_eq!(result.signal_los, Some(false));
        assert!(result.geometric.unwrap().is_los);
        let degraded = result.effective_cn0.unwrap();
        assert!(degraded <= 25.0 && degraded >= 20.0, "{degraded}");
        assert_eq!(calculator.satellites()[0].cn0, Some(35.0));
    }
    #[test]
    fn test_hybrid_requires_both_to_agree() {
        let strong_blocked = Satellite::new("G01", 0.0, 10.0).with_cn0(48.0);
        let strong_clear = Satellite::new("G02", 180.0, 10.0).with_cn0(48.0);
        let mut calculator = LosCalculator::new(
            vec![facing_wall(0.0, 10.0, 50.0)],
            vec![strong_blocked, strong_clear],
            LosConfig::default(),
        );
        let detailed = calculator.classify_detailed(&Point3D::default());
        assert!(!detailed[0].is_los);
        assert_eq!(detailed[0].effective_cn0, Some(48.0));
        assert!(detailed[1].is_los);
    }
    #[test]
    fn test_degradation_is_floored() {
        assert_eq!(degraded_cn0(28.0, 15.0, 20.0), 20.0);
        assert_eq!(degraded_cn0(45.0, 12.0, 20.0), 33.0);
    }
    #[test]
    fn test_full_misclassification_inverts_every_label() {
        let satellites: Vec<Satellite> = (0..12)
            .map(|i| Satellite::new(&format!("G{i:02}"), i as f64 * 30.0, 25.0))
            .collect();
        let buildings = vec![facing_wall(0.0, 15.0, 40.0), facing_wall(120.0, 25.0, 60.0)];
        let position = Point3D::new(0.0, 0.0, 1.5);

        let mut exact = LosCalculator::new(buildings.clone(), satellites.clone(), geometric_config());
        let mut inverted = LosCalculator::new(
            buildings,
            satellites,
            LosConfig {
                misclassification_percent: 100.0,
                ..geometric_config()
            },
        );
        let truth = exact.calculate_los(&position);
        let flipped = inverted.calculate_los(&position);
        assert_eq!(truth.len(), flipped.len());
        for (name, is_los) in &truth {
            assert_eq!(flipped[name], !is_los, "{name}");
        }
    }
    #[test]
    fn test_misclassification_is_clamped() {
        let mut calculator = LosCalculator::new(vec![], vec![], LosConfig::default());
        calculator.set_misclassification_percent(250.0);
        assert_eq!(calculator.config().misclassification_percent, 100.0);
        calculator.set_misclassification_percent(-3.0);
        assert_eq!(calculator.config().misclassification_percent, 0.0);
    }
    #[test]
    fn test_ray_shooting_budget_is_logarithmic() {
        assert_eq!(ray_shooting_budget(0), 0);
        assert_eq!(ray_shooting_budget(1), 1);
        assert_eq!(ray_shooting_budget(10), 5);
        assert_eq!(ray_shooting_budget(100), 10);
    }
    #[test]
    fn test_ray_shooting_prefers_buildings_ahead() {
        let ahead = facing_wall(0.0, 20.0, 60.0);
        let behind = facing_wall(180.0, 20.0, 60.0);
        let satellite = Satellite::new("G01", 0.0, 30.0);
        let observer = Point3D::default();
        assert!(relevance_score(&observer, &ahead, &satellite) > 0.0);
        assert_eq!(relevance_score(&observer, &behind, &satellite), 0.0);
        let on_top = Building::new(
            vec![
                Point3D::new(-1.0, -1.0, 0.0),
                Point3D::new(1.0, -1.0, 0.0),
                Point3D::new(1.0, 1.0, 0.0),
                Point3D::new(-1.0, 1.0, 0.0),
            ],
            10.0,
        )
        .unwrap();
        assert_eq!(relevance_score(&observer, &on_top, &satellite), f64::MAX);
    }
    #[test]
    fn test_ray_shooting_still_finds_the_occluder() {
        let mut buildings: Vec<Building> = (0..30)
            .map(|i| facing_wall(180.0 + (i as f64 - 15.0), 100.0 + i as f64 * 10.0, 40.0))
            .collect();
        buildings.push(facing_wall(0.0, 20.0, 60.0));
        let satellite = Satellite::new("G01", 0.0, 30.0);
        let config = LosConfig {
            ray_shooting: true,
            ..geometric_config()
        };
        let calculator = LosCalculator::new(buildings, vec![satellite.clone()], config);
        let candidates = calculator.candidate_buildings(&Point3D::default(), &satellite);
        assert_eq!(candidates.len(), ray_shooting_budget(31));
        assert_approx_eq!(candidates[0].centroid().y, 20.0, 1e-9);
        assert!(!calculator.geometric_los(&Point3D::default(), &satellite).is_los);
    }
    #[test]
    fn test_mode_parsing_is_lenient() {
        assert_eq!(ClassificationMode::from("HYBRID"), ClassificationMode::Hybrid);
        assert_eq!(
            ClassificationMode::from("signal-strength-only"),
            ClassificationMode::SignalStrengthOnly
        );
        assert_eq!(
            ClassificationMode::from("Geometric_Only"),
            ClassificationMode::GeometricOnly
        );
        assert_eq!(
            ClassificationMode::from("ray-traced"),
            ClassificationMode::GeometricOnly
        );
        assert_eq!(String::from(ClassificationMode::Hybrid), "HYBRID");
    }
    #[test]
    fn test_config_rejects_bad_values() {
        assert!(LosConfig::default().validate().is_ok());
        let config = LosConfig {
            degradation_min_dbhz: 25.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = LosConfig {
            stub_los_probability: Some(1.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
    #[test]
    fn test_stub_classifier_honours_extremes() {
        let satellites = vec![Satellite::new("G01", 0.0, 40.0), Satellite::new("G02", 90.0, 40.0)];
        let mut always = RandomStubClassifier::new(satellites.clone(), 1.0, 7);
        let mut never = RandomStubClassifier::new(satellites, 0.0, 7);
        let position = Point3D::default();
        assert!(always.calculate_los(&position).values().all(|&los| los));
        assert!(never.calculate_los(&position).values().all(|&los| !los));
    }
}
