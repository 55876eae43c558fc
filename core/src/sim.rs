//! Batch runs over recorded routes.
//!
//! This module provides:
//! - `SimulationConfig` and its sections, readable and writable as JSON, YAML or TOML
//! - Loaders for the route (CSV), the satellite epoch (CSV) and the building set (JSON), with an
//!   injected [`CoordinateTransform`] projecting them into the planar frame
//! - Precondition checks that must pass before a filter run starts
//! - `run_filter` / `run_simulation`, which drive the particle filter over a route and collect
//!   per-step error metrics into a `FilterRun`
//! - CSV export of run results, urban signal degradation, and the required-height report
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::earth::{CoordinateTransform, LocalTangentPlane, Planar};
use crate::los::{
    Classifier, LosCalculator, RandomStubClassifier, degraded_cn0, draw_attenuation, status_line,
};
use crate::particle::{ParticleFilter, PopulationSnapshot};
use crate::{
    Building, LosError, Point2D, Point3D, Result, Satellite, los_nlos_count,
};

pub use crate::los::{ClassificationMode, LosConfig};
pub use crate::particle::{ParticleFilterConfig, WeightFunction};

/// Route points between two progress log lines
const PROGRESS_INTERVAL: usize = 50;

/// Log verbosity for the command line tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}
impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{level}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Append log lines to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Input file locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// CSV with columns `timestamp,x,y,z`
    pub route: String,
    /// CSV with columns `name,azimuth,elevation,cn0` (`cn0` may be empty)
    pub satellites: String,
    /// JSON array of `{ "height": h, "vertices": [[x, y, z], ...] }`
    pub buildings: String,
}
impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            route: "data/route.csv".to_string(),
            satellites: "data/satellites.csv".to_string(),
            buildings: "data/buildings.json".to_string(),
        }
    }
}

/// Frame in which input coordinates are recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateConfig {
    /// Already planar meters (UTM or a local grid)
    #[default]
    Planar,
    /// Geodetic degrees (`x` = longitude, `y` = latitude) around a fixed origin
    LocalTangentPlane(LocalTangentPlane),
}
impl CoordinateConfig {
    pub fn transform(&self) -> Box<dyn CoordinateTransform> {
        match self {
            CoordinateConfig::Planar => Box::new(Planar),
            CoordinateConfig::LocalTangentPlane(ltp) => Box::new(*ltp),
        }
    }
}

/// Random C/N0 attenuation applied to the satellite epoch before a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrbanDegradationConfig {
    /// Probability that a satellite is attenuated
    pub probability: f64,
    pub seed: u64,
}
impl Default for UrbanDegradationConfig {
    fn default() -> Self {
        UrbanDegradationConfig {
            probability: 0.4,
            seed: 42,
        }
    }
}

/// Everything a batch run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Output CSV path for the per-step results; empty to skip writing
    pub output: String,
    pub input: InputConfig,
    pub coordinates: CoordinateConfig,
    pub los: LosConfig,
    pub filter: ParticleFilterConfig,
    pub logging: LoggingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urban_degradation: Option<UrbanDegradationConfig>,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            output: "results.csv".to_string(),
            input: InputConfig::default(),
            coordinates: CoordinateConfig::default(),
            los: LosConfig::default(),
            filter: ParticleFilterConfig::default(),
            logging: LoggingConfig::default(),
            urban_degradation: None,
        }
    }
}
impl SimulationConfig {
    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        self.los.validate()?;
        self.filter.validate()?;
        if let Some(urban) = &self.urban_degradation {
            if !(0.0..=1.0).contains(&urban.probability) {
                return Err(LosError::InvalidConfig(format!(
                    "urban degradation probability must lie in [0, 1], got {}",
                    urban.probability
                )));
            }
        }
        Ok(())
    }
    /// Write the configuration as pretty JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// One route CSV row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Waypoints with their timestamps, in the planar frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub points: Vec<Point3D>,
    pub timestamps: Vec<i64>,
}
impl Route {
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
impl FromIterator<(Point3D, i64)> for Route {
    fn from_iter<I: IntoIterator<Item = (Point3D, i64)>>(iter: I) -> Self {
        let (points, timestamps) = iter.into_iter().unzip();
        Route { points, timestamps }
    }
}

/// Read a route CSV and project every point with `transform`.
pub fn load_route<P: AsRef<Path>>(path: P, transform: &dyn CoordinateTransform) -> Result<Route> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut route = Route::default();
    for result in rdr.deserialize() {
        let record: RouteRecord = result?;
        route
            .points
            .push(transform.to_local(&Point3D::new(record.x, record.y, record.z)));
        route.timestamps.push(record.timestamp);
    }
    debug!("Loaded {} route points", route.len());
    Ok(route)
}

/// Read a satellite epoch CSV.
pub fn load_satellites<P: AsRef<Path>>(path: P) -> Result<Vec<Satellite>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut satellites = Vec::new();
    for result in rdr.deserialize() {
        let satellite: Satellite = result?;
        satellites.push(satellite);
    }
    debug!("Loaded {} satellites", satellites.len());
    Ok(satellites)
}

/// Write a satellite epoch CSV readable by [`load_satellites`].
pub fn save_satellites<P: AsRef<Path>>(satellites: &[Satellite], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for satellite in satellites {
        writer.serialize(satellite)?;
    }
    writer.flush()?;
    Ok(())
}

/// One building as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub height: f64,
    pub vertices: Vec<[f64; 3]>,
}
impl From<&Building> for BuildingRecord {
    fn from(building: &Building) -> Self {
        BuildingRecord {
            height: building.height(),
            vertices: building
                .vertices()
                .iter()
                .map(|v| [v.x, v.y, v.z])
                .collect(),
        }
    }
}

/// Read a building JSON file and project every vertex with `transform`.
///
/// Buildings with fewer than three distinct vertices are skipped with a warning.
pub fn load_buildings<P: AsRef<Path>>(
    path: P,
    transform: &dyn CoordinateTransform,
) -> Result<Vec<Building>> {
    let file = File::open(path)?;
    let records: Vec<BuildingRecord> = serde_json::from_reader(io::BufReader::new(file))?;
    let total = records.len();
    let buildings: Vec<Building> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let vertices = record
                .vertices
                .iter()
                .map(|&xyz| transform.to_local(&Point3D::from(xyz)))
                .collect();
            match Building::new(vertices, record.height) {
                Ok(building) => Some(building),
                Err(err) => {
                    warn!("Skipping building {index}: {err}");
                    None
                }
            }
        })
        .collect();
    debug!("Loaded {} of {} buildings", buildings.len(), total);
    Ok(buildings)
}

/// Write buildings as JSON readable by [`load_buildings`].
pub fn save_buildings<P: AsRef<Path>>(buildings: &[Building], path: P) -> Result<()> {
    let records: Vec<BuildingRecord> = buildings.iter().map(BuildingRecord::from).collect();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &records)?;
    Ok(())
}

/// Reject inputs the filter cannot run on.
///
/// # Errors
/// - [`LosError::EmptyInput`] for an empty route, building set or satellite list
/// - [`LosError::MismatchedInput`] when points and timestamps differ in length
/// - [`LosError::NonMonotonicTimestamps`] when a timestamp is earlier than its predecessor
pub fn validate_inputs(route: &Route, buildings: &[Building], satellites: &[Satellite]) -> Result<()> {
    if route.is_empty() {
        return Err(LosError::EmptyInput("route points"));
    }
    if route.points.len() != route.timestamps.len() {
        return Err(LosError::MismatchedInput {
            points: route.points.len(),
            timestamps: route.timestamps.len(),
        });
    }
    if let Some(index) = route
        .timestamps
        .windows(2)
        .position(|pair| pair[1] < pair[0])
    {
        return Err(LosError::NonMonotonicTimestamps { index: index + 1 });
    }
    if buildings.is_empty() {
        return Err(LosError::EmptyInput("buildings"));
    }
    if satellites.is_empty() {
        return Err(LosError::EmptyInput("satellites"));
    }
    Ok(())
}

/// Attenuate random satellites to emulate an urban signal environment.
///
/// Each satellite with a C/N0 reading is attenuated with probability `urban.probability`, using
/// the classifier's degradation range and floor. Returns a new list; the input is untouched.
pub fn degrade_urban_signals(
    satellites: &[Satellite],
    urban: &UrbanDegradationConfig,
    los: &LosConfig,
) -> Vec<Satellite> {
    let mut rng = StdRng::seed_from_u64(urban.seed);
    let probability = urban.probability.clamp(0.0, 1.0);
    satellites
        .iter()
        .map(|satellite| {
            let mut degraded = satellite.clone();
            if let Some(cn0) = satellite.cn0 {
                if rng.random_bool(probability) {
                    let attenuation =
                        draw_attenuation(&mut rng, los.degradation_min_dbhz, los.degradation_max_dbhz);
                    degraded.cn0 = Some(degraded_cn0(cn0, attenuation, los.degradation_floor_dbhz));
                    debug!(
                        "Urban degradation: {} C/N0 {:.1} -> {:.1} dB-Hz",
                        satellite.name,
                        cn0,
                        degraded.cn0.unwrap_or(cn0)
                    );
                }
            }
            degraded
        })
        .collect()
}

/// Build the classifier selected by `config`.
pub fn build_classifier(
    config: &LosConfig,
    buildings: Vec<Building>,
    satellites: Vec<Satellite>,
) -> Box<dyn Classifier> {
    match config.stub_los_probability {
        Some(probability) => {
            warn!("Using random LOS labels (p = {probability}) instead of building geometry");
            Box::new(RandomStubClassifier::new(satellites, probability, config.seed))
        }
        None => Box::new(LosCalculator::new(buildings, satellites, config.clone())),
    }
}

/// Per-step result of a filter run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub timestamp: i64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_z: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_z: f64,
    /// Horizontal distance between waypoint and estimate (meters)
    pub error_m: f64,
    /// LOS satellites in the waypoint's signature
    pub los: usize,
    /// NLOS satellites in the waypoint's signature
    pub nlos: usize,
}
impl StepRecord {
    pub fn truth(&self) -> Point3D {
        Point3D::new(self.true_x, self.true_y, self.true_z)
    }
    pub fn estimate(&self) -> Point3D {
        Point3D::new(self.estimate_x, self.estimate_y, self.estimate_z)
    }
}

/// Outcome of driving the filter over a route.
#[derive(Clone, Debug, Default)]
pub struct FilterRun {
    pub steps: Vec<StepRecord>,
    pub history: Vec<PopulationSnapshot>,
}
impl FilterRun {
    pub fn mean_error(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.steps.iter().map(|s| s.error_m).sum::<f64>() / self.steps.len() as f64
    }
    pub fn max_error(&self) -> f64 {
        self.steps.iter().map(|s| s.error_m).fold(0.0, f64::max)
    }
    pub fn final_estimate(&self) -> Option<Point3D> {
        self.steps.last().map(StepRecord::estimate)
    }
    /// Write the per-step records as CSV.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        for step in &self.steps {
            writer.serialize(step)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Read per-step records written by [`FilterRun::to_csv`]. The history is not stored.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut steps = Vec::new();
        for result in rdr.deserialize() {
            let record: StepRecord = result?;
            steps.push(record);
        }
        Ok(FilterRun {
            steps,
            history: Vec::new(),
        })
    }
}

/// Drive a particle filter over `route`, starting from a grid around the first waypoint.
///
/// Every waypoint, the first included, goes through a full update cycle.
///
/// # Errors
/// - [`LosError::EmptyInput`] for an empty route, or a classifier that reports no satellites at
///   the first waypoint
/// - [`LosError::MismatchedInput`] when points and timestamps differ in length
pub fn run_filter<C: Classifier>(
    classifier: C,
    config: &ParticleFilterConfig,
    route: &Route,
) -> Result<FilterRun> {
    let Some(start) = route.points.first() else {
        return Err(LosError::EmptyInput("route points"));
    };
    if route.points.len() != route.timestamps.len() {
        return Err(LosError::MismatchedInput {
            points: route.points.len(),
            timestamps: route.timestamps.len(),
        });
    }
    let mut filter = ParticleFilter::new(classifier, config.clone())?;
    if filter.classifier_mut().calculate_los(start).is_empty() {
        return Err(LosError::EmptyInput("satellites"));
    }
    filter.initialize_particles(start);
    let mut steps = Vec::with_capacity(route.len());
    for (step, (point, &timestamp)) in route.points.iter().zip(&route.timestamps).enumerate() {
        let estimate = filter.update(point, timestamp)?;
        let (los, nlos) = los_nlos_count(filter.reference_signature());
        let error_m = point.horizontal_distance_to(&estimate);
        if step % PROGRESS_INTERVAL == 0 {
            info!(
                "Step {}/{}: error {:.2} m, {}",
                step + 1,
                route.len(),
                error_m,
                status_line(filter.reference_signature())
            );
        }
        steps.push(StepRecord {
            step,
            timestamp,
            true_x: point.x,
            true_y: point.y,
            true_z: point.z,
            estimate_x: estimate.x,
            estimate_y: estimate.y,
            estimate_z: estimate.z,
            error_m,
            los,
            nlos,
        });
    }
    let run = FilterRun {
        steps,
        history: filter.into_history(),
    };
    info!(
        "Processed {} points: mean error {:.2} m, max error {:.2} m",
        run.steps.len(),
        run.mean_error(),
        run.max_error()
    );
    Ok(run)
}

/// Load every input named by `config`, run the filter and write the results.
pub fn run_simulation(config: &SimulationConfig) -> Result<FilterRun> {
    config.validate()?;
    let transform = config.coordinates.transform();
    let route = load_route(&config.input.route, transform.as_ref())?;
    let buildings = load_buildings(&config.input.buildings, transform.as_ref())?;
    let mut satellites = load_satellites(&config.input.satellites)?;
    validate_inputs(&route, &buildings, &satellites)?;
    if let Some(urban) = &config.urban_degradation {
        satellites = degrade_urban_signals(&satellites, urban, &config.los);
    }
    info!(
        "Running {} particles over {} points, {} buildings, {} satellites, mode {}",
        config.filter.num_particles,
        route.len(),
        buildings.len(),
        satellites.len(),
        config.los.mode
    );
    let classifier = build_classifier(&config.los, buildings, satellites);
    let run = run_filter(classifier, &config.filter, &route)?;
    if !config.output.is_empty() {
        run.to_csv(&config.output)?;
        info!("Results written to {}", config.output);
    }
    Ok(run)
}

/// Geometric visibility of one satellite from a fixed observer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeightReport {
    pub satellite: String,
    pub is_los: bool,
    pub delta_h: f64,
    pub intersection: Option<Point2D>,
    /// Extra observer height needed for LOS; `None` at or below the horizon
    pub required_height: Option<f64>,
}
impl Display for HeightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.is_los { "LOS" } else { "NLOS" };
        match (self.is_los, self.required_height) {
            (_, None) => write!(f, "{}: {} (below horizon)", self.satellite, label),
            (true, Some(_)) => write!(f, "{}: {}", self.satellite, label),
            (false, Some(height)) => write!(
                f,
                "{}: {}, blocked {:.2} m below the roof, needs {:.2} m more height",
                self.satellite, label, self.delta_h, height
            ),
        }
    }
}

/// Classify every satellite geometrically from `observer` and report the height deficits.
pub fn required_height_report(
    observer: &Point3D,
    buildings: &[Building],
    satellites: &[Satellite],
    config: &LosConfig,
) -> Vec<HeightReport> {
    let calculator = LosCalculator::new(buildings.to_vec(), satellites.to_vec(), config.clone());
    satellites
        .iter()
        .map(|satellite| {
            let result = calculator.geometric_los(observer, satellite);
            let required_height = match result.required_height(satellite) {
                Ok(height) => Some(height),
                Err(err) => {
                    warn!("{err}");
                    None
                }
            };
            HeightReport {
                satellite: satellite.name.clone(),
                is_los: result.is_los,
                delta_h: result.delta_h,
                intersection: result.intersection,
                required_height,
            }
        })
        .collect()
}
