//! LOS/NLOS-signature particle filter
//!
//! Each particle is a position hypothesis carrying the LOS/NLOS signature the classifier computes
//! at that position. One update cycle consumes an observed waypoint:
//!
//! 1. **Move**: displace every particle by the waypoint-to-waypoint distance and azimuth, each
//!    perturbed with independent Gaussian noise, then recompute its signature.
//! 2. **Weight**: compare every particle's signature with the signature observed at the waypoint
//!    and score the number of agreeing satellites with a [`WeightFunction`]. Weights are
//!    normalized; a population with no weight signal at all falls back to uniform weights.
//! 3. **Resample**: draw a new generation with systematic resampling.
//! 4. **Record**: push a [`PopulationSnapshot`] of the new generation onto the history.
//!
//! The point estimate is the weighted centroid of the current population.
use log::{debug, trace};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::los::Classifier;
use crate::{LosError, LosSignature, Point3D, Result, los_nlos_count};

/// Standard deviation of the distance noise per unit of movement noise (meters)
const DISTANCE_NOISE_FACTOR: f64 = 0.5;
/// Standard deviation of the azimuth noise per unit of movement noise (degrees)
const AZIMUTH_NOISE_FACTOR: f64 = 2.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Particle {
    pub position: Point3D,
    /// Normalized weight
    pub weight: f64,
    /// Weight before normalization at the last weighting step
    pub raw_weight: Option<f64>,
    pub signature: LosSignature,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (los, nlos) = los_nlos_count(&self.signature);
        f.debug_struct("Particle")
            .field("x", &self.position.x)
            .field("y", &self.position.y)
            .field("z", &self.position.z)
            .field("weight", &self.weight)
            .field("los", &los)
            .field("nlos", &nlos)
            .finish()
    }
}
impl Particle {
    pub fn new(position: Point3D, weight: f64) -> Particle {
        Particle {
            position,
            weight,
            raw_weight: None,
            signature: LosSignature::new(),
        }
    }
    /// Number of satellites in `reference` on which this particle's signature agrees.
    pub fn matching_los_count(&self, reference: &LosSignature) -> usize {
        reference
            .iter()
            .filter(|(name, is_los)| self.signature.get(*name) == Some(*is_los))
            .count()
    }
}

/// Maps signature agreement to an un-normalized particle weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightFunction {
    /// `2^m`: every agreeing satellite doubles the likelihood
    #[default]
    Naive,
    /// Modified sigmoid `N / (1 + exp(N/4 - m/2))` blended with the particle's previous raw
    /// weight as `c * sigmoid + (1 - c) * previous`
    Bayesian {
        #[serde(default = "default_blend")]
        blend: f64,
    },
}
fn default_blend() -> f64 {
    0.5
}
impl WeightFunction {
    pub fn bayesian() -> WeightFunction {
        WeightFunction::Bayesian {
            blend: default_blend(),
        }
    }
    /// Un-normalized weight for `matches` agreeing satellites out of `total`.
    ///
    /// `previous` is the particle's raw weight from the last step. The Bayesian blend only uses
    /// it when positive; the naive function ignores it.
    pub fn raw_weight(&self, matches: usize, total: usize, previous: Option<f64>) -> f64 {
        match self {
            WeightFunction::Naive => 2f64.powi(matches as i32),
            WeightFunction::Bayesian { blend } => {
                let n = total as f64;
                let sigmoid = n / (1.0 + (n / 4.0 - matches as f64 / 2.0).exp());
                let c = if blend.is_nan() {
                    default_blend()
                } else {
                    blend.clamp(0.0, 1.0)
                };
                match previous {
                    Some(previous) if previous > 0.0 => c * sigmoid + (1.0 - c) * previous,
                    _ => sigmoid,
                }
            }
        }
    }
}

/// Particle filter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    pub num_particles: usize,
    /// Half-width of the initial particle grid (meters)
    pub grid_size_m: f64,
    /// Scale of the motion noise
    pub movement_noise: f64,
    pub weight_function: WeightFunction,
    pub seed: u64,
}
impl Default for ParticleFilterConfig {
    fn default() -> Self {
        ParticleFilterConfig {
            num_particles: 1000,
            grid_size_m: 25.0,
            movement_noise: 10.0,
            weight_function: WeightFunction::Naive,
            seed: 42,
        }
    }
}
impl ParticleFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(LosError::InvalidConfig(
                "particle count must be positive".to_string(),
            ));
        }
        if !(self.grid_size_m.is_finite() && self.grid_size_m >= 0.0) {
            return Err(LosError::InvalidConfig(format!(
                "grid size must be a non-negative distance, got {}",
                self.grid_size_m
            )));
        }
        if !(self.movement_noise.is_finite() && self.movement_noise >= 0.0) {
            return Err(LosError::InvalidConfig(format!(
                "movement noise must be non-negative, got {}",
                self.movement_noise
            )));
        }
        Ok(())
    }
}

/// The population after one update, as kept in the filter's history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopulationSnapshot {
    pub timestamp: i64,
    pub particles: Vec<Particle>,
    pub estimate: Point3D,
}

/// Systematic resampling.
///
/// One offset `u ~ U(0, 1/N]` and the evenly spaced targets `u + i/N` select particles in
/// proportion to their weights. Selected particles are cloned as-is, weight included. The
/// weights are assumed normalized.
pub fn systematic_resample(particles: &[Particle], rng: &mut StdRng) -> Vec<Particle> {
    let n = particles.len();
    if n == 0 {
        return Vec::new();
    }
    let cumulative: Vec<f64> = particles
        .iter()
        .scan(0.0, |sum, particle| {
            *sum += particle.weight;
            Some(*sum)
        })
        .collect();
    let step = 1.0 / n as f64;
    // Offset in (0, 1/N] so a leading zero-weight particle can never be selected
    let offset = (1.0 - rng.random::<f64>()) * step;
    let mut resampled = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let target = offset + i as f64 * step;
        while j < n - 1 && cumulative[j] < target {
            j += 1;
        }
        resampled.push(particles[j].clone());
    }
    resampled
}

/// Weighted mean of the particle positions.
///
/// Weights are normalized by their sum; if the sum is not positive the plain mean is returned.
/// An empty population yields the origin.
pub fn weighted_centroid(particles: &[Particle]) -> Point3D {
    if particles.is_empty() {
        return Point3D::default();
    }
    let total: f64 = particles.iter().map(|p| p.weight).sum();
    let sum = if total > 0.0 {
        particles
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| {
                acc + p.position.to_vector() * (p.weight / total)
            })
    } else {
        particles
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.position.to_vector())
            / particles.len() as f64
    };
    Point3D::from(sum)
}

/// Evenly spaced coordinates across `[center - half_width, center + half_width]`.
fn grid_axis(center: f64, half_width: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![center];
    }
    let step = 2.0 * half_width / (count - 1) as f64;
    (0..count)
        .map(|k| center - half_width + k as f64 * step)
        .collect()
}

/// Sequential importance resampling over LOS/NLOS signatures.
pub struct ParticleFilter<C: Classifier> {
    classifier: C,
    config: ParticleFilterConfig,
    particles: Vec<Particle>,
    previous_point: Option<Point3D>,
    reference_signature: LosSignature,
    history: Vec<PopulationSnapshot>,
    rng: StdRng,
}
impl<C: Classifier> Debug for ParticleFilter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("config", &self.config)
            .field("particles", &self.particles.len())
            .field("previous_point", &self.previous_point)
            .field("history", &self.history.len())
            .finish()
    }
}

impl<C: Classifier> ParticleFilter<C> {
    /// Create an empty filter; call [`ParticleFilter::initialize_particles`] before updating.
    ///
    /// # Errors
    /// [`LosError::InvalidConfig`] for a zero particle count or negative grid size/noise.
    pub fn new(classifier: C, config: ParticleFilterConfig) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(ParticleFilter {
            classifier,
            config,
            particles: Vec::new(),
            previous_point: None,
            reference_signature: LosSignature::new(),
            history: Vec::new(),
            rng,
        })
    }
    /// Lay the population out on a grid spanning `center ± grid_size_m` on both horizontal axes.
    ///
    /// `floor(sqrt(N))` particles per row, as many rows as needed, filled row by row until exactly
    /// N particles exist. Every particle takes the centre's altitude and a uniform weight.
    /// Clears the history and the motion reference.
    pub fn initialize_particles(&mut self, center: &Point3D) {
        let n = self.config.num_particles;
        let per_row = ((n as f64).sqrt().floor() as usize).max(1);
        let rows = n.div_ceil(per_row);
        let g = self.config.grid_size_m;
        let xs = grid_axis(center.x, g, per_row);
        let ys = grid_axis(center.y, g, rows);
        debug!(
            "Initializing {} particles on a {}x{} grid, x in [{:.3}, {:.3}], y in [{:.3}, {:.3}]",
            n,
            per_row,
            rows,
            center.x - g,
            center.x + g,
            center.y - g,
            center.y + g
        );
        let weight = 1.0 / n as f64;
        let classifier = &mut self.classifier;
        self.particles = ys
            .iter()
            .flat_map(|&y| xs.iter().map(move |&x| Point3D::new(x, y, center.z)))
            .take(n)
            .map(|position| {
                let mut particle = Particle::new(position, weight);
                particle.signature = classifier.calculate_los(&position);
                particle
            })
            .collect();
        self.previous_point = None;
        self.reference_signature.clear();
        self.history.clear();
    }
    /// Apply the observed displacement `previous → current` to every particle with noise.
    ///
    /// Per particle: distance `d + N(0,1) * 0.5 * noise` and azimuth
    /// `az + N(0,1) * 2 * noise` degrees. Altitude is unchanged and signatures are recomputed.
    pub fn move_particles(&mut self, previous: &Point3D, current: &Point3D) {
        let distance = previous.horizontal_distance_to(current);
        let azimuth = previous.azimuth_to(current);
        let noise = self.config.movement_noise;
        debug!("Moving particles {distance:.3} m towards {azimuth:.2} deg");
        for particle in self.particles.iter_mut() {
            let distance_noise: f64 = self.rng.sample(StandardNormal);
            let azimuth_noise: f64 = self.rng.sample(StandardNormal);
            let noisy_distance = distance + distance_noise * noise * DISTANCE_NOISE_FACTOR;
            let noisy_azimuth = azimuth + azimuth_noise * noise * AZIMUTH_NOISE_FACTOR;
            particle.position = particle.position.moved_by(noisy_distance, noisy_azimuth);
            particle.signature = self.classifier.calculate_los(&particle.position);
        }
    }
    /// Score every particle against the signature observed at `reference`.
    ///
    /// Weights sum to one afterwards. If every raw weight is zero, all particles get `1/N`.
    pub fn update_weights(&mut self, reference: &Point3D) {
        self.reference_signature = self.classifier.calculate_los(reference);
        let total_satellites = self.reference_signature.len();
        let weight_function = self.config.weight_function;
        let mut total = 0.0;
        for particle in self.particles.iter_mut() {
            let matches = particle.matching_los_count(&self.reference_signature);
            let raw = weight_function.raw_weight(matches, total_satellites, particle.raw_weight);
            particle.raw_weight = Some(raw);
            particle.weight = raw;
            total += raw;
        }
        if total > 0.0 && total.is_finite() {
            self.particles.iter_mut().for_each(|p| p.weight /= total);
        } else if !self.particles.is_empty() {
            debug!("Degenerate particle weights (sum {total}), falling back to uniform");
            let uniform = 1.0 / self.particles.len() as f64;
            self.particles.iter_mut().for_each(|p| p.weight = uniform);
        }
        trace!("Reference signature {:?}", self.reference_signature);
    }
    /// Replace the population with a systematically resampled generation.
    pub fn resample(&mut self) {
        self.particles = systematic_resample(&self.particles, &mut self.rng);
    }
    /// Run one full cycle for the waypoint `current` observed at `timestamp`.
    ///
    /// Moves (unless this is the first waypoint), weights, resamples, and records the new
    /// generation in the history. Returns the new estimate.
    ///
    /// # Errors
    /// [`LosError::EmptyInput`] if the population was never initialized.
    pub fn update(&mut self, current: &Point3D, timestamp: i64) -> Result<Point3D> {
        if self.particles.is_empty() {
            return Err(LosError::EmptyInput("particles"));
        }
        if let Some(previous) = self.previous_point {
            self.move_particles(&previous, current);
        }
        self.update_weights(current);
        self.resample();
        let estimate = self.estimate();
        self.history.push(PopulationSnapshot {
            timestamp,
            particles: self.particles.clone(),
            estimate,
        });
        self.previous_point = Some(*current);
        Ok(estimate)
    }
    /// Weighted centroid of the current population.
    pub fn estimate(&self) -> Point3D {
        weighted_centroid(&self.particles)
    }
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight.powi(2)).sum();
        if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 }
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn history(&self) -> &[PopulationSnapshot] {
        &self.history
    }
    pub fn into_history(self) -> Vec<PopulationSnapshot> {
        self.history
    }
    /// Signature observed at the last weighting reference.
    pub fn reference_signature(&self) -> &LosSignature {
        &self.reference_signature
    }
    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }
    pub fn classifier(&self) -> &C {
        &self.classifier
    }
    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }
}
