use std::io;
use thiserror::Error;

/// Errors surfaced by input loading and filter setup.
///
/// The classifier and the particle filter never fail on expected edge cases (parallel rays,
/// degenerate walls, zero weights); these variants only cover precondition violations and I/O.
#[derive(Error, Debug)]
pub enum LosError {
    #[error("Empty input: no {0} provided")]
    EmptyInput(&'static str),

    #[error("Invalid building: {unique_vertices} unique vertices (need at least 3), height {height}")]
    InvalidBuilding { unique_vertices: usize, height: f64 },

    #[error("Satellite {satellite} is at or below the horizon (elevation {elevation} deg)")]
    BelowHorizon { satellite: String, elevation: f64 },

    #[error("Mismatched input: {points} route points but {timestamps} timestamps")]
    MismatchedInput { points: usize, timestamps: usize },

    #[error("Timestamps are not monotonically increasing at index {index}")]
    NonMonotonicTimestamps { index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for fallible library operations
pub type Result<T> = std::result::Result<T, LosError>;
