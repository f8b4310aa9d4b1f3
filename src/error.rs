use thiserror::Error;

use crate::types::{RawMeasurement, SensorKind};

/// Fusion engine error types
///
/// Every variant is local and recoverable: the engine keeps its last valid
/// estimate and the next measurement proceeds normally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Radar Jacobian undefined near zero range (px² + py² = {range_squared:e})")]
    SingularInput { range_squared: f64 },

    #[error("Innovation covariance is singular for {sensor} update")]
    UpdateFailure { sensor: SensorKind },

    #[error("{sensor} measurement needs {expected} values, got {actual}")]
    MalformedMeasurement {
        sensor: SensorKind,
        expected: usize,
        actual: usize,
    },

    #[error("{sensor} measurement contains non-finite values")]
    NonFiniteMeasurement { sensor: SensorKind },

    #[error("Timestamp went backwards: {current} < {previous}")]
    TimestampRegression { previous: i64, current: i64 },
}

/// Configuration loading / validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for engine operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Every receiver of a measurement queue has been dropped
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Measurement queue closed")]
pub struct QueueClosed(pub RawMeasurement);

/// RMSE input errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("No estimates to evaluate")]
    Empty,

    #[error("Estimate/ground-truth length mismatch: {estimates} vs {ground_truth}")]
    LengthMismatch { estimates: usize, ground_truth: usize },
}

/// Problems with a single dataset line
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Unknown sensor tag '{0}' (expected L or R)")]
    UnknownSensor(String),

    #[error(
        "{sensor} record needs {expected} fields ({} with ground truth), got {actual}",
        .expected + 4
    )]
    FieldCount {
        sensor: SensorKind,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
}

/// Dataset loading errors
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: RecordError,
    },
}

/// Reference-path preparation and optimizer output errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Waypoint length mismatch: {xs} x values, {ys} y values")]
    LengthMismatch { xs: usize, ys: usize },

    #[error("Cubic fit needs at least {required} waypoints, got {actual}")]
    TooFewPoints { required: usize, actual: usize },

    #[error("Polynomial fit failed: {0}")]
    FitFailed(String),

    #[error("Optimizer returned {0} values (need steering, throttle, then x/y pairs)")]
    MalformedSolution(usize),
}
