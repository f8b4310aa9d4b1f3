//! Laser/radar sensor fusion for planar object tracking.
//!
//! A 4-state constant-velocity EKF fed by two sensors: a laser that observes
//! position directly and a radar that observes range, bearing and range rate.
//! Measurements arrive one at a time through [`FusionEkf::ingest`].

pub mod config;
pub mod control;
pub mod error;
pub mod evaluation;
pub mod feed;
pub mod filters;
pub mod replay;
pub mod types;

pub use config::{CovarianceUpdate, FusionConfig, RadarVelocityInit};
pub use error::{
    ConfigError, ControlError, EvaluationError, FusionError, FusionResult, QueueClosed, RecordError,
    ReplayError,
};
pub use filters::jacobian::compute_radar_jacobian;
pub use filters::{Estimate, FusionEkf, FusionEkfState, IngestOutcome, Innovation, TrackerPhase};
pub use types::{Measurement, RawMeasurement, Reading, SensorKind, StateMat, StateVec};
