/// Laser/Radar Fusion EKF
///
/// State Vector (4D):
/// [0-1]: Position (px, py) in a fixed 2-D frame
/// [2-3]: Velocity (vx, vy)
///
/// Measurements are ingested one at a time in arrival order. The first one
/// initializes the state; every later one runs predict (constant velocity over
/// the timestamp delta) then an update selected by the sensor that produced it.
/// A failed update leaves the previous estimate untouched.
use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::error::{ConfigError, FusionError, FusionResult};
use crate::filters::jacobian::{
    compute_radar_jacobian, normalize_angle, polar_to_position, radar_measurement,
};
use crate::filters::kalman::{self, Correction};
use crate::types::{
    LaserMatrix, LaserNoise, LaserReading, LaserVec, Measurement, RadarNoise, RadarReading,
    RadarVec, RawMeasurement, Reading, SensorKind, StateMat, StateVec,
};

/// State estimate owned by the engine once tracking starts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    /// [px, py, vx, vy]
    pub state: StateVec,
    /// 4×4 symmetric PSD covariance
    pub covariance: StateMat,
    /// Timestamp of the last measurement that was applied
    pub timestamp: i64,
}

/// Engine lifecycle (one-way: Uninitialized → Tracking)
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackerPhase {
    Uninitialized,
    Tracking(Estimate),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First measurement: state created, no predict/update
    Initialized,
    /// Predict + update applied
    Updated,
}

/// Residual z - h(x) from the most recent successful update
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Innovation {
    Laser(LaserVec),
    Radar(RadarVec),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusionEkfState {
    pub timestamp: i64,

    /// Position in the fusion frame [m]
    pub position: (f64, f64),

    /// Velocity in the fusion frame [m/s]
    pub velocity: (f64, f64),

    /// Diagonal of P (px, py, vx, vy)
    pub covariance_diagonal: [f64; 4],

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    /// Update counters
    pub laser_updates: u64,
    pub radar_updates: u64,
    pub skipped_updates: u64,
}

pub struct FusionEkf {
    config: FusionConfig,

    /// Laser observation matrix H (2x4, selects position)
    h_laser: LaserMatrix,

    /// Laser measurement noise R (2x2)
    r_laser: LaserNoise,

    /// Radar measurement noise R (3x3)
    r_radar: RadarNoise,

    phase: TrackerPhase,
    last_innovation: Option<Innovation>,

    laser_updates: u64,
    radar_updates: u64,
    skipped_updates: u64,
}

impl FusionEkf {
    /// Build an engine from a config that has already been validated
    /// (`FusionConfig::validate`, `from_json_file` or `FilterArgs::load`).
    /// Zero or negative noise terms make every update fail with `UpdateFailure`.
    pub fn new(config: FusionConfig) -> Self {
        #[rustfmt::skip]
        let h_laser = LaserMatrix::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        Self {
            h_laser,
            r_laser: config.laser_noise_matrix(),
            r_radar: config.radar_noise_matrix(),
            config,
            phase: TrackerPhase::Uninitialized,
            last_innovation: None,
            laser_updates: 0,
            radar_updates: 0,
            skipped_updates: 0,
        }
    }

    /// Validate `config`, then build the engine
    pub fn try_new(config: FusionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Validate an untyped record, then ingest it.
    ///
    /// Malformed records are rejected before any engine state is touched.
    pub fn ingest_raw(&mut self, raw: &RawMeasurement) -> FusionResult<IngestOutcome> {
        let measurement = Measurement::try_from(raw)?;
        self.ingest(&measurement)
    }

    /// Process the next measurement (predict-then-update once tracking).
    pub fn ingest(&mut self, measurement: &Measurement) -> FusionResult<IngestOutcome> {
        measurement.check_finite()?;

        let prior = match self.phase {
            TrackerPhase::Uninitialized => {
                self.initialize(measurement);
                return Ok(IngestOutcome::Initialized);
            }
            TrackerPhase::Tracking(estimate) => estimate,
        };

        if measurement.timestamp < prior.timestamp {
            return Err(FusionError::TimestampRegression {
                previous: prior.timestamp,
                current: measurement.timestamp,
            });
        }

        // Predict on copies; nothing is committed until the update succeeds
        // current >= previous here; abs_diff cannot overflow
        let ticks = measurement.timestamp.abs_diff(prior.timestamp);
        let dt = ticks as f64 * self.config.timestamp_scale;
        let mut x = prior.state;
        let mut p = prior.covariance;
        let f = kalman::transition_matrix(dt);
        let q = kalman::process_noise(dt, self.config.noise_ax, self.config.noise_ay);
        kalman::predict(&mut x, &mut p, &f, &q);

        let result = match measurement.reading {
            Reading::Laser(reading) => self.update_laser(&x, &p, &reading),
            Reading::Radar(reading) => self.update_radar(&x, &p, &reading),
        };

        let (state, covariance, innovation) = match result {
            Ok(posterior) => posterior,
            Err(e) => {
                self.skipped_updates += 1;
                log::warn!(
                    "[EKF] skipping {} update at t={}: {}",
                    measurement.sensor_kind(),
                    measurement.timestamp,
                    e
                );
                return Err(e);
            }
        };

        let estimate = Estimate {
            state,
            covariance,
            timestamp: measurement.timestamp,
        };
        self.phase = TrackerPhase::Tracking(estimate);
        self.last_innovation = Some(innovation);
        match measurement.sensor_kind() {
            SensorKind::Laser => self.laser_updates += 1,
            SensorKind::Radar => self.radar_updates += 1,
        }

        log::debug!(
            "[EKF] t={} dt={:.3}s x=[{:.4}, {:.4}, {:.4}, {:.4}] trace(P)={:.5}",
            estimate.timestamp,
            dt,
            state[0],
            state[1],
            state[2],
            state[3],
            covariance.trace()
        );

        Ok(IngestOutcome::Updated)
    }

    fn initialize(&mut self, measurement: &Measurement) {
        let (state, covariance) = match measurement.reading {
            Reading::Laser(LaserReading { px, py }) => (
                StateVec::new(px, py, 0.0, 0.0),
                self.config.laser_initial_covariance(),
            ),
            Reading::Radar(reading) => {
                let (px, py) = polar_to_position(&reading);
                let (vx, vy) = self.config.radar_velocity_init.velocity(&reading);
                (
                    StateVec::new(px, py, vx, vy),
                    self.config.radar_initial_covariance(),
                )
            }
        };

        log::info!(
            "[EKF] initialized from {} at t={}: x=[{:.4}, {:.4}, {:.4}, {:.4}]",
            measurement.sensor_kind(),
            measurement.timestamp,
            state[0],
            state[1],
            state[2],
            state[3]
        );

        self.phase = TrackerPhase::Tracking(Estimate {
            state,
            covariance,
            timestamp: measurement.timestamp,
        });
    }

    /// Linear update: y = z - H·x
    fn update_laser(
        &self,
        x: &StateVec,
        p: &StateMat,
        reading: &LaserReading,
    ) -> FusionResult<(StateVec, StateMat, Innovation)> {
        let z = LaserVec::new(reading.px, reading.py);
        let y = z - self.h_laser * x;

        let Correction {
            state, covariance, ..
        } = kalman::correct(
            x,
            p,
            &self.h_laser,
            &y,
            &self.r_laser,
            self.config.covariance_update,
        )
        .ok_or(FusionError::UpdateFailure {
            sensor: SensorKind::Laser,
        })?;

        Ok((state, covariance, Innovation::Laser(y)))
    }

    /// Extended update: y = z - h(x) with the bearing residual wrapped to (-π, π]
    fn update_radar(
        &self,
        x: &StateVec,
        p: &StateMat,
        reading: &RadarReading,
    ) -> FusionResult<(StateVec, StateMat, Innovation)> {
        // A zero-range return carries no usable bearing
        let reading_range_squared = reading.rho * reading.rho;
        if reading_range_squared < self.config.min_range_squared {
            return Err(FusionError::SingularInput {
                range_squared: reading_range_squared,
            });
        }

        let h = compute_radar_jacobian(x, self.config.min_range_squared)?;
        let z_pred = radar_measurement(x, self.config.min_range_squared)?;

        let z = RadarVec::new(reading.rho, reading.theta, reading.rho_dot);
        let mut y = z - z_pred;
        y[1] = normalize_angle(y[1]);

        let Correction {
            state, covariance, ..
        } = kalman::correct(
            x,
            p,
            &h,
            &y,
            &self.r_radar,
            self.config.covariance_update,
        )
        .ok_or(FusionError::UpdateFailure {
            sensor: SensorKind::Radar,
        })?;

        Ok((state, covariance, Innovation::Radar(y)))
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn phase(&self) -> &TrackerPhase {
        &self.phase
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, TrackerPhase::Tracking(_))
    }

    pub fn estimate(&self) -> Option<&Estimate> {
        match &self.phase {
            TrackerPhase::Uninitialized => None,
            TrackerPhase::Tracking(estimate) => Some(estimate),
        }
    }

    /// (x, P) as of the last successful ingest
    pub fn state(&self) -> Option<(StateVec, StateMat)> {
        self.estimate().map(|e| (e.state, e.covariance))
    }

    pub fn last_innovation(&self) -> Option<&Innovation> {
        self.last_innovation.as_ref()
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Get current state snapshot
    pub fn snapshot(&self) -> Option<FusionEkfState> {
        self.estimate().map(|e| {
            let p = &e.covariance;
            FusionEkfState {
                timestamp: e.timestamp,
                position: (e.state[0], e.state[1]),
                velocity: (e.state[2], e.state[3]),
                covariance_diagonal: [p[(0, 0)], p[(1, 1)], p[(2, 2)], p[(3, 3)]],
                covariance_trace: p.trace(),
                laser_updates: self.laser_updates,
                radar_updates: self.radar_updates,
                skipped_updates: self.skipped_updates,
            }
        })
    }
}
