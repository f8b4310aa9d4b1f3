//! Boundary to an external trajectory optimizer
//!
//! The optimizer itself lives outside this crate. What lives here is the
//! preparation it expects: waypoints moved into the vehicle frame, a cubic
//! reference path, and a 6-state snapshot advanced past the actuation delay.

pub mod reference_path;

pub use reference_path::{fit_cubic, to_vehicle_frame, PathPolynomial, Pose};

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Distance from the front axle to the center of gravity [m]
pub const LF: f64 = 2.67;

/// Delay between issuing a command and the vehicle acting on it [s]
pub const ACTUATION_LATENCY: f64 = 0.1;

/// Steering saturation [rad]
pub const MAX_STEERING_ANGLE: f64 = 25.0 * std::f64::consts::PI / 180.0;

/// Optimizer input state in the vehicle frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
    pub cross_track_error: f64,
    pub heading_error: f64,
}

impl VehicleState {
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.x,
            self.y,
            self.heading,
            self.speed,
            self.cross_track_error,
            self.heading_error,
        ]
    }
}

/// Actuator commands and the predicted path from one optimizer call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPlan {
    /// Steering angle as solved [rad]
    pub steering: f64,
    pub throttle: f64,
    /// Predicted (x, y) points in the vehicle frame
    pub trajectory: Vec<(f64, f64)>,
}

impl ControlPlan {
    /// Unpack `[steering, throttle, x1, y1, x2, y2, ...]`
    pub fn from_solution(solution: &[f64]) -> Result<Self, ControlError> {
        match solution {
            [steering, throttle, points @ ..] if points.len() % 2 == 0 => Ok(Self {
                steering: *steering,
                throttle: *throttle,
                trajectory: points.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
            }),
            _ => Err(ControlError::MalformedSolution(solution.len())),
        }
    }
}

/// External solver over (state, reference path)
pub trait TrajectoryOptimizer {
    /// Returns `[steering, throttle, x1, y1, ...]`
    fn solve(&mut self, state: &VehicleState, path: &PathPolynomial) -> Vec<f64>;
}

/// Advance the vehicle-frame state by `latency` seconds under the current
/// commands, using a kinematic bicycle model.
pub fn latency_compensated_state(
    speed: f64,
    steering: f64,
    throttle: f64,
    path: &PathPolynomial,
    latency: f64,
    lf: f64,
) -> VehicleState {
    let cte = path.eval(0.0);
    let epsi = -path.slope(0.0).atan();
    let yaw_step = speed / lf * -steering * latency;

    VehicleState {
        x: speed * latency,
        y: 0.0,
        heading: yaw_step,
        speed: speed + throttle * latency,
        cross_track_error: cte + speed * epsi.sin() * latency,
        heading_error: epsi + yaw_step,
    }
}

/// Map a solved steering angle onto the actuator range [-1, 1]
pub fn normalized_steering(steering: f64, lf: f64, max_angle: f64) -> f64 {
    steering / (lf * max_angle)
}

/// One telemetry frame from the vehicle
#[derive(Clone, Debug, Deserialize)]
pub struct Telemetry {
    pub waypoints: Vec<(f64, f64)>,
    pub pose: Pose,
    pub speed: f64,
    pub steering: f64,
    pub throttle: f64,
}

/// Full preparation → solve → unpack cycle for one telemetry frame.
/// The returned plan carries steering already normalized to [-1, 1].
pub fn plan_step<O: TrajectoryOptimizer>(
    telemetry: &Telemetry,
    optimizer: &mut O,
) -> Result<ControlPlan, ControlError> {
    let local = to_vehicle_frame(&telemetry.waypoints, &telemetry.pose);
    let (xs, ys): (Vec<f64>, Vec<f64>) = local.into_iter().unzip();
    let path = fit_cubic(&xs, &ys)?;

    let state = latency_compensated_state(
        telemetry.speed,
        telemetry.steering,
        telemetry.throttle,
        &path,
        ACTUATION_LATENCY,
        LF,
    );

    let solution = optimizer.solve(&state, &path);
    let mut plan = ControlPlan::from_solution(&solution)?;
    plan.steering = normalized_steering(plan.steering, LF, MAX_STEERING_ANGLE);
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct RecordingOptimizer {
        last_state: Option<VehicleState>,
        reply: Vec<f64>,
    }

    impl TrajectoryOptimizer for RecordingOptimizer {
        fn solve(&mut self, state: &VehicleState, _path: &PathPolynomial) -> Vec<f64> {
            self.last_state = Some(*state);
            self.reply.clone()
        }
    }

    #[test]
    fn test_from_solution() {
        let plan = ControlPlan::from_solution(&[0.1, 0.5, 1.0, 0.0, 2.0, 0.1]).unwrap();
        assert_eq!(plan.steering, 0.1);
        assert_eq!(plan.throttle, 0.5);
        assert_eq!(plan.trajectory, vec![(1.0, 0.0), (2.0, 0.1)]);

        let plan = ControlPlan::from_solution(&[0.0, 1.0]).unwrap();
        assert!(plan.trajectory.is_empty());

        assert_eq!(
            ControlPlan::from_solution(&[0.1]),
            Err(ControlError::MalformedSolution(1))
        );
        assert_eq!(
            ControlPlan::from_solution(&[0.1, 0.2, 3.0]),
            Err(ControlError::MalformedSolution(3))
        );
    }

    #[test]
    fn test_latency_state_straight_path() {
        // Vehicle 0.5 m left of a straight path along x
        let path = PathPolynomial {
            coeffs: [-0.5, 0.0, 0.0, 0.0],
        };
        let state = latency_compensated_state(10.0, 0.0, 1.0, &path, 0.1, LF);
        assert_abs_diff_eq!(state.x, 1.0, epsilon = 1e-12);
        assert_eq!(state.y, 0.0);
        assert_eq!(state.heading, 0.0);
        assert_abs_diff_eq!(state.speed, 10.1, epsilon = 1e-12);
        assert_abs_diff_eq!(state.cross_track_error, -0.5, epsilon = 1e-12);
        assert_eq!(state.heading_error, 0.0);
    }

    #[test]
    fn test_latency_state_with_steering() {
        let path = PathPolynomial {
            coeffs: [0.2, 0.1, 0.0, 0.0],
        };
        let state = latency_compensated_state(5.0, 0.05, 0.0, &path, 0.1, LF);

        let epsi = -(0.1f64).atan();
        let yaw_step = 5.0 / LF * -0.05 * 0.1;
        assert_abs_diff_eq!(state.heading, yaw_step, epsilon = 1e-12);
        assert_abs_diff_eq!(state.heading_error, epsi + yaw_step, epsilon = 1e-12);
        assert_abs_diff_eq!(
            state.cross_track_error,
            0.2 + 5.0 * epsi.sin() * 0.1,
            epsilon = 1e-12
        );
        assert_eq!(state.to_array()[3], 5.0);
    }

    #[test]
    fn test_normalized_steering_range() {
        let full_lock = LF * MAX_STEERING_ANGLE;
        assert_abs_diff_eq!(normalized_steering(full_lock, LF, MAX_STEERING_ANGLE), 1.0);
        assert_abs_diff_eq!(normalized_steering(-full_lock, LF, MAX_STEERING_ANGLE), -1.0);
        assert_eq!(normalized_steering(0.0, LF, MAX_STEERING_ANGLE), 0.0);
    }

    #[test]
    fn test_plan_step_pipeline() {
        let telemetry = Telemetry {
            // Straight road along the map y axis, vehicle heading north on it
            waypoints: (0..6).map(|i| (100.0, 50.0 + i as f64 * 10.0)).collect(),
            pose: Pose {
                x: 100.0,
                y: 45.0,
                heading: std::f64::consts::FRAC_PI_2,
            },
            speed: 20.0,
            steering: 0.0,
            throttle: 0.0,
        };
        let mut optimizer = RecordingOptimizer {
            last_state: None,
            reply: vec![LF * MAX_STEERING_ANGLE * 0.5, 0.3, 2.0, 0.0],
        };

        let plan = plan_step(&telemetry, &mut optimizer).unwrap();
        assert_abs_diff_eq!(plan.steering, 0.5, epsilon = 1e-12);
        assert_eq!(plan.throttle, 0.3);
        assert_eq!(plan.trajectory.len(), 1);

        let state = optimizer.last_state.unwrap();
        assert_abs_diff_eq!(state.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state.cross_track_error, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(state.heading_error, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_plan_step_rejects_short_waypoints() {
        let telemetry = Telemetry {
            waypoints: vec![(0.0, 0.0), (1.0, 0.0)],
            pose: Pose {
                x: 0.0,
                y: 0.0,
                heading: 0.0,
            },
            speed: 0.0,
            steering: 0.0,
            throttle: 0.0,
        };
        let mut optimizer = RecordingOptimizer {
            last_state: None,
            reply: vec![0.0, 0.0],
        };
        assert!(matches!(
            plan_step(&telemetry, &mut optimizer),
            Err(ControlError::TooFewPoints { .. })
        ));
        assert!(optimizer.last_state.is_none());
    }
}
