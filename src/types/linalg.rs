//! Linear algebra type system for the fusion tracker
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the constant-velocity EKF and its two measurement models.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 4; // (px, py, vx, vy)

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_LASER: usize = 2; // (px, py)
pub const MEASURE_DIM_RADAR: usize = 3; // (rho, theta, rho_dot)

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Measurement types for the laser (linear) model
pub type LaserVec = SVector<f64, MEASURE_DIM_LASER>;
pub type LaserNoise = SMatrix<f64, MEASURE_DIM_LASER, MEASURE_DIM_LASER>;
pub type LaserMatrix = SMatrix<f64, MEASURE_DIM_LASER, STATE_DIM>; // 2×4

// Measurement types for the radar (polar) model
pub type RadarVec = SVector<f64, MEASURE_DIM_RADAR>;
pub type RadarNoise = SMatrix<f64, MEASURE_DIM_RADAR, MEASURE_DIM_RADAR>;
pub type RadarJacobian = SMatrix<f64, MEASURE_DIM_RADAR, STATE_DIM>; // 3×4
