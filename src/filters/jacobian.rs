//! Linearization helpers for the polar (radar) measurement model
//!
//! Everything here is a pure function of its inputs: no filter state, no history.
//! The fusion engine calls into this module only for radar updates.

use std::f64::consts::PI;

use crate::error::{FusionError, FusionResult};
use crate::types::{RadarJacobian, RadarReading, RadarVec, StateMat, StateVec};

/// Jacobian of h(x) = [rho, theta, rho_dot] with respect to [px, py, vx, vy]
///
/// Fails with `SingularInput` when px² + py² < `min_range_squared`: the 1/rho and
/// 1/rho³ terms would otherwise push Inf/NaN into the covariance.
pub fn compute_radar_jacobian(x: &StateVec, min_range_squared: f64) -> FusionResult<RadarJacobian> {
    let (px, py, vx, vy) = (x[0], x[1], x[2], x[3]);

    let c1 = px * px + py * py;
    if !(c1 >= min_range_squared) {
        return Err(FusionError::SingularInput { range_squared: c1 });
    }
    let c2 = c1.sqrt();
    let c3 = c1 * c2;

    #[rustfmt::skip]
    let h = RadarJacobian::new(
        px / c2,                            py / c2,                            0.0,     0.0,
        -py / c1,                           px / c1,                            0.0,     0.0,
        py * (vx * py - vy * px) / c3,      px * (vy * px - vx * py) / c3,      px / c2, py / c2,
    );
    Ok(h)
}

/// Forward polar measurement function h(x)
///
/// Shares the near-zero range guard with the Jacobian since rho_dot divides by rho.
pub fn radar_measurement(x: &StateVec, min_range_squared: f64) -> FusionResult<RadarVec> {
    let (px, py, vx, vy) = (x[0], x[1], x[2], x[3]);

    let range_squared = px * px + py * py;
    if !(range_squared >= min_range_squared) {
        return Err(FusionError::SingularInput { range_squared });
    }
    let rho = range_squared.sqrt();
    let theta = py.atan2(px);
    let rho_dot = (px * vx + py * vy) / rho;

    Ok(RadarVec::new(rho, theta, rho_dot))
}

/// Wrap an angle into (-π, π]
pub fn normalize_angle(angle: f64) -> f64 {
    PI - (PI - angle).rem_euclid(2.0 * PI)
}

/// Cartesian position from a polar reading
pub fn polar_to_position(reading: &RadarReading) -> (f64, f64) {
    let (sin_t, cos_t) = reading.theta.sin_cos();
    (reading.rho * cos_t, reading.rho * sin_t)
}

// ─── Covariance health checks ────────────────────────────────────────────────

/// Largest absolute difference between P and Pᵀ
pub fn symmetry_error(p: &StateMat) -> f64 {
    (p - p.transpose()).amax()
}

/// (P + Pᵀ) / 2
pub fn symmetrize(p: &StateMat) -> StateMat {
    (p + p.transpose()) * 0.5
}

/// Smallest eigenvalue of the symmetric part of P
pub fn min_eigenvalue(p: &StateMat) -> f64 {
    symmetrize(p)
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Symmetric (within `tol`) with no eigenvalue below `-tol`
pub fn is_positive_semidefinite(p: &StateMat, tol: f64) -> bool {
    is_finite(p) && symmetry_error(p) <= tol && min_eigenvalue(p) >= -tol
}

pub fn is_finite(p: &StateMat) -> bool {
    p.iter().all(|v| v.is_finite())
}
