//! Constant-velocity process model and the shared Kalman correction step
//!
//! The update kernel is generic over the measurement dimension so the laser
//! (2-D) and radar (3-D) paths run through the same arithmetic.

use nalgebra::{SMatrix, SVector};

use crate::config::CovarianceUpdate;
use crate::filters::jacobian::{is_finite, symmetrize};
use crate::types::{StateMat, StateVec, STATE_DIM};

/// State transition F(Δt) for constant-velocity kinematics
pub fn transition_matrix(dt: f64) -> StateMat {
    #[rustfmt::skip]
    let f = StateMat::new(
        1.0, 0.0, dt,  0.0,
        0.0, 1.0, 0.0, dt,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    f
}

/// Discretized white-noise-acceleration process noise Q(Δt)
pub fn process_noise(dt: f64, noise_ax: f64, noise_ay: f64) -> StateMat {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;

    let q_pos_x = dt4 / 4.0 * noise_ax;
    let q_pos_y = dt4 / 4.0 * noise_ay;
    let q_cross_x = dt3 / 2.0 * noise_ax;
    let q_cross_y = dt3 / 2.0 * noise_ay;
    let q_vel_x = dt2 * noise_ax;
    let q_vel_y = dt2 * noise_ay;

    #[rustfmt::skip]
    let q = StateMat::new(
        q_pos_x,   0.0,       q_cross_x, 0.0,
        0.0,       q_pos_y,   0.0,       q_cross_y,
        q_cross_x, 0.0,       q_vel_x,   0.0,
        0.0,       q_cross_y, 0.0,       q_vel_y,
    );
    q
}

/// Propagate state and covariance: x = F·x, P = F·P·Fᵀ + Q
pub fn predict(x: &mut StateVec, p: &mut StateMat, f: &StateMat, q: &StateMat) {
    *x = f * *x;
    *p = f * *p * f.transpose() + q;
}

/// Posterior produced by a successful correction
#[derive(Clone, Copy, Debug)]
pub struct Correction<const M: usize> {
    pub state: StateVec,
    pub covariance: StateMat,
    /// S = H·P·Hᵀ + R
    pub innovation_covariance: SMatrix<f64, M, M>,
}

/// Kalman correction given a precomputed innovation `y`
///
/// Returns `None` when S cannot be inverted or the posterior is not finite,
/// so callers can keep their previous estimate.
pub fn correct<const M: usize>(
    x: &StateVec,
    p: &StateMat,
    h: &SMatrix<f64, M, STATE_DIM>,
    y: &SVector<f64, M>,
    r: &SMatrix<f64, M, M>,
    form: CovarianceUpdate,
) -> Option<Correction<M>> {
    let h_t = h.transpose();
    let p_ht = p * h_t;
    let s = h * p_ht + r;
    let s_inv = s.try_inverse()?;
    if s_inv.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let k = p_ht * s_inv;
    let state = x + k * y;

    let i_minus_kh = StateMat::identity() - k * h;
    let covariance = match form {
        CovarianceUpdate::Standard => i_minus_kh * p,
        CovarianceUpdate::Joseph => {
            i_minus_kh * p * i_minus_kh.transpose() + k * r * k.transpose()
        }
    };
    // Symmetrize to limit numerical drift
    let covariance = symmetrize(&covariance);

    if !state.iter().all(|v| v.is_finite()) || !is_finite(&covariance) {
        return None;
    }

    Some(Correction {
        state,
        covariance,
        innovation_covariance: s,
    })
}
