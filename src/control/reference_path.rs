//! Waypoints → cubic reference path in the vehicle frame

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

const CUBIC_TERMS: usize = 4;
const RANK_EPS: f64 = 1e-10;

/// Vehicle pose in the map frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Yaw [rad], counter-clockwise from +x
    pub heading: f64,
}

/// y = c0 + c1·x + c2·x² + c3·x³
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPolynomial {
    pub coeffs: [f64; CUBIC_TERMS],
}

impl PathPolynomial {
    pub fn eval(&self, x: f64) -> f64 {
        // Horner
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// dy/dx
    pub fn slope(&self, x: f64) -> f64 {
        let [_, c1, c2, c3] = self.coeffs;
        c1 + 2.0 * c2 * x + 3.0 * c3 * x * x
    }
}

/// Shift by -pose position, then rotate by -heading
pub fn to_vehicle_frame(points: &[(f64, f64)], pose: &Pose) -> Vec<(f64, f64)> {
    let (sin_h, cos_h) = (-pose.heading).sin_cos();
    points
        .iter()
        .map(|&(px, py)| {
            let dx = px - pose.x;
            let dy = py - pose.y;
            (dx * cos_h - dy * sin_h, dx * sin_h + dy * cos_h)
        })
        .collect()
}

/// Least-squares cubic through the given points
pub fn fit_cubic(xs: &[f64], ys: &[f64]) -> Result<PathPolynomial, ControlError> {
    if xs.len() != ys.len() {
        return Err(ControlError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    if xs.len() < CUBIC_TERMS {
        return Err(ControlError::TooFewPoints {
            required: CUBIC_TERMS,
            actual: xs.len(),
        });
    }

    // Vandermonde design matrix [1, x, x², x³]
    let a = DMatrix::from_fn(xs.len(), CUBIC_TERMS, |i, j| xs[i].powi(j as i32));
    let b = DVector::from_column_slice(ys);

    let svd = a.svd(true, true);
    if svd.rank(RANK_EPS) < CUBIC_TERMS {
        return Err(ControlError::FitFailed(
            "waypoints do not determine a cubic".to_string(),
        ));
    }
    let c = svd
        .solve(&b, RANK_EPS)
        .map_err(|e| ControlError::FitFailed(e.to_string()))?;

    Ok(PathPolynomial {
        coeffs: [c[0], c[1], c[2], c[3]],
    })
}
