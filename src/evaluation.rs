//! Accuracy against ground truth

use serde::Serialize;

use crate::error::EvaluationError;
use crate::types::StateVec;

/// Per-component RMSE over paired estimate / ground-truth states
pub fn rmse(estimates: &[StateVec], ground_truth: &[StateVec]) -> Result<StateVec, EvaluationError> {
    if estimates.len() != ground_truth.len() {
        return Err(EvaluationError::LengthMismatch {
            estimates: estimates.len(),
            ground_truth: ground_truth.len(),
        });
    }

    let mut acc = RmseAccumulator::new();
    for (est, truth) in estimates.iter().zip(ground_truth) {
        acc.push(est, truth);
    }
    acc.rmse().ok_or(EvaluationError::Empty)
}

/// Streaming RMSE for replay loops
#[derive(Clone, Debug)]
pub struct RmseAccumulator {
    sum_sq: StateVec,
    count: usize,
}

impl Default for RmseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RmseAccumulator {
    pub fn new() -> Self {
        Self {
            sum_sq: StateVec::zeros(),
            count: 0,
        }
    }

    pub fn push(&mut self, estimate: &StateVec, truth: &StateVec) {
        let residual = estimate - truth;
        self.sum_sq += residual.component_mul(&residual);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` until at least one pair has been pushed
    pub fn rmse(&self) -> Option<StateVec> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum_sq / self.count as f64).map(f64::sqrt))
    }

    pub fn summary(&self) -> Option<RmseSummary> {
        self.rmse().map(|r| RmseSummary {
            px: r[0],
            py: r[1],
            vx: r[2],
            vy: r[3],
            samples: self.count,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RmseSummary {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
    pub samples: usize,
}
