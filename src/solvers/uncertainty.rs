//! Coordinate-wise uncertainty evaluators

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::roots::dichotomy;
use super::traits::{Objective, UncertaintyEvaluator};
use crate::error::SolverError;

/// Uncertainty by increase of the negative log-likelihood
///
/// For each coordinate, the left (right) uncertainty is the distance to the
/// point below (above) the minimizer where the coordinate-restricted negative
/// log-likelihood exceeds its value at the minimizer by `nll_increase`. The
/// prior is left out unless `include_prior` is set. When no such point exists
/// within `max_uncertainty`, the uncertainty is `max_uncertainty`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NllIncrease {
    /// Loss increase defining the interval
    pub nll_increase: f64,
    /// Clamp for unbounded uncertainties
    pub max_uncertainty: f64,
    /// Bisection tolerance
    pub error: f64,
    /// Also count the coordinate's prior term in the restricted loss
    #[serde(default)]
    pub include_prior: bool,
}

impl Default for NllIncrease {
    fn default() -> Self {
        Self {
            nll_increase: 1.0,
            max_uncertainty: 1e3,
            error: 1e-3,
            include_prior: false,
        }
    }
}

impl NllIncrease {
    /// Coordinate-restricted loss at displacement `delta`
    pub fn restricted_loss(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
        index: usize,
        delta: f64,
    ) -> f64 {
        let nll = objective.translated_nll(x, index, delta);
        if self.include_prior {
            nll + objective.translated_prior(x, index, delta)
        } else {
            nll
        }
    }

    fn side(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
        index: usize,
        lower: f64,
        upper: f64,
    ) -> Result<f64, SolverError> {
        let target = self.restricted_loss(objective, x, index, 0.0) + self.nll_increase;
        match dichotomy(
            |delta| self.restricted_loss(objective, x, index, delta),
            target,
            lower,
            upper,
            self.error,
        ) {
            Ok(root) => Ok(root.abs().min(self.max_uncertainty)),
            Err(SolverError::NoBracket { .. }) => Ok(self.max_uncertainty),
            Err(e) => Err(e),
        }
    }
}

impl UncertaintyEvaluator for NllIncrease {
    fn evaluate(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
        let n = objective.dimension();
        let mut lefts = Vec::with_capacity(n);
        let mut rights = Vec::with_capacity(n);
        for i in 0..n {
            lefts.push(self.side(objective, x, i, -self.max_uncertainty, 0.0)?);
            rights.push(self.side(objective, x, i, 0.0, self.max_uncertainty)?);
        }
        Ok((lefts, rights))
    }
}

/// Symmetric uncertainty from the Hessian diagonal
///
/// Uses the quadratic approximation of the loss along each coordinate:
/// `δ = √(2·nll_increase / ∂²L/∂xᵢ²)`, clamped to `max_uncertainty`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HessianDiagonal {
    /// Loss increase defining the interval
    pub nll_increase: f64,
    /// Clamp for unbounded uncertainties
    pub max_uncertainty: f64,
}

impl Default for HessianDiagonal {
    fn default() -> Self {
        Self {
            nll_increase: 1.0,
            max_uncertainty: 1e3,
        }
    }
}

impl UncertaintyEvaluator for HessianDiagonal {
    fn evaluate(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
        let hessian = objective.hessian_diagonal(x);
        let uncertainties: Vec<f64> = hessian
            .iter()
            .map(|&h| {
                if h > 0.0 && h.is_finite() {
                    (2.0 * self.nll_increase / h).sqrt().min(self.max_uncertainty)
                } else {
                    self.max_uncertainty
                }
            })
            .collect();
        Ok((uncertainties.clone(), uncertainties))
    }
}
