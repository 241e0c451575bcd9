//! Numerical solvers
//!
//! This module provides the optimization machinery behind preference
//! learning and robust aggregation:
//!
//! - [`brentq`] and [`dichotomy`] for one-dimensional roots
//! - [`golden_section_search`] for one-dimensional minimization
//! - [`CoordinateDescent`] and [`Lbfgs`], two interchangeable
//!   [`Minimizer`] engines
//! - [`NllIncrease`] and [`HessianDiagonal`], two
//!   [`UncertaintyEvaluator`]s

mod coordinate_descent;
mod golden;
mod lbfgs;
mod roots;
mod traits;
mod uncertainty;

pub use coordinate_descent::*;
pub use golden::*;
pub use lbfgs::*;
pub use roots::*;
pub use traits::*;
pub use uncertainty::*;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Minimization engine selection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MinimizerConfig {
    /// Coordinate descent with bracketed Brent roots
    CoordinateDescent(CoordinateDescent),
    /// Limited-memory BFGS
    Lbfgs(Lbfgs),
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self::Lbfgs(Lbfgs::default())
    }
}

impl MinimizerConfig {
    /// Coordinate descent with the given tolerance
    pub fn coordinate_descent(convergence_error: f64) -> Self {
        Self::CoordinateDescent(CoordinateDescent {
            convergence_error,
            ..CoordinateDescent::default()
        })
    }

    /// L-BFGS with the given tolerance and iteration cap
    pub fn lbfgs(convergence_error: f64, max_iter: usize) -> Self {
        Self::Lbfgs(Lbfgs::new(convergence_error, max_iter))
    }
}

impl Minimizer for MinimizerConfig {
    fn minimize(
        &self,
        objective: &dyn Objective,
        init: DVector<f64>,
    ) -> Result<Minimum, SolverError> {
        match self {
            Self::CoordinateDescent(cd) => cd.minimize(objective, init),
            Self::Lbfgs(lbfgs) => lbfgs.minimize(objective, init),
        }
    }
}

/// Uncertainty evaluator selection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum UncertaintyConfig {
    /// Bracketed search of the loss increase, per side
    NllIncrease(NllIncrease),
    /// Symmetric quadratic approximation
    HessianDiagonal(HessianDiagonal),
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self::NllIncrease(NllIncrease::default())
    }
}

impl UncertaintyConfig {
    /// Value used to clamp unbounded uncertainties
    pub fn max_uncertainty(&self) -> f64 {
        match self {
            Self::NllIncrease(e) => e.max_uncertainty,
            Self::HessianDiagonal(e) => e.max_uncertainty,
        }
    }
}

impl UncertaintyEvaluator for UncertaintyConfig {
    fn evaluate(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
        match self {
            Self::NllIncrease(e) => e.evaluate(objective, x),
            Self::HessianDiagonal(e) => e.evaluate(objective, x),
        }
    }
}

/// Prelude for solvers module
pub mod prelude {
    pub use super::{
        brentq, dichotomy, golden_section_search, BrentOptions, CoordinateDescent,
        HessianDiagonal, Lbfgs, Minimizer, MinimizerConfig, Minimum, NllIncrease, Objective,
        UncertaintyConfig, UncertaintyEvaluator,
    };
}
