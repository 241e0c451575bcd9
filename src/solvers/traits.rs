//! Core solver traits
//!
//! Preference learning is written against these seams so that the
//! minimization engine and the uncertainty estimator can be swapped
//! independently.

use nalgebra::DVector;

use crate::error::SolverError;

/// Smooth convex loss over a flat parameter vector
///
/// The loss splits into a negative log-likelihood and a separable prior.
/// Coordinate-restricted evaluations take the current point `x`, a
/// coordinate `index` and a displacement `delta` along that coordinate.
pub trait Objective: Sync {
    /// Number of parameters
    fn dimension(&self) -> usize;

    /// Full loss (likelihood plus prior)
    fn loss(&self, x: &DVector<f64>) -> f64;

    /// Gradient of the full loss
    fn gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Partial derivative of the loss along `index`, with that coordinate
    /// moved to `x[index] + delta`
    fn partial_derivative(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64 {
        let mut moved = x.clone();
        moved[index] += delta;
        self.gradient(&moved)[index]
    }

    /// Negative log-likelihood of the data involving `index`, with that
    /// coordinate moved by `delta`
    fn translated_nll(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64;

    /// Prior term of coordinate `index`, moved by `delta`
    fn translated_prior(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64;

    /// Diagonal of the Hessian of the full loss
    fn hessian_diagonal(&self, x: &DVector<f64>) -> DVector<f64>;
}

/// Outcome of a minimization
#[derive(Clone, Debug)]
pub struct Minimum {
    /// Minimizer
    pub x: DVector<f64>,
    /// Loss at the minimizer
    pub loss: f64,
    /// Iterations used (sweeps for coordinate descent)
    pub iterations: usize,
}

/// Minimization engine
pub trait Minimizer: Send + Sync {
    /// Minimize `objective` starting from `init`
    ///
    /// Fails with [`SolverError::MaxIterations`] when the iteration cap is
    /// reached before convergence and with [`SolverError::NonFinite`] when a
    /// NaN shows up in the iterates or the gradient.
    fn minimize(&self, objective: &dyn Objective, init: DVector<f64>)
        -> Result<Minimum, SolverError>;
}

/// Coordinate-wise uncertainty estimator
pub trait UncertaintyEvaluator: Send + Sync {
    /// Left and right uncertainties of every coordinate of the minimizer `x`
    fn evaluate(
        &self,
        objective: &dyn Objective,
        x: &DVector<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), SolverError>;
}
