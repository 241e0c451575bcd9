//! Limited-memory BFGS
//!
//! Quasi-Newton minimization over the flat parameter vector. The inverse
//! Hessian is approximated from the last `memory` curvature pairs with the
//! two-loop recursion; steps are accepted by a backtracking Armijo line
//! search.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::traits::{Minimizer, Minimum, Objective};
use crate::error::SolverError;

/// L-BFGS minimizer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lbfgs {
    /// Gradient-norm tolerance
    pub convergence_error: f64,
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Number of stored curvature pairs
    pub memory: usize,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self {
            convergence_error: 1e-5,
            max_iter: 100,
            memory: 10,
        }
    }
}

impl Lbfgs {
    /// Create an L-BFGS minimizer
    pub fn new(convergence_error: f64, max_iter: usize) -> Self {
        Self {
            convergence_error,
            max_iter,
            ..Self::default()
        }
    }

    /// Two-loop recursion: approximate `H⁻¹ · gradient`
    fn inverse_hessian_product(
        gradient: &DVector<f64>,
        history: &VecDeque<(DVector<f64>, DVector<f64>, f64)>,
    ) -> DVector<f64> {
        let mut q = gradient.clone();
        let mut alphas = Vec::with_capacity(history.len());

        for (s, y, rho) in history.iter().rev() {
            let alpha = rho * s.dot(&q);
            q -= alpha * y;
            alphas.push(alpha);
        }

        // Initial scaling γ = sᵀy / yᵀy from the latest pair
        let gamma = match history.back() {
            Some((s, y, _)) => s.dot(y) / y.dot(y),
            None => 1.0,
        };
        let mut r = gamma * q;

        for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = rho * y.dot(&r);
            r += (alpha - beta) * s;
        }
        r
    }
}

impl Minimizer for Lbfgs {
    fn minimize(
        &self,
        objective: &dyn Objective,
        init: DVector<f64>,
    ) -> Result<Minimum, SolverError> {
        let mut x = init;
        let mut loss = objective.loss(&x);
        let mut gradient = objective.gradient(&x);
        let mut history: VecDeque<(DVector<f64>, DVector<f64>, f64)> =
            VecDeque::with_capacity(self.memory);

        for iter in 0..self.max_iter {
            if !loss.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
                return Err(SolverError::NonFinite(format!(
                    "loss or gradient at iteration {}",
                    iter
                )));
            }
            let gradient_norm = gradient.norm();
            if gradient_norm < self.convergence_error {
                return Ok(Minimum {
                    x,
                    loss,
                    iterations: iter,
                });
            }

            let mut direction = -Self::inverse_hessian_product(&gradient, &history);
            let mut slope = gradient.dot(&direction);
            if slope >= 0.0 {
                // Not a descent direction: restart from steepest descent
                history.clear();
                direction = -gradient.clone();
                slope = -gradient_norm * gradient_norm;
            }

            // Backtracking line search (Armijo condition)
            let mut step_size = 1.0;
            let mut accepted = None;
            for _ in 0..40 {
                let candidate = &x + step_size * &direction;
                let candidate_loss = objective.loss(&candidate);
                if candidate_loss <= loss + 1e-4 * step_size * slope {
                    accepted = Some((candidate, candidate_loss));
                    break;
                }
                step_size *= 0.5;
            }
            let (new_x, new_loss) = match accepted {
                Some(step) => step,
                // No decrease can be found at machine precision
                None => {
                    return Ok(Minimum {
                        x,
                        loss,
                        iterations: iter,
                    })
                }
            };

            let new_gradient = objective.gradient(&new_x);
            let s = &new_x - &x;
            let y = &new_gradient - &gradient;
            let curvature = s.dot(&y);
            if curvature > 1e-12 {
                if history.len() == self.memory {
                    history.pop_front();
                }
                history.push_back((s, y, 1.0 / curvature));
            }

            x = new_x;
            loss = new_loss;
            gradient = new_gradient;
        }

        let gradient_norm = gradient.norm();
        if gradient_norm < self.convergence_error {
            return Ok(Minimum {
                x,
                loss,
                iterations: self.max_iter,
            });
        }
        Err(SolverError::MaxIterations {
            iterations: self.max_iter,
            metric: gradient_norm,
        })
    }
}
