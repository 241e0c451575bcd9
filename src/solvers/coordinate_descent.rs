//! Coordinate descent by one-dimensional root finding
//!
//! Each coordinate update solves `∂L/∂xᵢ = 0` with [`brentq`] on a bracket of
//! width 2 around the current value, expanded as needed. Coordinates are
//! visited in index order; the descent stops after a full sweep in which no
//! coordinate moved by more than `convergence_error`.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::roots::{brentq, BrentOptions};
use super::traits::{Minimizer, Minimum, Objective};
use crate::error::SolverError;

/// Coordinate descent minimizer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinateDescent {
    /// Movement threshold for convergence, also the root-finding tolerance
    pub convergence_error: f64,
    /// Hard cap on the number of sweeps
    pub max_sweeps: usize,
}

impl Default for CoordinateDescent {
    fn default() -> Self {
        Self {
            convergence_error: 1e-5,
            max_sweeps: 1000,
        }
    }
}

impl CoordinateDescent {
    /// Create a coordinate descent minimizer
    pub fn new(convergence_error: f64, max_sweeps: usize) -> Self {
        Self {
            convergence_error,
            max_sweeps,
        }
    }

    /// Run sweeps over the given coordinates only, leaving the others fixed
    pub fn minimize_coordinates(
        &self,
        objective: &dyn Objective,
        mut x: DVector<f64>,
        coordinates: &[usize],
    ) -> Result<Minimum, SolverError> {
        let options = BrentOptions::with_xtol(self.convergence_error);
        let mut max_move = f64::INFINITY;

        for sweep in 0..self.max_sweeps {
            max_move = 0.0f64;
            for &i in coordinates {
                let delta = brentq(
                    |d| objective.partial_derivative(&x, i, d),
                    -1.0,
                    1.0,
                    options,
                )?;
                if !delta.is_finite() {
                    return Err(SolverError::NonFinite(format!("coordinate {} update", i)));
                }
                x[i] += delta;
                max_move = max_move.max(delta.abs());
            }
            if max_move < self.convergence_error {
                let loss = objective.loss(&x);
                return Ok(Minimum {
                    x,
                    loss,
                    iterations: sweep + 1,
                });
            }
        }

        Err(SolverError::MaxIterations {
            iterations: self.max_sweeps,
            metric: max_move,
        })
    }
}

impl Minimizer for CoordinateDescent {
    fn minimize(
        &self,
        objective: &dyn Objective,
        init: DVector<f64>,
    ) -> Result<Minimum, SolverError> {
        let coordinates: Vec<usize> = (0..objective.dimension()).collect();
        self.minimize_coordinates(objective, init, &coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::testing::Quadratic;

    #[test]
    fn test_separable_quadratic() {
        let objective = Quadratic::new(vec![1.0, 4.0, 0.5], vec![3.0, -2.0, 10.0], 0.0);
        let minimum = CoordinateDescent::default()
            .minimize(&objective, DVector::zeros(3))
            .unwrap();
        assert!((minimum.x[0] - 3.0).abs() < 1e-4);
        assert!((minimum.x[1] + 2.0).abs() < 1e-4);
        assert!((minimum.x[2] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_coupled_quadratic() {
        let objective = Quadratic::new(vec![2.0, 2.0], vec![1.0, -1.0], 0.5);
        let minimum = CoordinateDescent::new(1e-8, 1000)
            .minimize(&objective, DVector::zeros(2))
            .unwrap();
        let grad = objective.gradient(&minimum.x);
        assert!(grad.norm() < 1e-5);
    }

    #[test]
    fn test_sweep_cap() {
        let objective = Quadratic::new(vec![1.0], vec![100.0], 0.0);
        let result = CoordinateDescent::new(1e-12, 0).minimize(&objective, DVector::zeros(1));
        assert!(matches!(result, Err(SolverError::MaxIterations { .. })));
    }

    #[test]
    fn test_subset_of_coordinates() {
        let objective = Quadratic::new(vec![1.0, 1.0], vec![5.0, 7.0], 0.0);
        let minimum = CoordinateDescent::default()
            .minimize_coordinates(&objective, DVector::zeros(2), &[1])
            .unwrap();
        assert_eq!(minimum.x[0], 0.0);
        assert!((minimum.x[1] - 7.0).abs() < 1e-4);
    }
}
