//! Quadratically regularized quantiles
//!
//! `qr_quantile` returns the minimizer of
//!
//! ```text
//! F(y) = (y - default)² / (2L) + Σᵢ wᵢ · ρ_q(y; xᵢ, λᵢ, ρᵢ)
//! ```
//!
//! where `ρ_q` is a smoothed pinball loss whose smoothing width is the
//! uncertainty of `xᵢ` on the side facing `y`. The quadratic anchor makes
//! `F` strongly convex with curvature at least `1/L`, while each voter's
//! force on `F′` is bounded by its weight, so moving one observation shifts
//! the result by at most `2·wᵢ·L`.

use super::sample::Sample;
use crate::error::SolverError;
use crate::solvers::{brentq, BrentOptions};

/// Derivative of the regularized quantile loss at `y`
pub fn qr_quantile_loss_derivative(
    y: f64,
    lipschitz: f64,
    quantile: f64,
    sample: &Sample,
    default_value: f64,
) -> f64 {
    let regularization = (y - default_value) / lipschitz;
    let quantile_term = if quantile == 0.5 {
        0.0
    } else {
        (1.0 - 2.0 * quantile) * sample.total_weight()
    };
    let forces: f64 = (0..sample.len())
        .map(|i| {
            let delta = y - sample.values[i];
            if delta == 0.0 {
                return 0.0;
            }
            let u = sample.facing_uncertainty(i, y);
            sample.weights[i] * delta / (u * u + delta * delta).sqrt()
        })
        .sum();
    regularization + quantile_term + forces
}

/// Lipschitz-resilient quantile estimator
///
/// # Arguments
///
/// * `lipschitz` - Maximum influence per unit of voting right; smaller is
///   more resilient and pulls harder toward `default_value`
/// * `quantile` - In `(0, 1)`
/// * `sample` - Weighted observations with uncertainties
/// * `default_value` - Output for an empty sample, and regularization anchor
/// * `error` - Absolute tolerance on the result
pub fn qr_quantile(
    lipschitz: f64,
    quantile: f64,
    sample: &Sample,
    default_value: f64,
    error: f64,
) -> Result<f64, SolverError> {
    debug_assert!(quantile > 0.0 && quantile < 1.0);
    if sample.is_empty() {
        return Ok(default_value);
    }
    let lower = sample
        .values
        .iter()
        .copied()
        .fold(default_value, f64::min)
        - 1.0;
    let upper = sample
        .values
        .iter()
        .copied()
        .fold(default_value, f64::max)
        + 1.0;
    brentq(
        |y| qr_quantile_loss_derivative(y, lipschitz, quantile, sample, default_value),
        lower,
        upper,
        BrentOptions::with_xtol(error),
    )
}

/// Lipschitz-resilient median, [`qr_quantile`] at `q = 1/2`
pub fn qr_median(
    lipschitz: f64,
    sample: &Sample,
    default_value: f64,
    error: f64,
) -> Result<f64, SolverError> {
    qr_quantile(lipschitz, 0.5, sample, default_value, error)
}

/// Uncertainty of a regularized median
///
/// Combines a prior deviation `default_dev` with the capped curvature that
/// the observations contribute around `median`:
///
/// ```text
/// σ = ( default_dev⁻² + 2·default_dev⁻³ · Σᵢ wᵢ·min(L, uᵢ² / (uᵢ² + (xᵢ - m)²)^{3/2}) )^{-1/2}
/// ```
///
/// with `uᵢ` the mean of the two uncertainties of `xᵢ`. With no data the
/// result is `default_dev`; it shrinks as agreeing, precise voters accumulate.
pub fn qr_uncertainty(
    lipschitz: f64,
    sample: &Sample,
    default_dev: f64,
    error: f64,
    median: Option<f64>,
) -> Result<f64, SolverError> {
    if sample.is_empty() {
        return Ok(default_dev);
    }
    let median = match median {
        Some(m) => m,
        None => qr_median(lipschitz, sample, 0.0, error)?,
    };

    let capped_second_derivative: f64 = (0..sample.len())
        .map(|i| {
            let u = (sample.left_uncs[i] + sample.right_uncs[i]) / 2.0;
            let square = u * u;
            let deviation = sample.values[i] - median;
            let denominator = (square + deviation * deviation).powf(1.5);
            let curvature = if denominator > 0.0 {
                square / denominator
            } else {
                f64::INFINITY
            };
            sample.weights[i] * lipschitz.min(curvature)
        })
        .sum();

    Ok(
        (default_dev.powi(-2) + 2.0 * default_dev.powi(-3) * capped_second_derivative)
            .powf(-0.5),
    )
}

/// Lipschitz-resilient standard deviation
///
/// The `quantile_dev` regularized quantile of the deviations `|xᵢ - m|` from
/// the regularized median `m`. Uncertainties toward the median are capped at
/// the deviation itself. Never negative.
pub fn qr_standard_deviation(
    lipschitz: f64,
    sample: &Sample,
    quantile_dev: f64,
    default_dev: f64,
    error: f64,
    median: Option<f64>,
) -> Result<f64, SolverError> {
    if sample.is_empty() {
        return Ok(default_dev);
    }
    let median = match median {
        Some(m) => m,
        None => qr_median(lipschitz, sample, 0.0, error)?,
    };

    let mut deviations = Sample::new();
    for i in 0..sample.len() {
        let delta = sample.values[i] - median;
        let deviation = delta.abs();
        let (toward, away) = if delta > 0.0 {
            (sample.left_uncs[i], sample.right_uncs[i])
        } else if delta < 0.0 {
            (sample.right_uncs[i], sample.left_uncs[i])
        } else {
            (0.0, sample.left_uncs[i].max(sample.right_uncs[i]))
        };
        deviations.values.push(deviation);
        deviations.weights.push(sample.weights[i]);
        deviations.left_uncs.push(toward.min(deviation));
        deviations.right_uncs.push(away);
    }

    Ok(qr_quantile(lipschitz, quantile_dev, &deviations, default_dev, error)?.max(0.0))
}
