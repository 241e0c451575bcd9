//! Lipschitz-resilient means

use super::quantile::qr_median;
use super::sample::Sample;
use crate::error::SolverError;

/// Weighted mean of the values clipped to `[center - radius, center + radius]`
///
/// Returns `center` when the total weight is zero.
pub fn clip_mean(sample: &Sample, center: f64, radius: f64) -> f64 {
    let total = sample.total_weight();
    if total <= 0.0 {
        return center;
    }
    let weighted: f64 = sample
        .values
        .iter()
        .zip(&sample.weights)
        .map(|(x, w)| w * x.clamp(center - radius, center + radius))
        .sum();
    weighted / total
}

/// Byzantine-resilient mean
///
/// Clips the observations around a regularized median (computed with
/// `lipschitz / 4`) at radius `lipschitz · W / 4`, where `W` is the total
/// weight, then averages. A voter with weight `w` moves the result by at
/// most `lipschitz · w / 2`; with enough participation the clipping is
/// inactive and the result is the plain weighted mean.
pub fn lipschitz_resilient_mean(
    lipschitz: f64,
    sample: &Sample,
    default_value: f64,
    error: f64,
) -> Result<f64, SolverError> {
    if sample.is_empty() || sample.total_weight() <= 0.0 {
        return Ok(default_value);
    }
    let center = qr_median(lipschitz / 4.0, sample, default_value, error)?;
    let radius = sample.total_weight() * lipschitz / 4.0;
    Ok(clip_mean(sample, center, radius))
}
