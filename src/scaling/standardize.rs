use serde::{Deserialize, Serialize};

use super::CommonScaling;
use crate::error::{PipelineError, ScoringResult};
use crate::primitives::{qr_standard_deviation, Sample};
use crate::score::Score;

/// Multiplier bringing the resilient deviation of all scores to one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Standardize {
    /// Quantile of the absolute deviations taken as the deviation
    pub dev_quantile: f64,
    /// Resilience of the deviation
    pub lipschitz: f64,
    /// Root-finding tolerance
    pub error: f64,
}

impl Default for Standardize {
    fn default() -> Self {
        Self {
            dev_quantile: 0.9,
            lipschitz: 0.1,
            error: 1e-5,
        }
    }
}

impl CommonScaling for Standardize {
    fn validate(&self) -> ScoringResult<()> {
        if !(self.dev_quantile > 0.0 && self.dev_quantile < 1.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "dev_quantile must be in (0, 1), got {}",
                self.dev_quantile
            )));
        }
        if !(self.lipschitz > 0.0) || !(self.error > 0.0) {
            return Err(PipelineError::InvalidArgument(
                "lipschitz and error must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn common_scale(&self, sample: &Sample) -> ScoringResult<Option<(Score, Score)>> {
        let std_dev =
            qr_standard_deviation(self.lipschitz, sample, self.dev_quantile, 1.0, self.error, None)?;
        if !(std_dev > 0.0) || !std_dev.is_finite() {
            tracing::warn!(std_dev, "degenerate deviation, standardization skipped");
            return Ok(None);
        }
        Ok(Some((Score::certain(1.0 / std_dev), Score::certain(0.0))))
    }
}
