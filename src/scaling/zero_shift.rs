use serde::{Deserialize, Serialize};

use super::CommonScaling;
use crate::error::{PipelineError, ScoringResult};
use crate::primitives::{qr_quantile, Sample};
use crate::score::Score;

/// Translation moving a low quantile of all scores to zero
///
/// After this layer, about `1 - zero_quantile` of the voting mass lies
/// above zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileZeroShift {
    /// Quantile sent to zero
    pub zero_quantile: f64,
    /// Resilience of the quantile
    pub lipschitz: f64,
    /// Root-finding tolerance
    pub error: f64,
}

impl Default for QuantileZeroShift {
    fn default() -> Self {
        Self {
            zero_quantile: 0.15,
            lipschitz: 0.1,
            error: 1e-5,
        }
    }
}

impl QuantileZeroShift {
    /// Set the quantile sent to zero
    pub fn with_zero_quantile(mut self, zero_quantile: f64) -> Self {
        self.zero_quantile = zero_quantile;
        self
    }
}

impl CommonScaling for QuantileZeroShift {
    fn validate(&self) -> ScoringResult<()> {
        if !(self.zero_quantile > 0.0 && self.zero_quantile < 1.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "zero_quantile must be in (0, 1), got {}",
                self.zero_quantile
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
        let shift = qr_quantile(self.lipschitz, self.zero_quantile, sample, 0.0, self.error)?;
        Ok(Some((Score::certain(1.0), Score::certain(-shift))))
    }
}
