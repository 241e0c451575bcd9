//! Collaborative scaling
//!
//! [`Mehestan`] maps every personal model onto a scale shared with the
//! scalers. [`QuantileZeroShift`] and [`Standardize`] then apply one
//! affine layer common to all users, computed from the voting-right
//! weighted scores of everyone.

mod mehestan;
mod scalers;
mod standardize;
mod zero_shift;

pub use mehestan::*;
pub use scalers::*;
pub use standardize::*;
pub use zero_shift::*;

use crate::error::ScoringResult;
use crate::model::UserModels;
use crate::poll::{Entities, VotingRights};
use crate::primitives::Sample;
use crate::score::Score;

/// Affine layer shared by all users of a criterion
pub trait CommonScaling {
    /// Check the settings
    fn validate(&self) -> ScoringResult<()>;

    /// `(multiplier, translation)` for the given sample of scores, or
    /// `None` to leave the scores unchanged
    fn common_scale(&self, sample: &Sample) -> ScoringResult<Option<(Score, Score)>>;

    /// Compute the layer on the current scores and write it at `height`
    fn apply(
        &self,
        models: &mut UserModels,
        entities: &Entities,
        voting_rights: &VotingRights,
        criterion: &str,
        height: usize,
    ) -> ScoringResult<Option<(Score, Score)>> {
        let sample = weighted_scores(models, entities, voting_rights, criterion);
        let scale = self.common_scale(&sample)?;
        if let Some((multiplier, translation)) = scale {
            models.set_common_scale(height, criterion, multiplier, translation)?;
        }
        Ok(scale)
    }
}

/// Current scores of every user on `criterion`, weighted by voting right
///
/// Scores without a positive voting right are left out.
pub fn weighted_scores(
    models: &UserModels,
    entities: &Entities,
    voting_rights: &VotingRights,
    criterion: &str,
) -> Sample {
    let mut sample = Sample::new();
    for username in models.usernames() {
        for (entity, score) in models.evaluate(username, entities, criterion) {
            let right = voting_rights.get(username, &entity, criterion);
            if right > 0.0 {
                sample.push(score, right);
            }
        }
    }
    sample
}

/// Prelude for scaling module
pub mod prelude {
    pub use super::{
        compute_activities, select_scalers, CommonScaling, Mehestan, QuantileZeroShift,
        ScalingOutcome, Standardize,
    };
}
