//! Voting rights
//!
//! A voting right in `[0, 1]` is granted to each rater of each entity on
//! each criterion. It weighs the rater's score in scaling and aggregation.

mod affine_overtrust;

pub use affine_overtrust::*;

use crate::error::ScoringResult;
use crate::poll::{Poll, VotingRights};

/// Assigns voting rights to the raters of every (entity, criterion)
pub trait VotingRightsAssignment {
    /// Voting rights of the poll's raters
    fn assign(&self, poll: &Poll) -> ScoringResult<VotingRights>;
}

/// Prelude for voting_rights module
pub mod prelude {
    pub use super::{AffineOvertrust, EntityVotingRights, VotingRightsAssignment};
}
