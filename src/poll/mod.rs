//! Input tables of a poll
//!
//! Users, entities, vouches, comparisons, ratings and publicity flags, as
//! delivered by the ingestion layer. Every table validates its rows on
//! insertion and serializes as a list of rows; [`Poll::validate`] checks
//! the references between tables.

mod comparisons;
mod entities;
mod made_public;
mod ratings;
pub mod synthetic;
mod users;
mod voting_rights;
mod vouches;

pub use comparisons::*;
pub use entities::*;
pub use made_public::*;
pub use ratings::*;
pub use users::*;
pub use voting_rights::*;
pub use vouches::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{PipelineError, ScoringResult};

/// All input tables of one poll
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Poll {
    /// Participants
    pub users: Users,
    /// Catalog
    pub entities: Entities,
    /// Vouch graph
    pub vouches: Vouches,
    /// Pairwise comparisons
    pub comparisons: Comparisons,
    /// Direct ratings
    pub ratings: Ratings,
    /// Publicity flags
    pub made_public: MadePublic,
}

impl Poll {
    /// Poll with users and entities only
    pub fn new(users: Users, entities: Entities) -> Self {
        Self {
            users,
            entities,
            ..Self::default()
        }
    }

    /// Set the comparisons
    pub fn with_comparisons(mut self, comparisons: Comparisons) -> Self {
        self.comparisons = comparisons;
        self
    }

    /// Set the ratings
    pub fn with_ratings(mut self, ratings: Ratings) -> Self {
        self.ratings = ratings;
        self
    }

    /// Set the vouches
    pub fn with_vouches(mut self, vouches: Vouches) -> Self {
        self.vouches = vouches;
        self
    }

    /// Set the publicity flags
    pub fn with_made_public(mut self, made_public: MadePublic) -> Self {
        self.made_public = made_public;
        self
    }

    /// Check that every row refers to known users and entities
    pub fn validate(&self) -> ScoringResult<()> {
        let unknown_user = |username: &str| {
            PipelineError::InvalidArgument(format!("unknown user {}", username))
        };
        let unknown_entity = |entity: &str| {
            PipelineError::InvalidArgument(format!("unknown entity {}", entity))
        };
        for c in self.comparisons.iter() {
            if !self.users.contains(&c.username) {
                return Err(unknown_user(&c.username));
            }
            for entity in [&c.left, &c.right] {
                if !self.entities.contains(entity) {
                    return Err(unknown_entity(entity));
                }
            }
        }
        for r in self.ratings.iter() {
            if !self.users.contains(&r.username) {
                return Err(unknown_user(&r.username));
            }
            if !self.entities.contains(&r.entity) {
                return Err(unknown_entity(&r.entity));
            }
        }
        for v in self.vouches.iter() {
            for username in [&v.voucher, &v.vouchee] {
                if !self.users.contains(username) {
                    return Err(unknown_user(username));
                }
            }
        }
        for (username, entity, _) in self.made_public.iter() {
            if !self.users.contains(username) {
                return Err(unknown_user(username));
            }
            if !self.entities.contains(entity) {
                return Err(unknown_entity(entity));
            }
        }
        Ok(())
    }

    /// Sorted criteria appearing in comparisons or ratings
    pub fn criteria(&self) -> BTreeSet<String> {
        let mut criteria = self.comparisons.criteria();
        criteria.extend(self.ratings.iter().map(|r| r.criterion.clone()));
        criteria
    }

    /// Sorted `(username, criterion)` pairs with any evaluation
    pub fn user_criteria(&self) -> BTreeSet<(String, String)> {
        let mut pairs = self.comparisons.user_criteria();
        pairs.extend(self.ratings.user_criteria());
        pairs
    }
}

/// Prelude for poll module
pub mod prelude {
    pub use super::synthetic::{SyntheticPoll, SyntheticPollConfig};
    pub use super::{
        Comparison, Comparisons, Entities, Entity, MadePublic, Poll, Rating, Ratings, User,
        Users, Vouch, Vouches, VotingRightStats, VotingRights,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_poll() -> Poll {
        Poll::new(
            Users::from_rows(vec![User::new("u"), User::new("v")]).unwrap(),
            Entities::from_names(&["a", "b"]).unwrap(),
        )
    }

    #[test]
    fn test_validate_references() {
        let poll = small_poll().with_comparisons(
            Comparisons::from_rows(vec![Comparison::new("u", "c", "a", "b", 1.0, 1.0)]).unwrap(),
        );
        assert!(poll.validate().is_ok());

        let poll = small_poll().with_comparisons(
            Comparisons::from_rows(vec![Comparison::new("w", "c", "a", "b", 1.0, 1.0)]).unwrap(),
        );
        assert!(matches!(poll.validate(), Err(PipelineError::InvalidArgument(_))));

        let poll = small_poll().with_made_public(MadePublic::from_rows(vec![("u", "z", false)]));
        assert!(poll.validate().is_err());
    }

    #[test]
    fn test_user_criteria_merges_ratings() {
        let poll = small_poll()
            .with_comparisons(
                Comparisons::from_rows(vec![Comparison::new("u", "c1", "a", "b", 1.0, 1.0)])
                    .unwrap(),
            )
            .with_ratings(
                Ratings::from_rows(vec![Rating::new("v", "c2", "a", 1.0, 0.0, 2.0)]).unwrap(),
            );
        assert_eq!(poll.user_criteria().len(), 2);
        assert_eq!(poll.criteria().len(), 2);
    }

    #[test]
    fn test_poll_json_round_trip() {
        let poll = small_poll().with_vouches(
            Vouches::from_rows(vec![Vouch::new("u", "v", "Personhood", 1.0)]).unwrap(),
        );
        let json = serde_json::to_string(&poll).unwrap();
        let back: Poll = serde_json::from_str(&json).unwrap();
        assert_eq!(poll, back);
    }
}
