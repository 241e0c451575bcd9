use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::VotingRightsAssignment;
use crate::error::{PipelineError, ScoringResult};
use crate::poll::{Poll, VotingRightStats, VotingRights};
use crate::solvers::dichotomy;

/// Trust-weighted voting rights with a bounded overtrust
///
/// On each (entity, criterion), every rater gets `π·max(t, V)` where `π` is
/// 1 for a public evaluation and `privacy_penalty` otherwise, `t` is the
/// rater's trust and `V` is the largest floor such that the rights granted
/// beyond trust, `Σ π·max(0, V − t)`, stay within
/// `overtrust_ratio · Σ π·t + min_overtrust`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffineOvertrust {
    /// Weight of a private evaluation
    pub privacy_penalty: f64,
    /// Overtrust always allowed
    pub min_overtrust: f64,
    /// Overtrust allowed per unit of cumulative trust
    pub overtrust_ratio: f64,
    /// Dichotomy tolerance on the floor
    pub error: f64,
}

impl Default for AffineOvertrust {
    fn default() -> Self {
        Self {
            privacy_penalty: 0.5,
            min_overtrust: 2.0,
            overtrust_ratio: 0.1,
            error: 1e-8,
        }
    }
}

/// Voting rights of the raters of one entity, in input order
#[derive(Clone, Debug, PartialEq)]
pub struct EntityVotingRights {
    /// One right per rater
    pub rights: Vec<f64>,
    /// Summary
    pub stats: VotingRightStats,
}

impl AffineOvertrust {
    /// Set the privacy penalty
    pub fn with_privacy_penalty(mut self, privacy_penalty: f64) -> Self {
        self.privacy_penalty = privacy_penalty;
        self
    }

    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        if !(0.0..=1.0).contains(&self.privacy_penalty) {
            return Err(PipelineError::InvalidArgument(format!(
                "privacy_penalty must be in [0, 1], got {}",
                self.privacy_penalty
            )));
        }
        if !(self.min_overtrust >= 0.0) || !(self.overtrust_ratio >= 0.0) {
            return Err(PipelineError::InvalidArgument(
                "min_overtrust and overtrust_ratio must be non-negative".to_string(),
            ));
        }
        if !(self.error > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "error must be positive, got {}",
                self.error
            )));
        }
        Ok(())
    }

    /// Overtrust allowed for a cumulative trust
    pub fn maximal_overtrust(&self, cumulative_trust: f64) -> f64 {
        self.overtrust_ratio * cumulative_trust + self.min_overtrust
    }

    fn overtrust(floor: f64, raters: &[(f64, f64)]) -> f64 {
        raters
            .iter()
            .map(|&(trust, privacy)| privacy * (floor - trust).max(0.0))
            .sum()
    }

    /// Voting rights of raters given as `(trust, privacy weight)`
    pub fn entity_voting_rights(&self, raters: &[(f64, f64)]) -> ScoringResult<EntityVotingRights> {
        let cumulative_trust: f64 = raters.iter().map(|&(t, p)| t * p).sum();
        let allowed = self.maximal_overtrust(cumulative_trust);
        let floor = if Self::overtrust(1.0, raters) <= allowed {
            1.0
        } else {
            dichotomy(|v| Self::overtrust(v, raters), allowed, 0.0, 1.0, self.error)?
        };
        let rights: Vec<f64> = raters
            .iter()
            .map(|&(trust, privacy)| privacy * trust.max(floor))
            .collect();
        let total: f64 = rights.iter().sum();
        Ok(EntityVotingRights {
            rights,
            stats: VotingRightStats {
                cumulative_trust,
                min_voting_right: floor,
                overtrust: total - cumulative_trust,
            },
        })
    }
}

impl VotingRightsAssignment for AffineOvertrust {
    fn assign(&self, poll: &Poll) -> ScoringResult<VotingRights> {
        self.validate()?;
        let mut raters: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
        for c in poll.comparisons.iter() {
            for entity in [c.left.as_str(), c.right.as_str()] {
                raters
                    .entry((entity, c.criterion.as_str()))
                    .or_default()
                    .insert(c.username.as_str());
            }
        }
        for r in poll.ratings.iter() {
            raters
                .entry((r.entity.as_str(), r.criterion.as_str()))
                .or_default()
                .insert(r.username.as_str());
        }

        let mut voting_rights = VotingRights::new();
        for ((entity, criterion), usernames) in raters {
            let usernames: Vec<&str> = usernames.into_iter().collect();
            let weights: Vec<(f64, f64)> = usernames
                .iter()
                .map(|u| {
                    (
                        poll.users.trust(u),
                        poll.made_public.penalty(self.privacy_penalty, u, entity),
                    )
                })
                .collect();
            let assigned = self.entity_voting_rights(&weights)?;
            for (username, right) in usernames.iter().zip(&assigned.rights) {
                voting_rights.set(username, entity, criterion, *right);
            }
            voting_rights.set_stats(entity, criterion, assigned.stats);
        }
        tracing::debug!(n_rights = voting_rights.len(), "voting rights assigned");
        Ok(voting_rights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{Comparison, Comparisons, Entities, MadePublic, User, Users};

    #[test]
    fn test_few_raters_get_full_rights() {
        let assigned = AffineOvertrust::default()
            .entity_voting_rights(&[(0.2, 1.0), (0.0, 1.0)])
            .unwrap();
        assert_eq!(assigned.rights, vec![1.0, 1.0]);
        assert_eq!(assigned.stats.min_voting_right, 1.0);
        assert!((assigned.stats.overtrust - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_overtrust_is_bounded() {
        let mut raters = vec![(1.0, 1.0); 10];
        raters.extend(vec![(0.0, 1.0); 30]);
        let aot = AffineOvertrust::default();
        let assigned = aot.entity_voting_rights(&raters).unwrap();
        let total: f64 = assigned.rights.iter().sum();
        assert!((assigned.stats.cumulative_trust - 10.0).abs() < 1e-12);
        // allowed overtrust is 0.1 · 10 + 2 = 3, spread over 30 raters
        assert!((total - 13.0).abs() < 1e-6);
        assert!((assigned.stats.min_voting_right - 0.1).abs() < 1e-6);
        assert!(assigned.rights.iter().all(|r| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn test_privacy_penalty() {
        let users = Users::from_rows(vec![
            User::new("u").with_trust(1.0),
            User::new("v").with_trust(1.0),
        ])
        .unwrap();
        let comparisons = Comparisons::from_rows(vec![
            Comparison::new("u", "c", "a", "b", 1.0, 1.0),
            Comparison::new("v", "c", "a", "b", 1.0, 1.0),
        ])
        .unwrap();
        let poll = Poll::new(users, Entities::from_names(&["a", "b"]).unwrap())
            .with_comparisons(comparisons)
            .with_made_public(MadePublic::from_rows(vec![("v", "a", false)]));
        let rights = AffineOvertrust::default().assign(&poll).unwrap();
        assert_eq!(rights.get("u", "a", "c"), 1.0);
        assert_eq!(rights.get("v", "a", "c"), 0.5);
        assert_eq!(rights.get("v", "b", "c"), 1.0);
        let stats = rights.stats("a", "c").unwrap();
        assert!((rights.total("a", "c") - stats.cumulative_trust - stats.overtrust).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_penalty() {
        assert!(AffineOvertrust::default()
            .with_privacy_penalty(1.5)
            .validate()
            .is_err());
    }
}
