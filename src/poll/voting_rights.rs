use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-(entity, criterion) summary of a voting-right assignment
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VotingRightStats {
    /// `Σ π·t` over the raters
    pub cumulative_trust: f64,
    /// Floor granted to every rater before the privacy weight
    pub min_voting_right: f64,
    /// Voting right granted beyond trust
    pub overtrust: f64,
}

/// Voting rights keyed `(username, entity, criterion)`, each in `[0, 1]`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VotingRights {
    rights: BTreeMap<(String, String, String), f64>,
    stats: BTreeMap<(String, String), VotingRightStats>,
}

impl VotingRights {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one voting right
    pub fn set(&mut self, username: &str, entity: &str, criterion: &str, value: f64) {
        self.rights.insert(
            (username.to_string(), entity.to_string(), criterion.to_string()),
            value,
        );
    }

    /// Voting right, zero when absent
    pub fn get(&self, username: &str, entity: &str, criterion: &str) -> f64 {
        self.rights
            .get(&(username.to_string(), entity.to_string(), criterion.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Raters of an entity on a criterion with their rights, sorted by username
    pub fn of(&self, entity: &str, criterion: &str) -> Vec<(&str, f64)> {
        self.rights
            .iter()
            .filter(|((_, e, c), _)| e == entity && c == criterion)
            .map(|((u, _, _), r)| (u.as_str(), *r))
            .collect()
    }

    /// Sum of the rights on an entity
    pub fn total(&self, entity: &str, criterion: &str) -> f64 {
        self.of(entity, criterion).iter().map(|(_, r)| r).sum()
    }

    /// Record the statistics of one (entity, criterion)
    pub fn set_stats(&mut self, entity: &str, criterion: &str, stats: VotingRightStats) {
        self.stats
            .insert((entity.to_string(), criterion.to_string()), stats);
    }

    /// Statistics of one (entity, criterion)
    pub fn stats(&self, entity: &str, criterion: &str) -> Option<&VotingRightStats> {
        self.stats
            .get(&(entity.to_string(), criterion.to_string()))
    }

    /// All statistics, sorted by (entity, criterion)
    pub fn iter_stats(&self) -> impl Iterator<Item = (&str, &str, &VotingRightStats)> {
        self.stats
            .iter()
            .map(|((e, c), s)| (e.as_str(), c.as_str(), s))
    }

    /// Sorted (entity, criterion) pairs with at least one right
    pub fn entity_criteria(&self) -> BTreeSet<(String, String)> {
        self.rights
            .keys()
            .map(|(_, e, c)| (e.clone(), c.clone()))
            .collect()
    }

    /// Rows `(username, entity, criterion, value)` in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, f64)> {
        self.rights
            .iter()
            .map(|((u, e, c), r)| (u.as_str(), e.as_str(), c.as_str(), *r))
    }

    /// Merge another table, which wins on conflicts
    pub fn extend(&mut self, other: VotingRights) {
        self.rights.extend(other.rights);
        self.stats.extend(other.stats);
    }

    /// Number of rights
    pub fn len(&self) -> usize {
        self.rights.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.rights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voting_rights_table() {
        let mut rights = VotingRights::new();
        rights.set("v", "a", "c", 0.5);
        rights.set("u", "a", "c", 1.0);
        rights.set("u", "b", "c", 1.0);
        assert_eq!(rights.of("a", "c"), vec![("u", 1.0), ("v", 0.5)]);
        assert_eq!(rights.total("a", "c"), 1.5);
        assert_eq!(rights.get("w", "a", "c"), 0.0);
        assert_eq!(rights.entity_criteria().len(), 2);
    }
}
