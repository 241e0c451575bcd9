use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::TrustPropagation;
use crate::error::{PipelineError, ScoringResult};
use crate::poll::{Users, Vouches};

/// Iteration cap used when `decay` leaves no finite bound
const MAX_ITERATIONS: usize = 10_000;

/// Robustified PageRank on the vouch graph
///
/// Pretrusted users start at `pretrust_value`. At every step, each voucher
/// hands `decay · vouch / (n_vouches + sink_vouch)` of its trust to each
/// vouchee, and trusts are clipped at 1 so that no user gains unbounded
/// influence. Users with an explicit trust score keep it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipschiTrust {
    /// Starting trust of pretrusted users
    pub pretrust_value: f64,
    /// Share of trust passed along a vouch
    pub decay: f64,
    /// Implicit vouches of every voucher for a sink
    pub sink_vouch: f64,
    /// L1 stopping tolerance
    pub error: f64,
    /// Kind of vouch propagated
    pub kind: String,
}

impl Default for LipschiTrust {
    fn default() -> Self {
        Self {
            pretrust_value: 0.8,
            decay: 0.8,
            sink_vouch: 5.0,
            error: 1e-8,
            kind: "Personhood".to_string(),
        }
    }
}

impl LipschiTrust {
    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        if !(0.0..=1.0).contains(&self.pretrust_value) {
            return Err(PipelineError::InvalidArgument(format!(
                "pretrust_value must be in [0, 1], got {}",
                self.pretrust_value
            )));
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(PipelineError::InvalidArgument(format!(
                "decay must be in [0, 1], got {}",
                self.decay
            )));
        }
        if !(self.sink_vouch >= 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "sink_vouch must be non-negative, got {}",
                self.sink_vouch
            )));
        }
        if !(self.error > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "error must be positive, got {}",
                self.error
            )));
        }
        Ok(())
    }

    fn max_iterations(&self, n_users: usize) -> usize {
        let bound = -(n_users as f64 / self.error).ln() / self.decay.ln();
        if bound.is_finite() {
            (bound.max(1.0).ceil() as usize).min(MAX_ITERATIONS)
        } else {
            MAX_ITERATIONS
        }
    }
}

impl TrustPropagation for LipschiTrust {
    fn propagate(&self, users: &Users, vouches: &Vouches) -> ScoringResult<BTreeMap<String, f64>> {
        self.validate()?;
        if users.is_empty() {
            return Ok(BTreeMap::new());
        }

        let edges: Vec<(&str, &str, f64)> = vouches
            .of_kind(&self.kind)
            .filter(|(voucher, vouchee, _)| users.contains(voucher) && users.contains(vouchee))
            .collect();
        let mut n_vouches: BTreeMap<&str, f64> = BTreeMap::new();
        for (voucher, _, _) in &edges {
            *n_vouches.entry(*voucher).or_insert(self.sink_vouch) += 1.0;
        }

        let pinned: BTreeMap<&str, f64> = users
            .iter()
            .filter_map(|u| u.trust_score.map(|t| (u.username.as_str(), t)))
            .collect();
        let pretrusts: BTreeMap<&str, f64> = users
            .iter()
            .map(|u| {
                let pretrust = if u.is_pretrusted { self.pretrust_value } else { 0.0 };
                (u.username.as_str(), pinned.get(u.username.as_str()).copied().unwrap_or(pretrust))
            })
            .collect();

        let mut trusts = pretrusts.clone();
        let max_iterations = self.max_iterations(users.len());
        let mut iterations = 0;
        while iterations < max_iterations {
            iterations += 1;
            let mut next = pretrusts.clone();
            for &(voucher, vouchee, value) in &edges {
                if pinned.contains_key(vouchee) {
                    continue;
                }
                let discount = self.decay * value / n_vouches[voucher];
                if let Some(t) = next.get_mut(vouchee) {
                    *t += discount * trusts[voucher];
                }
            }
            for t in next.values_mut() {
                *t = t.min(1.0);
            }
            let delta: f64 = next
                .iter()
                .map(|(u, t)| (t - trusts[u]).abs())
                .sum();
            trusts = next;
            if delta < self.error {
                break;
            }
        }
        tracing::debug!(iterations, n_users = users.len(), n_vouches = edges.len(), "trust propagated");

        Ok(trusts
            .into_iter()
            .map(|(u, t)| (u.to_string(), t))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{User, Vouch};

    fn run(users: Vec<User>, vouches: Vec<Vouch>) -> BTreeMap<String, f64> {
        let users = Users::from_rows(users).unwrap();
        let vouches = Vouches::from_rows(vouches).unwrap();
        LipschiTrust::default().propagate(&users, &vouches).unwrap()
    }

    #[test]
    fn test_pretrust_only() {
        let trusts = run(vec![User::new("a").pretrusted(), User::new("b")], vec![]);
        assert!((trusts["a"] - 0.8).abs() < 1e-12);
        assert_eq!(trusts["b"], 0.0);
    }

    #[test]
    fn test_single_vouch() {
        let trusts = run(
            vec![User::new("a").pretrusted(), User::new("b")],
            vec![Vouch::new("a", "b", "Personhood", 1.0)],
        );
        // one vouch plus a sink of five: b receives 0.8 · 0.8 / 6
        assert!((trusts["b"] - 0.8 * 0.8 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_trust_bounded_by_one() {
        let mut users = vec![User::new("target")];
        let mut vouches = Vec::new();
        for i in 0..50 {
            let name = format!("p{:02}", i);
            users.push(User::new(name.clone()).pretrusted());
            vouches.push(Vouch::new(name.clone(), "target", "Personhood", 1.0));
            vouches.push(Vouch::new(name, "target", "Other", 1.0));
        }
        let trusts = run(users, vouches);
        assert!(trusts.values().all(|t| (0.0..=1.0).contains(t)));
        assert!((trusts["target"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_trust_is_kept() {
        let trusts = run(
            vec![User::new("a").pretrusted(), User::new("b").with_trust(0.3)],
            vec![Vouch::new("a", "b", "Personhood", 1.0)],
        );
        assert_eq!(trusts["b"], 0.3);
    }

    #[test]
    fn test_other_kinds_ignored() {
        let trusts = run(
            vec![User::new("a").pretrusted(), User::new("b")],
            vec![Vouch::new("a", "b", "Expertise", 1.0)],
        );
        assert_eq!(trusts["b"], 0.0);
    }

    #[test]
    fn test_invalid_settings() {
        let bad = LipschiTrust {
            decay: 1.5,
            ..LipschiTrust::default()
        };
        assert!(bad.validate().is_err());
    }
}
