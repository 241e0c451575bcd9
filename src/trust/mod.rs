//! Trust propagation
//!
//! Trust scores in `[0, 1]` weigh every user's say in scaling and
//! aggregation. They are either given explicitly or propagated from
//! pretrusted users through the vouch graph.

mod lipschitrust;

pub use lipschitrust::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ScoringResult;
use crate::poll::{Users, Vouches};

/// Computes a trust score for every user
pub trait TrustPropagation {
    /// Trust of every user, keyed by username
    fn propagate(&self, users: &Users, vouches: &Vouches) -> ScoringResult<BTreeMap<String, f64>>;

    /// Write the propagated trust scores into `users`
    fn apply(&self, users: &mut Users, vouches: &Vouches) -> ScoringResult<()> {
        let trusts = self.propagate(users, vouches)?;
        for user in users.iter_mut() {
            if let Some(&trust) = trusts.get(&user.username) {
                user.trust_score = Some(trust);
            }
        }
        Ok(())
    }
}

/// Keeps explicit trust scores; users without one get zero
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoPropagation;

impl TrustPropagation for NoPropagation {
    fn propagate(&self, users: &Users, _vouches: &Vouches) -> ScoringResult<BTreeMap<String, f64>> {
        Ok(users
            .iter()
            .map(|u| (u.username.clone(), u.trust()))
            .collect())
    }
}

/// Trust propagation selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrustConfig {
    /// Robustified PageRank
    LipschiTrust(LipschiTrust),
    /// Explicit trust scores only
    NoPropagation,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self::LipschiTrust(LipschiTrust::default())
    }
}

impl TrustPropagation for TrustConfig {
    fn propagate(&self, users: &Users, vouches: &Vouches) -> ScoringResult<BTreeMap<String, f64>> {
        match self {
            Self::LipschiTrust(lipschitrust) => lipschitrust.propagate(users, vouches),
            Self::NoPropagation => NoPropagation.propagate(users, vouches),
        }
    }
}

/// Prelude for trust module
pub mod prelude {
    pub use super::{LipschiTrust, NoPropagation, TrustConfig, TrustPropagation};
}
