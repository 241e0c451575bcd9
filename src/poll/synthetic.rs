//! Synthetic polls
//!
//! Users draw noisy comparisons of hidden true scores (Thurstone model),
//! which gives a ground truth to test and benchmark the pipeline against.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    Comparison, Comparisons, Entities, Entity, MadePublic, Poll, User, Users, Vouch, Vouches,
};
use crate::error::{PipelineError, ScoringResult};

/// Parameters of the generator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPollConfig {
    /// Number of users
    pub n_users: usize,
    /// Number of entities
    pub n_entities: usize,
    /// Comparisons per user and criterion
    pub n_comparisons_per_user: usize,
    /// Criteria
    pub criteria: Vec<String>,
    /// Standard deviation of the hidden scores
    pub score_std: f64,
    /// Standard deviation of the comparison noise
    pub noise_std: f64,
    /// Comparison scale
    pub value_max: f64,
    /// Number of pretrusted users
    pub n_pretrusted: usize,
    /// Vouches emitted per user
    pub n_vouches_per_user: usize,
    /// Set explicit trust 1 on every user instead of relying on vouches
    pub explicit_trust: bool,
    /// Probability that an evaluation is private
    pub private_rate: f64,
    /// Generator seed
    pub seed: u64,
}

impl Default for SyntheticPollConfig {
    fn default() -> Self {
        Self {
            n_users: 10,
            n_entities: 20,
            n_comparisons_per_user: 30,
            criteria: vec!["default".to_string()],
            score_std: 1.0,
            noise_std: 0.3,
            value_max: 10.0,
            n_pretrusted: 3,
            n_vouches_per_user: 2,
            explicit_trust: false,
            private_rate: 0.0,
            seed: 42,
        }
    }
}

/// A generated poll with the scores it was drawn from
#[derive(Clone, Debug)]
pub struct SyntheticPoll {
    /// Generated input tables
    pub poll: Poll,
    /// Hidden scores, entity → criterion → score
    pub true_scores: BTreeMap<String, BTreeMap<String, f64>>,
}

impl SyntheticPollConfig {
    /// Generate the poll
    pub fn generate(&self) -> ScoringResult<SyntheticPoll> {
        if self.n_entities < 2 {
            return Err(PipelineError::InvalidArgument(
                "synthetic polls need at least two entities".to_string(),
            ));
        }
        let score_law = Normal::new(0.0, self.score_std)
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))?;
        let noise_law = Normal::new(0.0, self.noise_std)
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let usernames: Vec<String> = (0..self.n_users).map(|i| format!("user_{:03}", i)).collect();
        let entity_names: Vec<String> = (0..self.n_entities)
            .map(|i| format!("entity_{:03}", i))
            .collect();

        let mut users = Users::new();
        for (i, username) in usernames.iter().enumerate() {
            let mut user = User::new(username.clone());
            if i < self.n_pretrusted {
                user = user.pretrusted();
            }
            if self.explicit_trust {
                user = user.with_trust(1.0);
            }
            users.insert(user)?;
        }
        let entities = Entities::from_rows(entity_names.iter().map(Entity::new))?;

        let mut vouches = Vouches::new();
        if self.n_users > 1 {
            for voucher in &usernames {
                let others: Vec<&String> = usernames.iter().filter(|u| *u != voucher).collect();
                for vouchee in others.choose_multiple(&mut rng, self.n_vouches_per_user) {
                    vouches.insert(Vouch::new(
                        voucher.clone(),
                        (*vouchee).clone(),
                        "Personhood",
                        1.0,
                    ))?;
                }
            }
        }

        let mut true_scores: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for entity in &entity_names {
            for criterion in &self.criteria {
                true_scores
                    .entry(entity.clone())
                    .or_default()
                    .insert(criterion.clone(), score_law.sample(&mut rng));
            }
        }

        let mut comparisons = Comparisons::new();
        let mut made_public = MadePublic::new();
        let n_pairs = self.n_entities * (self.n_entities - 1) / 2;
        for username in &usernames {
            for criterion in &self.criteria {
                let mut seen = std::collections::BTreeSet::new();
                let target = self.n_comparisons_per_user.min(n_pairs);
                while seen.len() < target {
                    let i = rng.gen_range(0..self.n_entities);
                    let j = rng.gen_range(0..self.n_entities);
                    if i == j || !seen.insert((i.min(j), i.max(j))) {
                        continue;
                    }
                    let (left, right) = (&entity_names[i], &entity_names[j]);
                    let diff = true_scores[left][criterion] - true_scores[right][criterion];
                    let noisy = (diff + noise_law.sample(&mut rng)).clamp(-1.0, 1.0);
                    let value = (noisy * self.value_max).round();
                    comparisons.insert(Comparison::new(
                        username.clone(),
                        criterion.clone(),
                        left.clone(),
                        right.clone(),
                        value,
                        self.value_max,
                    ))?;
                    for entity in [left, right] {
                        if self.private_rate > 0.0 && rng.gen_bool(self.private_rate.min(1.0)) {
                            made_public.set(username.clone(), entity.clone(), false);
                        }
                    }
                }
            }
        }

        let poll = Poll {
            users,
            entities,
            vouches,
            comparisons,
            made_public,
            ..Poll::default()
        };
        Ok(SyntheticPoll { poll, true_scores })
    }
}
