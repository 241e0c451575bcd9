//! Mehestan collaborative scaling
//!
//! Users express preferences on their own scale. Mehestan estimates, for
//! every user, a multiplier and a translation that bring their scores onto
//! a scale shared with the scalers:
//!
//! 1. scalers are selected by trusted activity;
//! 2. each scaler is compared with every scaler, including itself, through
//!    the ratios of score differences on commonly scored entities;
//! 3. the per-pair estimates are aggregated by Lipschitz-resilient medians
//!    weighted by the scalers' trust;
//! 4. every other user is fitted the same way against the scaled scalers.
//!
//! The resulting scales are appended to each model as a new Scale layer.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::scalers::{compute_activities, select_scalers};
use crate::diagnostics::{Stage, TaskFailure};
use crate::error::{PipelineError, ScoringResult};
use crate::model::UserModels;
use crate::pipeline::CancellationToken;
use crate::poll::{Entities, MadePublic, Users};
use crate::primitives::{lipschitz_resilient_mean, qr_median, qr_uncertainty, Sample};
use crate::score::Score;

type UserScores = BTreeMap<String, Score>;

/// Mehestan settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mehestan {
    /// Resilience of the per-user aggregation across scalers
    pub lipschitz: f64,
    /// Minimal activity of a scaler
    pub min_activity: f64,
    /// Maximal number of scalers
    pub n_scalers_max: usize,
    /// Weight of private scores
    pub privacy_penalty: f64,
    /// Resilience of the aggregation over one pair of users
    pub user_comparison_lipschitz: f64,
    /// Norm used to damp the multipliers of users with large scores
    pub p_norm_for_multiplicative_resilience: f64,
    /// Common entities above which pairs are sampled
    pub n_entity_to_fully_compare_max: usize,
    /// Sampled pairs of entities per pair of users
    pub n_diffs_sample_max: usize,
    /// Root-finding tolerance
    pub error: f64,
}

impl Default for Mehestan {
    fn default() -> Self {
        Self {
            lipschitz: 0.1,
            min_activity: 10.0,
            n_scalers_max: 100,
            privacy_penalty: 0.5,
            user_comparison_lipschitz: 10.0,
            p_norm_for_multiplicative_resilience: 4.0,
            n_entity_to_fully_compare_max: 100,
            n_diffs_sample_max: 1000,
            error: 1e-5,
        }
    }
}

/// Scales found for one criterion
#[derive(Clone, Debug, Default)]
pub struct ScalingOutcome {
    /// Activity of every modelled user
    pub activities: BTreeMap<String, f64>,
    /// Selected scalers, sorted
    pub scalers: Vec<String>,
    /// `(multiplier, translation)` of every scaled user
    pub scales: BTreeMap<String, (Score, Score)>,
    /// Users left unscaled after an isolated failure
    pub failures: Vec<TaskFailure>,
}

impl ScalingOutcome {
    /// Record activities and scaler flags on the users
    pub fn apply(&self, users: &mut Users, criterion: &str) {
        for user in users.iter_mut() {
            let is_scaler = self.scalers.binary_search(&user.username).is_ok();
            user.is_scaler.insert(criterion.to_string(), is_scaler);
            if let Some(&activity) = self.activities.get(&user.username) {
                user.activity.insert(criterion.to_string(), activity);
            }
        }
    }
}

/// Reference user a scalee is compared with
struct Reference<'a> {
    username: &'a str,
    trust: f64,
    scores: &'a UserScores,
    multiplier: Option<Score>,
}

impl Mehestan {
    /// Set the minimal activity of scalers
    pub fn with_min_activity(mut self, min_activity: f64) -> Self {
        self.min_activity = min_activity;
        self
    }

    /// Set the resilience of the per-user aggregation
    pub fn with_lipschitz(mut self, lipschitz: f64) -> Self {
        self.lipschitz = lipschitz;
        self
    }

    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        let positives = [
            ("lipschitz", self.lipschitz),
            ("user_comparison_lipschitz", self.user_comparison_lipschitz),
            (
                "p_norm_for_multiplicative_resilience",
                self.p_norm_for_multiplicative_resilience,
            ),
            ("error", self.error),
        ];
        for (name, value) in positives {
            if !(value > 0.0) {
                return Err(PipelineError::InvalidArgument(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.privacy_penalty) {
            return Err(PipelineError::InvalidArgument(format!(
                "privacy_penalty must be in [0, 1], got {}",
                self.privacy_penalty
            )));
        }
        Ok(())
    }

    /// Scale the models of `criterion`, writing the scales at `height`
    #[allow(clippy::too_many_arguments)]
    pub fn scale(
        &self,
        models: &mut UserModels,
        users: &Users,
        entities: &Entities,
        made_public: &MadePublic,
        criterion: &str,
        height: usize,
        seed: u64,
        pool: &ThreadPool,
        cancel: &CancellationToken,
    ) -> ScoringResult<ScalingOutcome> {
        self.validate()?;
        let activities = compute_activities(
            models,
            users,
            entities,
            made_public,
            self.privacy_penalty,
            criterion,
        );
        let scalers = select_scalers(&activities, self.n_scalers_max, self.min_activity);
        if scalers.is_empty() {
            tracing::warn!(criterion, "no user qualifies as a scaler, scaling skipped");
            return Ok(ScalingOutcome {
                activities,
                ..ScalingOutcome::default()
            });
        }
        tracing::debug!(criterion, n_scalers = scalers.len(), "scalers selected");

        let scores: BTreeMap<String, UserScores> = models
            .evaluate_all(entities, criterion)
            .into_iter()
            .filter(|(_, s)| !s.is_empty())
            .collect();
        let index_of: BTreeMap<&str, u64> = scores
            .keys()
            .enumerate()
            .map(|(i, u)| (u.as_str(), i as u64))
            .collect();
        let is_scaler = |u: &str| scalers.binary_search_by(|s| s.as_str().cmp(u)).is_ok();
        let mut failures = Vec::new();
        let mut scales: BTreeMap<String, (Score, Score)> = BTreeMap::new();

        // Scalers against scalers, themselves included
        let scaler_names: Vec<&str> = scores
            .keys()
            .map(String::as_str)
            .filter(|u| is_scaler(*u))
            .collect();
        let raw_references: Vec<Reference<'_>> = scaler_names
            .iter()
            .map(|&u| Reference {
                username: u,
                trust: users.trust(u),
                scores: &scores[u],
                multiplier: None,
            })
            .collect();
        let multipliers = self.run(pool, cancel, &scaler_names, |u| {
            self.multiplier(u, &scores[u], &raw_references, made_public, seed, &index_of)
        })?;
        let mut scaler_multipliers: BTreeMap<&str, Score> = BTreeMap::new();
        for (&u, result) in scaler_names.iter().zip(multipliers) {
            match result {
                Ok(m) => {
                    scaler_multipliers.insert(u, m);
                }
                Err(e) => record(&mut failures, u, criterion, e)?,
            }
        }

        let multiplied_references: Vec<Reference<'_>> = raw_references
            .iter()
            .filter_map(|r| {
                scaler_multipliers.get(r.username).map(|&m| Reference {
                    multiplier: Some(m),
                    ..*r
                })
            })
            .collect();
        let solved: Vec<&str> = scaler_multipliers.keys().copied().collect();
        let translations = self.run(pool, cancel, &solved, |u| {
            self.translation(
                u,
                &scores[u],
                scaler_multipliers[u],
                &multiplied_references,
                made_public,
            )
        })?;
        for (&u, result) in solved.iter().zip(translations) {
            match result {
                Ok(t) => {
                    scales.insert(u.to_string(), (scaler_multipliers[u], t));
                }
                Err(e) => record(&mut failures, u, criterion, e)?,
            }
        }

        // Everyone else against the scaled scalers
        let scaled_scores: BTreeMap<String, UserScores> = scales
            .iter()
            .map(|(u, (m, t))| {
                let scaled = scores[u.as_str()]
                    .iter()
                    .map(|(e, s)| (e.clone(), *m * *s + *t))
                    .collect();
                (u.clone(), scaled)
            })
            .collect();
        let scaled_references: Vec<Reference<'_>> = scaled_scores
            .iter()
            .map(|(u, s)| Reference {
                username: u.as_str(),
                trust: users.trust(u),
                scores: s,
                multiplier: None,
            })
            .collect();
        let nonscalers: Vec<&str> = scores
            .keys()
            .map(String::as_str)
            .filter(|u| !is_scaler(*u))
            .collect();
        let nonscaler_scales = self.run(pool, cancel, &nonscalers, |u| {
            let m = self.multiplier(u, &scores[u], &scaled_references, made_public, seed, &index_of)?;
            let t = self.translation(u, &scores[u], m, &scaled_references, made_public)?;
            Ok((m, t))
        })?;
        for (&u, result) in nonscalers.iter().zip(nonscaler_scales) {
            match result {
                Ok(scale) => {
                    scales.insert(u.to_string(), scale);
                }
                Err(e) => record(&mut failures, u, criterion, e)?,
            }
        }

        for (username, (m, t)) in &scales {
            models
                .model_mut(username)
                .set_scale(height, criterion, *m, *t)?;
        }
        tracing::debug!(criterion, n_scaled = scales.len(), height, "scales written");
        Ok(ScalingOutcome {
            activities,
            scalers,
            scales,
            failures,
        })
    }

    /// Run one task per user on the pool, results in input order
    fn run<T, F>(
        &self,
        pool: &ThreadPool,
        cancel: &CancellationToken,
        usernames: &[&str],
        task: F,
    ) -> ScoringResult<Vec<ScoringResult<T>>>
    where
        T: Send,
        F: Fn(&str) -> ScoringResult<T> + Sync,
    {
        let results: Vec<ScoringResult<T>> = pool.install(|| {
            usernames
                .par_iter()
                .map(|&u| {
                    cancel.check()?;
                    task(u)
                })
                .collect()
        });
        cancel.check()?;
        Ok(results)
    }

    fn model_norm(&self, username: &str, scores: &UserScores, made_public: &MadePublic) -> f64 {
        let p = self.p_norm_for_multiplicative_resilience;
        let (mut weight_sum, mut weighted_sum) = (0.0, 0.0);
        for (entity, score) in scores {
            let w = made_public.penalty(self.privacy_penalty, username, entity);
            weight_sum += w;
            weighted_sum += w * score.value().abs().powf(p);
        }
        if weight_sum <= 0.0 {
            return 1.0;
        }
        (weighted_sum / weight_sum).powf(1.0 / p)
    }

    /// Unordered pairs of `n` items, all of them or a seeded sample
    fn entity_pairs(&self, n: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
        let all = |n: usize| {
            (0..n)
                .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
                .collect::<Vec<_>>()
        };
        if n <= self.n_entity_to_fully_compare_max {
            return all(n);
        }
        let n_pairs = n * (n - 1) / 2;
        if self.n_diffs_sample_max >= n_pairs {
            return all(n);
        }
        let mut sampled: Vec<usize> = index::sample(rng, n_pairs, self.n_diffs_sample_max).into_vec();
        sampled.sort_unstable();
        sampled
            .into_iter()
            .map(|mut k| {
                let mut i = 0;
                while k >= n - 1 - i {
                    k -= n - 1 - i;
                    i += 1;
                }
                (i, i + 1 + k)
            })
            .collect()
    }

    /// Multiplier of `username` against the references
    fn multiplier(
        &self,
        username: &str,
        scores: &UserScores,
        references: &[Reference<'_>],
        made_public: &MadePublic,
        seed: u64,
        index_of: &BTreeMap<&str, u64>,
    ) -> ScoringResult<Score> {
        let mut per_reference = Sample::new();
        for reference in references {
            if reference.username == username {
                per_reference.push(Score::certain(1.0), reference.trust);
                continue;
            }
            let common: Vec<&str> = scores
                .keys()
                .map(String::as_str)
                .filter(|e| reference.scores.contains_key(*e))
                .collect();
            if common.len() < 2 {
                continue;
            }
            let pair_seed = seed
                ^ (index_of.get(username).copied().unwrap_or(0) << 32)
                ^ index_of.get(reference.username).copied().unwrap_or(0);
            let mut rng = StdRng::seed_from_u64(pair_seed);

            let mut ratios = Sample::new();
            for (i, j) in self.entity_pairs(common.len(), &mut rng) {
                let (e, f) = (common[i], common[j]);
                let own = scores[e] - scores[f];
                let theirs = reference.scores[e] - reference.scores[f];
                let weight = made_public.penalty(self.privacy_penalty, reference.username, e)
                    * made_public.penalty(self.privacy_penalty, reference.username, f);
                ratios.push((theirs / own).abs(), weight);
            }
            if ratios.is_empty() {
                continue;
            }
            let ratio = qr_median(self.user_comparison_lipschitz, &ratios, 0.0, self.error)?;
            let uncertainty = qr_uncertainty(
                self.user_comparison_lipschitz,
                &ratios,
                1.0,
                self.error,
                Some(ratio),
            )?;
            per_reference.push(Score::symmetric(ratio, uncertainty), reference.trust);
        }

        let norm = self.model_norm(username, scores, made_public);
        let lipschitz = self.lipschitz / (8.0 * (1e-9 + norm));
        let value = qr_median(lipschitz, &per_reference, 1.0, self.error)?;
        let uncertainty = qr_uncertainty(lipschitz, &per_reference, 0.5, self.error, Some(value))?;
        Ok(Score::symmetric(value, uncertainty))
    }

    /// Translation of `username`, already multiplied by `multiplier`
    fn translation(
        &self,
        username: &str,
        scores: &UserScores,
        multiplier: Score,
        references: &[Reference<'_>],
        made_public: &MadePublic,
    ) -> ScoringResult<Score> {
        let mut per_reference = Sample::new();
        for reference in references {
            if reference.username == username {
                per_reference.push(Score::certain(0.0), reference.trust);
                continue;
            }
            let mut diffs = Sample::new();
            for (entity, own) in scores {
                let Some(theirs) = reference.scores.get(entity) else {
                    continue;
                };
                let theirs = reference.multiplier.map_or(*theirs, |m| m * *theirs);
                let weight = made_public.penalty(self.privacy_penalty, username, entity)
                    * made_public.penalty(self.privacy_penalty, reference.username, entity);
                diffs.push(theirs - multiplier * *own, weight);
            }
            if diffs.is_empty() {
                continue;
            }
            let diff = lipschitz_resilient_mean(self.user_comparison_lipschitz, &diffs, 0.0, self.error)?;
            let uncertainty = qr_uncertainty(self.user_comparison_lipschitz, &diffs, 1.0, self.error, None)?;
            per_reference.push(Score::symmetric(diff, uncertainty), reference.trust);
        }

        let lipschitz = self.lipschitz / 8.0;
        let value = qr_median(lipschitz, &per_reference, 0.0, self.error)?;
        let uncertainty = qr_uncertainty(lipschitz, &per_reference, 1.0, self.error, Some(value))?;
        Ok(Score::symmetric(value, uncertainty))
    }
}

/// Keep an isolated failure, propagate anything else
fn record(
    failures: &mut Vec<TaskFailure>,
    username: &str,
    criterion: &str,
    error: PipelineError,
) -> ScoringResult<()> {
    if !error.is_isolated() {
        return Err(error);
    }
    tracing::warn!(username, criterion, error = %error, "scaling failed, user left unscaled");
    failures.push(TaskFailure::new(Stage::Scaling, Some(username), criterion, &error));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoringModel;
    use crate::poll::User;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn models_from(rows: &[(&str, &[(&str, f64)])]) -> UserModels {
        let mut models = UserModels::new();
        for (username, scores) in rows {
            let mut model = ScoringModel::direct();
            for (entity, value) in scores.iter() {
                model
                    .set_direct(entity, "q", Score::new(*value, 0.1, 0.1).unwrap())
                    .unwrap();
            }
            models.insert(*username, model);
        }
        models
    }

    fn setup(names: &[&str]) -> (Users, Entities) {
        let users = Users::from_rows(names.iter().map(|u| User::new(*u).with_trust(1.0))).unwrap();
        let entities = Entities::from_names(&["a", "b", "c", "d"]).unwrap();
        (users, entities)
    }

    const SCORES: [(&str, f64); 4] = [("a", 3.0), ("b", 1.0), ("c", -1.0), ("d", -3.0)];

    #[test]
    fn test_identical_models_get_identity_scales() {
        let (users, entities) = setup(&["u", "v", "w"]);
        let mut models = models_from(&[("u", &SCORES), ("v", &SCORES), ("w", &SCORES)]);
        let outcome = Mehestan::default()
            .with_min_activity(1.0)
            .scale(
                &mut models,
                &users,
                &entities,
                &MadePublic::new(),
                "q",
                0,
                42,
                &pool(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(outcome.scalers, vec!["u", "v", "w"]);
        for (m, t) in outcome.scales.values() {
            assert!((m.value() - 1.0).abs() < 1e-3);
            assert!(t.value().abs() < 1e-3);
        }
        let model = models.get("u").unwrap();
        assert_eq!(model.height(), 1);
    }

    #[test]
    fn test_agreeing_scalers_pull_outlier() {
        let names = ["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "x"];
        let (users, entities) = setup(&names);
        let doubled: Vec<(&str, f64)> = SCORES.iter().map(|(e, v)| (*e, 2.0 * v)).collect();
        let mut rows: Vec<(&str, &[(&str, f64)])> =
            names[..8].iter().map(|u| (*u, &SCORES[..])).collect();
        rows.push(("x", &doubled));
        let mut models = models_from(&rows);
        let outcome = Mehestan::default()
            .with_min_activity(1.0)
            .with_lipschitz(100.0)
            .scale(
                &mut models,
                &users,
                &entities,
                &MadePublic::new(),
                "q",
                0,
                42,
                &pool(),
                &CancellationToken::new(),
            )
            .unwrap();
        let (m, _) = outcome.scales["x"];
        assert!(m.value() < 0.75, "multiplier {}", m.value());
        let before: f64 = 2.0 * 3.0 - 3.0;
        let entity = entities.get("a").unwrap();
        let after = models.score("x", entity, "q").value() - 3.0;
        assert!(after.abs() < before.abs());
    }

    #[test]
    fn test_no_scaler_leaves_models_alone() {
        let (users, entities) = setup(&["u"]);
        let mut models = models_from(&[("u", &SCORES)]);
        let outcome = Mehestan::default()
            .scale(
                &mut models,
                &users,
                &entities,
                &MadePublic::new(),
                "q",
                0,
                42,
                &pool(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(outcome.scalers.is_empty());
        assert!(outcome.scales.is_empty());
        assert_eq!(models.get("u").unwrap().height(), 0);
    }

    #[test]
    fn test_nonscaler_is_scaled() {
        let (users, entities) = setup(&["u", "v", "n"]);
        let few: Vec<(&str, f64)> = vec![("a", 1.0), ("d", -1.0)];
        let mut models = models_from(&[("u", &SCORES), ("v", &SCORES), ("n", &few)]);
        let mut users = users;
        let outcome = Mehestan::default()
            .with_min_activity(3.0)
            .scale(
                &mut models,
                &users,
                &entities,
                &MadePublic::new(),
                "q",
                0,
                7,
                &pool(),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(outcome.scalers, vec!["u", "v"]);
        assert!(outcome.scales.contains_key("n"));
        outcome.apply(&mut users, "q");
        assert!(!users.get("n").unwrap().is_scaler_for("q"));
        assert!(users.get("u").unwrap().is_scaler_for("q"));
    }

    #[test]
    fn test_sampled_pairs_are_distinct_and_seeded() {
        let mehestan = Mehestan {
            n_entity_to_fully_compare_max: 5,
            n_diffs_sample_max: 20,
            ..Mehestan::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let pairs = mehestan.entity_pairs(30, &mut rng);
        assert_eq!(pairs.len(), 20);
        assert!(pairs.iter().all(|(i, j)| i < j && *j < 30));
        let mut dedup = pairs.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), 20);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pairs, mehestan.entity_pairs(30, &mut rng));
        assert_eq!(mehestan.entity_pairs(4, &mut rng).len(), 6);
    }

    #[test]
    fn test_cancelled() {
        let (users, entities) = setup(&["u", "v"]);
        let mut models = models_from(&[("u", &SCORES), ("v", &SCORES)]);
        let token = CancellationToken::new();
        token.cancel();
        let result = Mehestan::default().with_min_activity(1.0).scale(
            &mut models,
            &users,
            &entities,
            &MadePublic::new(),
            "q",
            0,
            42,
            &pool(),
            &token,
        );
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
