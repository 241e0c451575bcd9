//! Generalized Bradley-Terry preference learning
//!
//! Each user's comparisons (and ratings) on one criterion are turned into
//! latent scores by maximum a posteriori estimation under a Gaussian prior.
//! The uncertainty of every score is derived from the shape of the loss
//! around the minimizer.
//!
//! # Example
//!
//! ```rust
//! use collabscore::poll::{Comparison, Entities};
//! use collabscore::preference::GeneralizedBradleyTerry;
//!
//! let entities = Entities::from_names(&["a", "b"]).unwrap();
//! let comparison = Comparison::new("u", "quality", "a", "b", 1.0, 1.0);
//!
//! let gbt = GeneralizedBradleyTerry::default();
//! let fit = gbt.fit(&[&comparison], &[], &entities, None, None).unwrap();
//!
//! let a = fit.direct("a").unwrap();
//! let b = fit.direct("b").unwrap();
//! assert!(a.value() > b.value());
//! ```

use nalgebra::DVector;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::problem::{GbtProblem, PriorStds, ProblemSpec};
use super::root_law::RootLaw;
use crate::diagnostics::{Stage, TaskFailure};
use crate::error::{PipelineError, ScoringResult, SolverError};
use crate::model::{ModelBase, ScoringModel, UserModels};
use crate::pipeline::CancellationToken;
use crate::poll::{Comparison, Entities, Poll, Rating, User, Users};
use crate::score::Score;
use crate::solvers::{
    Minimizer, MinimizerConfig, Objective, UncertaintyConfig, UncertaintyEvaluator,
};

/// Generalized Bradley-Terry learner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralizedBradleyTerry {
    /// Prior standard deviation of direct scores
    pub prior_std_dev: f64,
    /// Prior standard deviation of rating thresholds
    pub threshold_prior_std_dev: f64,
    /// Prior standard deviation of category biases
    pub category_prior_std_dev: f64,
    /// Prior standard deviation of embedding parameters
    pub parameter_prior_std_dev: f64,
    /// Root law of comparisons without their own
    pub comparison_root_law: RootLaw,
    /// Root law of ratings without their own
    pub rating_root_law: RootLaw,
    /// Learn a direct score per entity
    pub direct: bool,
    /// Categories whose groups get a learned bias
    pub categories: Vec<String>,
    /// Learn a linear function of the entity embeddings
    pub use_embeddings: bool,
    /// MAP engine
    pub minimizer: MinimizerConfig,
    /// Uncertainty engine
    pub uncertainty: UncertaintyConfig,
}

impl Default for GeneralizedBradleyTerry {
    fn default() -> Self {
        Self {
            prior_std_dev: 7.0,
            threshold_prior_std_dev: 7.0,
            category_prior_std_dev: 7.0,
            parameter_prior_std_dev: 7.0,
            comparison_root_law: RootLaw::Uniform,
            rating_root_law: RootLaw::Uniform,
            direct: true,
            categories: Vec::new(),
            use_embeddings: false,
            minimizer: MinimizerConfig::default(),
            uncertainty: UncertaintyConfig::default(),
        }
    }
}

/// Scores learned for one (user, criterion)
#[derive(Clone, Debug, Default)]
pub struct GbtFit {
    /// Direct scores, sorted by entity
    pub directs: Vec<(String, Score)>,
    /// Rating thresholds, sorted by context
    pub thresholds: Vec<(String, Score)>,
    /// Category biases keyed `(category, group)`
    pub categories: Vec<((String, String), Score)>,
    /// Embedding parameters by coordinate
    pub parameters: Vec<(usize, Score)>,
    /// Loss at the minimizer
    pub loss: f64,
    /// Iterations of the minimizer
    pub iterations: usize,
}

impl GbtFit {
    /// Direct score of an entity
    pub fn direct(&self, entity: &str) -> Option<Score> {
        self.directs
            .iter()
            .find(|(e, _)| e == entity)
            .map(|(_, s)| *s)
    }

    /// Did the fit produce nothing?
    pub fn is_empty(&self) -> bool {
        self.directs.is_empty()
            && self.thresholds.is_empty()
            && self.categories.is_empty()
            && self.parameters.is_empty()
    }

    /// Write the learned scores of `criterion` into a model's base tables
    pub fn write_into(&self, model: &mut ScoringModel, criterion: &str) -> ScoringResult<()> {
        for (entity, score) in &self.directs {
            model.set_direct(entity, criterion, *score)?;
        }
        for ((category, group), score) in &self.categories {
            model
                .categories
                .set(&[category.as_str(), group.as_str(), criterion], *score)?;
        }
        for (coordinate, score) in &self.parameters {
            model
                .parameters
                .set(&[coordinate.to_string().as_str(), criterion], *score)?;
        }
        Ok(())
    }
}

/// Outcome of learning every user's models
#[derive(Clone, Debug, Default)]
pub struct LearningOutcome {
    /// Learned models
    pub user_models: UserModels,
    /// Learned thresholds `(username, criterion, context, score)`
    pub thresholds: Vec<(String, String, String, Score)>,
    /// Fits attempted
    pub n_fits: usize,
    /// Isolated failures
    pub failures: Vec<TaskFailure>,
}

impl LearningOutcome {
    /// Write the learned thresholds back to the users
    pub fn apply_thresholds(&self, users: &mut Users) {
        for (username, criterion, context, score) in &self.thresholds {
            if let Some(user) = users.get_mut(username) {
                user.rating_thresholds
                    .entry(criterion.clone())
                    .or_default()
                    .insert(context.clone(), *score);
            }
        }
    }
}

impl GeneralizedBradleyTerry {
    /// Create a learner with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prior standard deviation of direct scores
    pub fn with_prior_std_dev(mut self, prior_std_dev: f64) -> Self {
        self.prior_std_dev = prior_std_dev;
        self
    }

    /// Set the MAP engine
    pub fn with_minimizer(mut self, minimizer: MinimizerConfig) -> Self {
        self.minimizer = minimizer;
        self
    }

    /// Set the uncertainty engine
    pub fn with_uncertainty(mut self, uncertainty: UncertaintyConfig) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Set the default root law of comparisons
    pub fn with_root_law(mut self, root_law: RootLaw) -> Self {
        self.comparison_root_law = root_law;
        self
    }

    /// Learn biases for the groups of these categories
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Learn a linear function of the embeddings
    pub fn with_embeddings(mut self) -> Self {
        self.use_embeddings = true;
        self
    }

    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        let stds = [
            ("prior_std_dev", self.prior_std_dev),
            ("threshold_prior_std_dev", self.threshold_prior_std_dev),
            ("category_prior_std_dev", self.category_prior_std_dev),
            ("parameter_prior_std_dev", self.parameter_prior_std_dev),
        ];
        for (name, std) in stds {
            if !(std > 0.0) || !std.is_finite() {
                return Err(PipelineError::InvalidArgument(format!(
                    "{} must be positive, got {}",
                    name, std
                )));
            }
        }
        self.comparison_root_law
            .validate()
            .map_err(PipelineError::InvalidArgument)?;
        self.rating_root_law
            .validate()
            .map_err(PipelineError::InvalidArgument)?;
        if !self.direct && self.categories.is_empty() && !self.use_embeddings {
            return Err(PipelineError::InvalidArgument(
                "the model needs directs, categories or embeddings".to_string(),
            ));
        }
        Ok(())
    }

    /// Base of the models this learner produces
    pub fn model_base(&self) -> ModelBase {
        if self.direct && self.categories.is_empty() && !self.use_embeddings {
            ModelBase::Direct
        } else {
            ModelBase::Linear
        }
    }

    pub(crate) fn problem(
        &self,
        comparisons: &[&Comparison],
        ratings: &[&Rating],
        entities: &Entities,
    ) -> GbtProblem {
        let spec = ProblemSpec {
            direct: self.direct,
            categories: &self.categories,
            use_embeddings: self.use_embeddings,
            comparison_law: self.comparison_root_law,
            rating_law: self.rating_root_law,
            priors: PriorStds {
                directs: self.prior_std_dev,
                thresholds: self.threshold_prior_std_dev,
                categories: self.category_prior_std_dev,
                parameters: self.parameter_prior_std_dev,
            },
        };
        GbtProblem::build(comparisons, ratings, entities, &spec)
    }

    fn initial_point(
        problem: &GbtProblem,
        criterion: &str,
        init: Option<&ScoringModel>,
        user: Option<&User>,
    ) -> DVector<f64> {
        let mut x = DVector::zeros(problem.dimension());
        let defined = |s: Score| (!s.is_nan()).then(|| s.value());
        if let Some(model) = init {
            for name in problem.entity_names() {
                if let (Some(i), Some(v)) = (
                    problem.direct_index(name),
                    defined(model.directs.get(&[name.as_str(), criterion])),
                ) {
                    x[i] = v;
                }
            }
            for (category, group) in problem.category_groups() {
                let score = model
                    .categories
                    .get(&[category.as_str(), group.as_str(), criterion]);
                if let (Some(i), Some(v)) = (problem.category_index(category, group), defined(score))
                {
                    x[i] = v;
                }
            }
            for k in 0..problem.n_parameters() {
                let score = model.parameters.get(&[k.to_string().as_str(), criterion]);
                if let (Some(i), Some(v)) = (problem.parameter_index(k), defined(score)) {
                    x[i] = v;
                }
            }
        }
        if let Some(thresholds) = user.and_then(|u| u.rating_thresholds.get(criterion)) {
            for (context, score) in thresholds {
                if let (Some(i), Some(v)) = (problem.context_index(context), defined(*score)) {
                    x[i] = v;
                }
            }
        }
        x
    }

    /// Fit the scores of one user on one criterion
    ///
    /// `init` seeds the minimizer with a previous model and `user` with
    /// previously learned thresholds. No evaluation yields an empty fit.
    pub fn fit(
        &self,
        comparisons: &[&Comparison],
        ratings: &[&Rating],
        entities: &Entities,
        init: Option<(&ScoringModel, &str)>,
        user: Option<&User>,
    ) -> ScoringResult<GbtFit> {
        if comparisons.is_empty() && ratings.is_empty() {
            return Ok(GbtFit::default());
        }
        let criterion = comparisons
            .first()
            .map(|c| c.criterion.as_str())
            .or_else(|| ratings.first().map(|r| r.criterion.as_str()))
            .unwrap_or_default();
        let problem = self.problem(comparisons, ratings, entities);
        let x0 = Self::initial_point(
            &problem,
            criterion,
            init.and_then(|(m, c)| (c == criterion).then_some(m)),
            user,
        );

        let minimum = self.minimizer.minimize(&problem, x0)?;
        if minimum.x.iter().any(|v| !v.is_finite()) || !minimum.loss.is_finite() {
            return Err(SolverError::NonFinite("preference learning minimizer".to_string()).into());
        }
        let (lefts, rights) = self.uncertainty.evaluate(&problem, &minimum.x)?;
        let max_uncertainty = self.uncertainty.max_uncertainty();
        let score_at = |i: usize| Score::new(minimum.x[i], lefts[i], rights[i]);

        let mut fit = GbtFit {
            loss: minimum.loss,
            iterations: minimum.iterations,
            ..GbtFit::default()
        };
        for name in problem.entity_names() {
            if let Some(i) = problem.direct_index(name) {
                if lefts[i] >= max_uncertainty && rights[i] >= max_uncertainty {
                    continue;
                }
                fit.directs.push((name.clone(), score_at(i)?));
            }
        }
        for context in problem.contexts() {
            if let Some(i) = problem.context_index(context) {
                fit.thresholds.push((context.clone(), score_at(i)?));
            }
        }
        for (category, group) in problem.category_groups() {
            if let Some(i) = problem.category_index(category, group) {
                fit.categories
                    .push(((category.clone(), group.clone()), score_at(i)?));
            }
        }
        for k in 0..problem.n_parameters() {
            if let Some(i) = problem.parameter_index(k) {
                fit.parameters.push((k, score_at(i)?));
            }
        }
        Ok(fit)
    }

    /// Learn the models of every (user, criterion) of the poll
    ///
    /// Fits run in parallel on `pool` and are merged in (username,
    /// criterion) order. A fit that fails to converge is logged, recorded in
    /// the outcome and skipped; cancellation aborts the whole stage.
    pub fn learn(
        &self,
        poll: &Poll,
        previous: Option<&UserModels>,
        pool: &ThreadPool,
        cancel: &CancellationToken,
    ) -> ScoringResult<LearningOutcome> {
        let tasks: Vec<(String, String)> = poll.user_criteria().into_iter().collect();
        tracing::info!(n_fits = tasks.len(), "learning preference models");

        let results: Vec<(&str, &str, ScoringResult<GbtFit>)> = pool.install(|| {
            tasks
                .par_iter()
                .map(|(username, criterion)| {
                    if cancel.is_cancelled() {
                        return (username.as_str(), criterion.as_str(), Err(PipelineError::Cancelled));
                    }
                    let comparisons = poll.comparisons.of(username, criterion);
                    let ratings = poll.ratings.of(username, criterion);
                    let init = previous
                        .and_then(|models| models.get(username))
                        .map(|m| (m, criterion.as_str()));
                    let fit = self.fit(
                        &comparisons,
                        &ratings,
                        &poll.entities,
                        init,
                        poll.users.get(username),
                    );
                    (username.as_str(), criterion.as_str(), fit)
                })
                .collect()
        });
        cancel.check()?;

        let mut outcome = LearningOutcome {
            n_fits: tasks.len(),
            ..LearningOutcome::default()
        };
        let mut models: BTreeMap<&str, ScoringModel> = BTreeMap::new();
        for (username, criterion, result) in results {
            match result {
                Ok(fit) => {
                    tracing::debug!(
                        username,
                        criterion,
                        n_scores = fit.directs.len(),
                        iterations = fit.iterations,
                        "preference model fitted"
                    );
                    let model = models
                        .entry(username)
                        .or_insert_with(|| ScoringModel::new(self.model_base()));
                    fit.write_into(model, criterion)?;
                    for (context, score) in &fit.thresholds {
                        outcome.thresholds.push((
                            username.to_string(),
                            criterion.to_string(),
                            context.clone(),
                            *score,
                        ));
                    }
                }
                Err(e) if e.is_isolated() => {
                    tracing::warn!(username, criterion, error = %e, "preference learning failed, skipping");
                    outcome.failures.push(TaskFailure::new(
                        Stage::PreferenceLearning,
                        Some(username),
                        criterion,
                        &e,
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        for (username, model) in models {
            outcome.user_models.insert(username, model);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{Comparisons, Entity, Users};
    use crate::solvers::{CoordinateDescent, HessianDiagonal, Lbfgs};

    fn make_comparisons(rows: &[(&str, &str, f64)]) -> Vec<Comparison> {
        rows.iter()
            .map(|&(l, r, v)| Comparison::new("u", "c", l, r, v, 1.0))
            .collect()
    }

    fn refs(rows: &[Comparison]) -> Vec<&Comparison> {
        rows.iter().collect()
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn test_empty_fit() {
        let entities = Entities::from_names(&["a"]).unwrap();
        let fit = GeneralizedBradleyTerry::default()
            .fit(&[], &[], &entities, None, None)
            .unwrap();
        assert!(fit.is_empty());
    }

    #[test]
    fn test_single_comparison_is_stationary() {
        let entities = Entities::from_names(&["a", "b"]).unwrap();
        let rows = make_comparisons(&[("a", "b", 1.0)]);
        let gbt = GeneralizedBradleyTerry::default();
        let fit = gbt.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        let a = fit.direct("a").unwrap().value();
        let b = fit.direct("b").unwrap().value();
        assert!(a > 0.0 && b < 0.0);
        assert!((a + b).abs() < 1e-4);
        // optimality of the difference: Ψ′(Δ) − 1 + Δ / (2σ²) = 0
        let delta = a - b;
        let residual = RootLaw::Uniform.cgf_derivative(delta) - 1.0 + delta / 98.0;
        assert!(residual.abs() < 1e-4);
    }

    #[test]
    fn test_engines_agree_on_chain() {
        let entities = Entities::from_names(&["a", "b", "c", "d"]).unwrap();
        let rows = make_comparisons(&[
            ("a", "b", 0.5),
            ("b", "c", 0.2),
            ("c", "d", -0.4),
            ("a", "d", 1.0),
        ]);
        let lbfgs = GeneralizedBradleyTerry::default()
            .with_minimizer(MinimizerConfig::Lbfgs(Lbfgs::new(1e-8, 500)));
        let cd = GeneralizedBradleyTerry::default()
            .with_minimizer(MinimizerConfig::CoordinateDescent(CoordinateDescent::new(1e-8, 10_000)));
        let f1 = lbfgs.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        let f2 = cd.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        for ((e1, s1), (e2, s2)) in f1.directs.iter().zip(&f2.directs) {
            assert_eq!(e1, e2);
            assert!((s1.value() - s2.value()).abs() < 1e-4, "{}", e1);
        }
    }

    #[test]
    fn test_uncertainty_reaches_nll_increase() {
        let entities = Entities::from_names(&["a", "b", "c"]).unwrap();
        let rows = make_comparisons(&[("a", "b", 0.5), ("b", "c", 0.5), ("a", "c", 1.0)]);
        let gbt = GeneralizedBradleyTerry::default();
        let fit = gbt.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        let c = refs(&rows);
        let problem = gbt.problem(&c, &[], &entities);
        let x = DVector::from_iterator(3, fit.directs.iter().map(|(_, s)| s.value()));
        for (i, (_, score)) in fit.directs.iter().enumerate() {
            let base = problem.translated_nll(&x, i, 0.0);
            for (delta, unc) in [
                (-score.left_unc(), score.left_unc()),
                (score.right_unc(), score.right_unc()),
            ] {
                if unc == 1e3 {
                    continue;
                }
                let moved = problem.translated_nll(&x, i, delta);
                assert!((moved - base - 1.0).abs() < 1e-2, "{} at {}", moved - base, delta);
            }
        }
    }

    #[test]
    fn test_single_full_comparison_is_unbounded_on_one_side() {
        let entities = Entities::from_names(&["a", "b"]).unwrap();
        let rows = make_comparisons(&[("a", "b", 1.0)]);
        let fit = GeneralizedBradleyTerry::default()
            .fit(&refs(&rows), &[], &entities, None, None)
            .unwrap();
        let a = fit.direct("a").unwrap();
        let b = fit.direct("b").unwrap();
        assert_eq!(a.right_unc(), 1e3);
        assert!(a.left_unc() < 1e3);
        assert_eq!(b.left_unc(), 1e3);
        assert!(b.right_unc() < 1e3);
    }

    #[test]
    fn test_hessian_uncertainty_is_symmetric() {
        let entities = Entities::from_names(&["a", "b"]).unwrap();
        let rows = make_comparisons(&[("a", "b", 0.3)]);
        let gbt = GeneralizedBradleyTerry::default()
            .with_uncertainty(UncertaintyConfig::HessianDiagonal(HessianDiagonal::default()));
        let fit = gbt.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        let a = fit.direct("a").unwrap();
        assert_eq!(a.left_unc(), a.right_unc());
        assert!(a.left_unc() > 0.0);
    }

    #[test]
    fn test_ratings_learn_threshold() {
        let entities = Entities::from_names(&["a", "b"]).unwrap();
        let r1 = Rating::new("u", "c", "a", 9.0, 0.0, 10.0);
        let r2 = Rating::new("u", "c", "b", 1.0, 0.0, 10.0);
        let fit = GeneralizedBradleyTerry::default()
            .fit(&[], &[&r1, &r2], &entities, None, None)
            .unwrap();
        assert_eq!(fit.thresholds.len(), 1);
        let a = fit.direct("a").unwrap().value();
        let b = fit.direct("b").unwrap().value();
        let threshold = fit.thresholds[0].1.value();
        assert!(a > threshold && threshold > b);
    }

    #[test]
    fn test_category_bias() {
        let entities = Entities::from_rows(vec![
            Entity::new("a").with_category("lang", "fr"),
            Entity::new("b").with_category("lang", "fr"),
            Entity::new("c").with_category("lang", "en"),
            Entity::new("d").with_category("lang", "en"),
        ])
        .unwrap();
        let rows = make_comparisons(&[("a", "c", 1.0), ("b", "d", 1.0), ("a", "d", 1.0)]);
        let gbt = GeneralizedBradleyTerry::default().with_categories(vec!["lang".to_string()]);
        assert_eq!(gbt.model_base(), ModelBase::Linear);
        let fit = gbt.fit(&refs(&rows), &[], &entities, None, None).unwrap();
        let bias = |g: &str| {
            fit.categories
                .iter()
                .find(|((_, group), _)| group == g)
                .map(|(_, s)| s.value())
                .unwrap()
        };
        assert!(bias("fr") > bias("en"));
    }

    #[test]
    fn test_learn_merges_sorted_and_writes_thresholds() {
        let mut users = Users::from_rows(vec![User::new("u"), User::new("v")]).unwrap();
        let entities = Entities::from_names(&["a", "b", "c"]).unwrap();
        let comparisons = Comparisons::from_rows(vec![
            Comparison::new("v", "c", "a", "b", 1.0, 1.0),
            Comparison::new("u", "c", "b", "c", 1.0, 1.0),
        ])
        .unwrap();
        let ratings = crate::poll::Ratings::from_rows(vec![Rating::new("u", "c", "a", 3.0, 0.0, 4.0)])
            .unwrap();
        let poll = Poll::new(users.clone(), entities)
            .with_comparisons(comparisons)
            .with_ratings(ratings);
        let outcome = GeneralizedBradleyTerry::default()
            .learn(&poll, None, &pool(), &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.n_fits, 2);
        assert!(outcome.failures.is_empty());
        let names: Vec<_> = outcome.user_models.usernames().collect();
        assert_eq!(names, vec!["u", "v"]);
        outcome.apply_thresholds(&mut users);
        assert!(users.get("u").unwrap().rating_thresholds["c"].contains_key(""));
    }

    #[test]
    fn test_learn_isolates_convergence_failures() {
        let users = Users::from_rows(vec![User::new("u")]).unwrap();
        let entities = Entities::from_names(&["a", "b", "c"]).unwrap();
        let comparisons = Comparisons::from_rows(vec![
            Comparison::new("u", "c", "a", "b", 1.0, 1.0),
            Comparison::new("u", "c", "b", "c", 0.5, 1.0),
        ])
        .unwrap();
        let poll = Poll::new(users, entities).with_comparisons(comparisons);
        let gbt = GeneralizedBradleyTerry::default()
            .with_minimizer(MinimizerConfig::Lbfgs(Lbfgs::new(1e-14, 1)));
        let outcome = gbt
            .learn(&poll, None, &pool(), &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.user_models.is_empty());
    }

    #[test]
    fn test_learn_cancelled() {
        let poll = Poll::new(
            Users::from_rows(vec![User::new("u")]).unwrap(),
            Entities::from_names(&["a", "b"]).unwrap(),
        )
        .with_comparisons(
            Comparisons::from_rows(vec![Comparison::new("u", "c", "a", "b", 1.0, 1.0)]).unwrap(),
        );
        let token = CancellationToken::new();
        token.cancel();
        let result = GeneralizedBradleyTerry::default().learn(&poll, None, &pool(), &token);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
