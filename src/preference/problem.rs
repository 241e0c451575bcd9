//! Loss of one (user, criterion) fit
//!
//! Variables are laid out as `[directs | thresholds | category biases |
//! embedding parameters]`. Each comparison (and each rating, seen as a
//! comparison of the entity with a threshold of its context) is a sparse
//! linear form `Δ = Σ coef·x[var]` of the variables and contributes
//! `Ψ(Δ) − c̃·Δ` to the loss, where `c̃` is the normalized comparison and a
//! positive `c̃` favors the left side.

use nalgebra::DVector;
use std::collections::{BTreeMap, BTreeSet};

use super::root_law::RootLaw;
use crate::poll::{Comparison, Entities, Rating};
use crate::solvers::Objective;

/// Prior standard deviations of each kind of variable
#[derive(Clone, Copy, Debug)]
pub(crate) struct PriorStds {
    pub directs: f64,
    pub thresholds: f64,
    pub categories: f64,
    pub parameters: f64,
}

/// Structure of the model being fitted
#[derive(Clone, Debug)]
pub(crate) struct ProblemSpec<'a> {
    pub direct: bool,
    pub categories: &'a [String],
    pub use_embeddings: bool,
    pub comparison_law: RootLaw,
    pub rating_law: RootLaw,
    pub priors: PriorStds,
}

#[derive(Clone, Debug)]
struct Observation {
    terms: Vec<(usize, f64)>,
    value: f64,
    law: RootLaw,
}

impl Observation {
    fn diff(&self, x: &DVector<f64>) -> f64 {
        self.terms.iter().map(|&(var, coef)| coef * x[var]).sum()
    }

    fn nll(&self, diff: f64) -> f64 {
        self.law.cgf(diff) - self.value * diff
    }

    fn nll_derivative(&self, diff: f64) -> f64 {
        self.law.cgf_derivative(diff) - self.value
    }
}

/// Generalized Bradley-Terry loss over one user's evaluations
#[derive(Clone, Debug)]
pub struct GbtProblem {
    entity_names: Vec<String>,
    contexts: Vec<String>,
    category_groups: Vec<(String, String)>,
    n_parameters: usize,
    direct: bool,
    threshold_offset: usize,
    category_offset: usize,
    parameter_offset: usize,
    prior_inv_vars: DVector<f64>,
    observations: Vec<Observation>,
    incidence: Vec<Vec<(usize, f64)>>,
}

impl GbtProblem {
    pub(crate) fn build(
        comparisons: &[&Comparison],
        ratings: &[&Rating],
        entities: &Entities,
        spec: &ProblemSpec<'_>,
    ) -> Self {
        let names: BTreeSet<&str> = comparisons
            .iter()
            .flat_map(|c| [c.left.as_str(), c.right.as_str()])
            .chain(ratings.iter().map(|r| r.entity.as_str()))
            .collect();
        let entity_names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let entity_index: BTreeMap<&str, usize> =
            names.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let contexts: Vec<String> = ratings
            .iter()
            .map(|r| r.context.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let category_groups: Vec<(String, String)> = spec
            .categories
            .iter()
            .flat_map(|category| {
                entity_names
                    .iter()
                    .filter_map(|name| entities.get(name)?.categories.get(category))
                    .map(|group| (category.clone(), group.clone()))
                    .collect::<BTreeSet<_>>()
            })
            .collect();
        let n_parameters = if spec.use_embeddings {
            entities.embedding_dimension().unwrap_or(0)
        } else {
            0
        };

        let n_directs = if spec.direct { entity_names.len() } else { 0 };
        let threshold_offset = n_directs;
        let category_offset = threshold_offset + contexts.len();
        let parameter_offset = category_offset + category_groups.len();
        let dimension = parameter_offset + n_parameters;

        let mut prior_inv_vars = DVector::zeros(dimension);
        for i in 0..dimension {
            let std = if i < threshold_offset {
                spec.priors.directs
            } else if i < category_offset {
                spec.priors.thresholds
            } else if i < parameter_offset {
                spec.priors.categories
            } else {
                spec.priors.parameters
            };
            prior_inv_vars[i] = 1.0 / (std * std);
        }

        let mut problem = Self {
            entity_names,
            contexts,
            category_groups,
            n_parameters,
            direct: spec.direct,
            threshold_offset,
            category_offset,
            parameter_offset,
            prior_inv_vars,
            observations: Vec::new(),
            incidence: vec![Vec::new(); dimension],
        };

        let entity_terms: Vec<Vec<(usize, f64)>> = problem
            .entity_names
            .iter()
            .enumerate()
            .map(|(i, name)| problem.entity_terms(i, name, entities))
            .collect();

        for c in comparisons {
            let law = c.root_law.unwrap_or(spec.comparison_law);
            let (l, r) = (entity_index[c.left.as_str()], entity_index[c.right.as_str()]);
            problem.push_observation(
                &entity_terms[l],
                &entity_terms[r],
                law.normalize_comparison(c.value, c.value_max),
                law,
            );
        }
        for rating in ratings {
            let law = rating.root_law.unwrap_or(spec.rating_law);
            let e = entity_index[rating.entity.as_str()];
            let threshold = problem.threshold_index(&rating.context);
            problem.push_observation(
                &entity_terms[e],
                &[(threshold, 1.0)],
                law.normalize_rating(rating.value, rating.min, rating.max),
                law,
            );
        }
        problem
    }

    fn entity_terms(&self, index: usize, name: &str, entities: &Entities) -> Vec<(usize, f64)> {
        let mut terms = Vec::new();
        if self.direct {
            terms.push((index, 1.0));
        }
        if let Some(entity) = entities.get(name) {
            for (k, (category, group)) in self.category_groups.iter().enumerate() {
                if entity.categories.get(category) == Some(group) {
                    terms.push((self.category_offset + k, 1.0));
                }
            }
            if let Some(embedding) = &entity.embedding {
                for (k, &w) in embedding.iter().take(self.n_parameters).enumerate() {
                    if w != 0.0 {
                        terms.push((self.parameter_offset + k, w));
                    }
                }
            }
        }
        terms
    }

    fn threshold_index(&self, context: &str) -> usize {
        let position = self
            .contexts
            .iter()
            .position(|c| c == context)
            .unwrap_or_default();
        self.threshold_offset + position
    }

    fn push_observation(
        &mut self,
        left: &[(usize, f64)],
        right: &[(usize, f64)],
        value: f64,
        law: RootLaw,
    ) {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for &(var, coef) in left {
            *merged.entry(var).or_insert(0.0) += coef;
        }
        for &(var, coef) in right {
            *merged.entry(var).or_insert(0.0) -= coef;
        }
        let terms: Vec<(usize, f64)> = merged.into_iter().filter(|(_, c)| *c != 0.0).collect();
        let o = self.observations.len();
        for &(var, coef) in &terms {
            self.incidence[var].push((o, coef));
        }
        self.observations.push(Observation { terms, value, law });
    }

    /// Sorted names of the entities involved
    pub fn entity_names(&self) -> &[String] {
        &self.entity_names
    }

    /// Sorted rating contexts
    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }

    /// `(category, group)` of each bias variable
    pub fn category_groups(&self) -> &[(String, String)] {
        &self.category_groups
    }

    /// Number of embedding parameters
    pub fn n_parameters(&self) -> usize {
        self.n_parameters
    }

    /// Variable of an entity's direct score
    pub fn direct_index(&self, entity: &str) -> Option<usize> {
        if !self.direct {
            return None;
        }
        self.entity_names.binary_search_by(|n| n.as_str().cmp(entity)).ok()
    }

    /// Variable of a context's threshold
    pub fn context_index(&self, context: &str) -> Option<usize> {
        self.contexts
            .iter()
            .position(|c| c == context)
            .map(|i| self.threshold_offset + i)
    }

    /// Variable of a category bias
    pub fn category_index(&self, category: &str, group: &str) -> Option<usize> {
        self.category_groups
            .iter()
            .position(|(c, g)| c == category && g == group)
            .map(|i| self.category_offset + i)
    }

    /// Variable of an embedding parameter
    pub fn parameter_index(&self, coordinate: usize) -> Option<usize> {
        (coordinate < self.n_parameters).then(|| self.parameter_offset + coordinate)
    }

    /// Number of observations (comparisons plus ratings)
    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Negative log-likelihood without the prior
    pub fn nll(&self, x: &DVector<f64>) -> f64 {
        self.observations.iter().map(|o| o.nll(o.diff(x))).sum()
    }
}

impl Objective for GbtProblem {
    fn dimension(&self) -> usize {
        self.prior_inv_vars.len()
    }

    fn loss(&self, x: &DVector<f64>) -> f64 {
        let prior: f64 = x
            .iter()
            .zip(self.prior_inv_vars.iter())
            .map(|(v, w)| w * v * v / 2.0)
            .sum();
        prior + self.nll(x)
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut gradient = self.prior_inv_vars.component_mul(x);
        for o in &self.observations {
            let d = o.nll_derivative(o.diff(x));
            for &(var, coef) in &o.terms {
                gradient[var] += coef * d;
            }
        }
        gradient
    }

    fn partial_derivative(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64 {
        let prior = self.prior_inv_vars[index] * (x[index] + delta);
        self.incidence[index]
            .iter()
            .map(|&(o, coef)| {
                let o = &self.observations[o];
                coef * o.nll_derivative(o.diff(x) + coef * delta)
            })
            .sum::<f64>()
            + prior
    }

    fn translated_nll(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64 {
        self.incidence[index]
            .iter()
            .map(|&(o, coef)| {
                let o = &self.observations[o];
                o.nll(o.diff(x) + coef * delta)
            })
            .sum()
    }

    fn translated_prior(&self, x: &DVector<f64>, index: usize, delta: f64) -> f64 {
        let v = x[index] + delta;
        self.prior_inv_vars[index] * v * v / 2.0
    }

    fn hessian_diagonal(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut hessian = self.prior_inv_vars.clone();
        for o in &self.observations {
            let h = o.law.cgf_second_derivative(o.diff(x));
            for &(var, coef) in &o.terms {
                hessian[var] += coef * coef * h;
            }
        }
        hessian
    }
}
