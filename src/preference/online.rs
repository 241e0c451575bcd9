//! Online single-comparison update
//!
//! When one comparison changes, only the scores of its two entities are
//! re-optimized, one coordinate at a time, by golden-section search on the
//! loss of a minibatch of surrounding comparisons. Every other stored score
//! is left untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::root_law::RootLaw;
use crate::error::{PipelineError, ScoringResult};
use crate::model::UserModels;
use crate::poll::{Comparison, Entities};
use crate::solvers::golden_section_search;

/// Row name of the aggregate in a [`ScoreTensor`]
pub const AGGREGATE_ROW: &str = "__aggregate__";

/// Dense score values `T[row, entity, criterion]`
///
/// Rows are the users followed by one aggregate row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreTensor {
    rows: Vec<String>,
    entities: Vec<String>,
    criteria: Vec<String>,
    values: Vec<f64>,
}

impl ScoreTensor {
    /// Zero tensor; the aggregate row is appended to `users`
    pub fn zeros(users: Vec<String>, entities: Vec<String>, criteria: Vec<String>) -> Self {
        let mut rows = users;
        rows.push(AGGREGATE_ROW.to_string());
        let len = rows.len() * entities.len() * criteria.len();
        Self {
            rows,
            entities,
            criteria,
            values: vec![0.0; len],
        }
    }

    /// Tensor of the base values of user models; missing scores read as zero
    pub fn from_models(models: &UserModels, entities: &Entities, criteria: &[String]) -> Self {
        let mut tensor = Self::zeros(
            models.usernames().map(str::to_string).collect(),
            entities.names().map(str::to_string).collect(),
            criteria.to_vec(),
        );
        for (row, (_, model)) in models.iter().enumerate() {
            for (keys, score) in model.directs.iter() {
                if let (Some(e), Some(c)) = (tensor.entity_index(&keys[0]), tensor.criterion_index(&keys[1])) {
                    let i = tensor.offset(row, e, c);
                    tensor.values[i] = score.value();
                }
            }
        }
        tensor
    }

    fn offset(&self, row: usize, entity: usize, criterion: usize) -> usize {
        (row * self.entities.len() + entity) * self.criteria.len() + criterion
    }

    /// Index of a row by name
    pub fn row_index(&self, row: &str) -> Option<usize> {
        self.rows.iter().position(|r| r == row)
    }

    /// Index of the aggregate row
    pub fn aggregate_index(&self) -> usize {
        self.rows.len() - 1
    }

    fn entity_index(&self, entity: &str) -> Option<usize> {
        self.entities.iter().position(|e| e == entity)
    }

    fn criterion_index(&self, criterion: &str) -> Option<usize> {
        self.criteria.iter().position(|c| c == criterion)
    }

    /// Row names, aggregate last
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Value at `(row, entity, criterion)`, `None` for unknown keys
    pub fn get(&self, row: &str, entity: &str, criterion: &str) -> Option<f64> {
        let (r, e, c) = (
            self.row_index(row)?,
            self.entity_index(entity)?,
            self.criterion_index(criterion)?,
        );
        Some(self.values[self.offset(r, e, c)])
    }

    /// Set a value
    pub fn set(&mut self, row: &str, entity: &str, criterion: &str, value: f64) -> ScoringResult<()> {
        let index = self.locate(row, entity, criterion)?;
        self.values[index] = value;
        Ok(())
    }

    fn locate(&self, row: &str, entity: &str, criterion: &str) -> ScoringResult<usize> {
        match (
            self.row_index(row),
            self.entity_index(entity),
            self.criterion_index(criterion),
        ) {
            (Some(r), Some(e), Some(c)) => Ok(self.offset(r, e, c)),
            _ => Err(PipelineError::InvalidArgument(format!(
                "no tensor entry ({}, {}, {})",
                row, entity, criterion
            ))),
        }
    }
}

/// Coordinate moved by an online update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinateChange {
    /// Username, or [`AGGREGATE_ROW`]
    pub row: String,
    /// Entity
    pub entity: String,
    /// Criterion
    pub criterion: String,
    /// Value before the update
    pub before: f64,
    /// Value after the update
    pub after: f64,
}

/// Outcome of an online update
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineUpdateReport {
    /// Minibatch loss after the comparison change, before any search
    pub loss_before: f64,
    /// Minibatch loss at the end
    pub loss_after: f64,
    /// Coordinates whose value changed
    pub changes: Vec<CoordinateChange>,
}

impl OnlineUpdateReport {
    /// Shift the direct scores of the changed user coordinates, keeping
    /// their uncertainties
    pub fn apply(&self, models: &mut UserModels) -> ScoringResult<()> {
        for change in self.changes.iter().filter(|c| c.row != AGGREGATE_ROW) {
            let Some(model) = models.get(&change.row) else {
                continue;
            };
            let key = [change.entity.as_str(), change.criterion.as_str()];
            let current = model.directs.get(&key);
            if current.is_nan() {
                continue;
            }
            let moved = current + (change.after - change.before);
            models.model_mut(&change.row).directs.set(&key, moved)?;
        }
        Ok(())
    }
}

/// Golden-section online updater
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineUpdater {
    /// Half-width of the search bracket around the current value
    pub window: f64,
    /// Passes over the coordinates
    pub n_repeats: usize,
    /// Weight of the coupling between user rows and the aggregate row
    pub lambda: f64,
    /// Weight of the anchoring of the aggregate row at `default_score`
    pub mu: f64,
    /// Damping of the coupling for users with few comparisons
    pub c: f64,
    /// Anchor of the aggregate row
    pub default_score: f64,
    /// Prior standard deviation of user scores
    pub prior_std_dev: f64,
    /// Root law of comparisons without their own
    pub root_law: RootLaw,
    /// Golden-section bracket tolerance
    pub tolerance: f64,
    /// Golden-section iteration cap
    pub max_iter: usize,
}

impl Default for OnlineUpdater {
    fn default() -> Self {
        Self {
            window: 8.0,
            n_repeats: 1,
            lambda: 0.0,
            mu: 0.0,
            c: 0.0,
            default_score: 0.0,
            prior_std_dev: 7.0,
            root_law: RootLaw::Uniform,
            tolerance: 1e-8,
            max_iter: 200,
        }
    }
}

/// Minibatch resolved against tensor indices
struct Batch<'a> {
    tensor: &'a ScoreTensor,
    /// `(row, left, right, criterion, c̃, law)`
    observations: Vec<(usize, usize, usize, usize, f64, RootLaw)>,
    /// `(row, entity, criterion) → number of comparisons`
    counts: BTreeMap<(usize, usize, usize), usize>,
}

impl<'a> Batch<'a> {
    fn new(
        tensor: &'a ScoreTensor,
        minibatch: &[Comparison],
        default_law: RootLaw,
    ) -> ScoringResult<Self> {
        let mut observations = Vec::with_capacity(minibatch.len());
        let mut counts = BTreeMap::new();
        for comparison in minibatch {
            let unknown = || {
                PipelineError::InvalidArgument(format!(
                    "comparison ({}, {}, {}, {}) outside the score tensor",
                    comparison.username, comparison.criterion, comparison.left, comparison.right
                ))
            };
            let row = tensor.row_index(&comparison.username).ok_or_else(unknown)?;
            let left = tensor.entity_index(&comparison.left).ok_or_else(unknown)?;
            let right = tensor.entity_index(&comparison.right).ok_or_else(unknown)?;
            let criterion = tensor
                .criterion_index(&comparison.criterion)
                .ok_or_else(unknown)?;
            let law = comparison.root_law.unwrap_or(default_law);
            let value = law.normalize_comparison(comparison.value, comparison.value_max);
            observations.push((row, left, right, criterion, value, law));
            *counts.entry((row, left, criterion)).or_insert(0) += 1;
            *counts.entry((row, right, criterion)).or_insert(0) += 1;
        }
        Ok(Self {
            tensor,
            observations,
            counts,
        })
    }

    fn loss(&self, updater: &OnlineUpdater, values: &[f64]) -> f64 {
        let t = self.tensor;
        let at = |row, entity, criterion| values[t.offset(row, entity, criterion)];
        let fit: f64 = self
            .observations
            .iter()
            .map(|&(row, left, right, criterion, value, law)| {
                let diff = at(row, left, criterion) - at(row, right, criterion);
                law.cgf(diff) - value * diff
            })
            .sum();

        let inv_var = 1.0 / (updater.prior_std_dev * updater.prior_std_dev);
        let aggregate = t.aggregate_index();
        let mut regularization = 0.0;
        let mut anchored = BTreeSet::new();
        for (&(row, entity, criterion), &n) in &self.counts {
            let x = at(row, entity, criterion);
            regularization += 0.5 * inv_var * x * x;
            let n = n as f64;
            let common = at(aggregate, entity, criterion);
            regularization += updater.lambda * n / (updater.c + n) * (x - common).abs();
            anchored.insert((entity, criterion));
        }
        for (entity, criterion) in anchored {
            let common = at(aggregate, entity, criterion) - updater.default_score;
            regularization += updater.mu * common * common;
        }
        fit + regularization
    }
}

impl OnlineUpdater {
    /// Create an updater with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of passes
    pub fn with_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats;
        self
    }

    /// Set the coupling weights `(lambda, mu, c)`
    pub fn with_coupling(mut self, lambda: f64, mu: f64, c: f64) -> Self {
        self.lambda = lambda;
        self.mu = mu;
        self.c = c;
        self
    }

    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        if !(self.window > 0.0) || !(self.prior_std_dev > 0.0) || !(self.tolerance > 0.0) {
            return Err(PipelineError::InvalidArgument(
                "window, prior_std_dev and tolerance must be positive".to_string(),
            ));
        }
        if self.lambda < 0.0 || self.mu < 0.0 || self.c < 0.0 {
            return Err(PipelineError::InvalidArgument(
                "coupling weights must be non-negative".to_string(),
            ));
        }
        self.root_law.validate().map_err(PipelineError::InvalidArgument)
    }

    /// Minibatch loss at the current tensor
    pub fn loss(&self, tensor: &ScoreTensor, minibatch: &[Comparison]) -> ScoringResult<f64> {
        let batch = Batch::new(tensor, minibatch, self.root_law)?;
        Ok(batch.loss(self, &tensor.values))
    }

    /// Set `minibatch[index].value` to `value` and re-optimize the scores of
    /// its two entities in every row of `tensor`
    ///
    /// A coordinate takes its searched value only if the minibatch loss
    /// strictly decreases.
    pub fn update(
        &self,
        tensor: &mut ScoreTensor,
        minibatch: &mut [Comparison],
        index: usize,
        value: f64,
    ) -> ScoringResult<OnlineUpdateReport> {
        self.validate()?;
        let comparison = minibatch.get(index).ok_or_else(|| {
            PipelineError::InvalidArgument(format!("no comparison at minibatch index {}", index))
        })?;
        if !value.is_finite() || value.abs() > comparison.value_max {
            return Err(PipelineError::InvalidArgument(format!(
                "comparison value {} outside [-{max}, {max}]",
                value,
                max = comparison.value_max
            )));
        }
        let (left, right, criterion) = (
            comparison.left.clone(),
            comparison.right.clone(),
            comparison.criterion.clone(),
        );
        let value_max = comparison.value_max;

        // resolve every row before touching the minibatch
        let mut batch = Batch::new(tensor, minibatch, self.root_law)?;
        let observation = &mut batch.observations[index];
        observation.4 = observation.5.normalize_comparison(value, value_max);
        minibatch[index].value = value;

        let mut values = tensor.values.clone();
        let loss_before = batch.loss(self, &values);
        let mut loss = loss_before;

        let mut coordinates = Vec::with_capacity(2 * tensor.rows.len());
        for row in &tensor.rows {
            for entity in [&left, &right] {
                coordinates.push(tensor.locate(row, entity, &criterion)?);
            }
        }

        for _ in 0..self.n_repeats {
            for &i in &coordinates {
                let current = values[i];
                let best = golden_section_search(
                    |x| {
                        let mut trial = values.clone();
                        trial[i] = x;
                        batch.loss(self, &trial)
                    },
                    current - self.window,
                    current + self.window,
                    self.tolerance,
                    self.max_iter,
                );
                values[i] = best;
                let candidate = batch.loss(self, &values);
                if candidate < loss {
                    loss = candidate;
                } else {
                    values[i] = current;
                }
            }
        }

        let mut changes = Vec::new();
        for row in &tensor.rows {
            for entity in [&left, &right] {
                let i = tensor.locate(row, entity, &criterion)?;
                if values[i] != tensor.values[i] {
                    changes.push(CoordinateChange {
                        row: row.clone(),
                        entity: entity.clone(),
                        criterion: criterion.clone(),
                        before: tensor.values[i],
                        after: values[i],
                    });
                }
            }
        }
        tracing::debug!(
            n_changes = changes.len(),
            loss_before,
            loss_after = loss,
            "online update"
        );
        tensor.values = values;
        Ok(OnlineUpdateReport {
            loss_before,
            loss_after: loss,
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::GeneralizedBradleyTerry;

    fn tensor_with(values: &[(&str, &str, f64)]) -> ScoreTensor {
        let mut tensor = ScoreTensor::zeros(
            vec!["u".to_string(), "v".to_string()],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["q".to_string()],
        );
        for &(row, entity, value) in values {
            tensor.set(row, entity, "q", value).unwrap();
        }
        tensor
    }

    #[test]
    fn test_tensor_layout() {
        let tensor = tensor_with(&[("u", "b", 1.5), ("v", "c", -2.0)]);
        assert_eq!(tensor.rows().last().map(String::as_str), Some(AGGREGATE_ROW));
        assert_eq!(tensor.get("u", "b", "q"), Some(1.5));
        assert_eq!(tensor.get("v", "c", "q"), Some(-2.0));
        assert_eq!(tensor.get("v", "a", "q"), Some(0.0));
        assert_eq!(tensor.get("w", "a", "q"), None);
    }

    #[test]
    fn test_only_touched_coordinates_move() {
        let mut tensor = tensor_with(&[
            ("u", "a", 1.0),
            ("u", "b", 0.0),
            ("u", "c", -1.0),
            ("v", "a", 1.0),
            ("v", "b", 0.0),
            ("v", "c", -1.0),
        ]);
        let before = tensor.clone();
        let mut minibatch = vec![
            Comparison::new("u", "q", "a", "b", 1.0, 1.0),
            Comparison::new("u", "q", "b", "c", 1.0, 1.0),
            Comparison::new("v", "q", "a", "b", 1.0, 1.0),
        ];
        let report = OnlineUpdater::default()
            .update(&mut tensor, &mut minibatch, 0, -1.0)
            .unwrap();
        assert!(report.changes.len() <= 4);
        assert!(report.loss_after < report.loss_before);
        assert!(tensor.get("u", "a", "q") < before.get("u", "a", "q"));
        for row in ["u", "v", AGGREGATE_ROW] {
            assert_eq!(tensor.get(row, "c", "q"), before.get(row, "c", "q"));
        }
        // v's comparison did not change and the aggregate is uncoupled
        for entity in ["a", "b"] {
            assert_eq!(tensor.get(AGGREGATE_ROW, entity, "q"), Some(0.0));
        }
        assert_eq!(minibatch[0].value, -1.0);
    }

    #[test]
    fn test_matches_refit_on_isolated_pair() {
        let entities = Entities::from_names(&["a", "b"]).unwrap();
        let first = Comparison::new("u", "q", "a", "b", 1.0, 1.0);
        let gbt = GeneralizedBradleyTerry::default();
        let fit = gbt.fit(&[&first], &[], &entities, None, None).unwrap();
        let mut models = UserModels::new();
        let mut model = crate::model::ScoringModel::direct();
        fit.write_into(&mut model, "q").unwrap();
        models.insert("u", model);

        let mut tensor = ScoreTensor::from_models(&models, &entities, &["q".to_string()]);
        let mut minibatch = vec![first];
        let report = OnlineUpdater::default()
            .with_repeats(30)
            .update(&mut tensor, &mut minibatch, 0, -1.0)
            .unwrap();
        report.apply(&mut models).unwrap();

        let refit = gbt.fit(&[&minibatch[0]], &[], &entities, None, None).unwrap();
        for entity in ["a", "b"] {
            let online = tensor.get("u", entity, "q").unwrap();
            let full = refit.direct(entity).unwrap().value();
            assert!((online - full).abs() < 1e-2, "{}: {} vs {}", entity, online, full);
            let stored = models.get("u").unwrap().directs.get(&[entity, "q"]).value();
            assert!((stored - online).abs() < 1e-9);
        }
    }

    #[test]
    fn test_coupling_moves_aggregate() {
        let mut tensor = tensor_with(&[("u", "a", 2.0), ("u", "b", -2.0)]);
        let mut minibatch = vec![Comparison::new("u", "q", "a", "b", 1.0, 1.0)];
        let report = OnlineUpdater::default()
            .with_coupling(0.05, 0.001, 0.0)
            .update(&mut tensor, &mut minibatch, 0, 1.0)
            .unwrap();
        assert!(report
            .changes
            .iter()
            .any(|c| c.row == AGGREGATE_ROW && c.entity == "a" && c.after > 0.0));
    }

    #[test]
    fn test_rejects_bad_update() {
        let mut tensor = tensor_with(&[]);
        let mut minibatch = vec![Comparison::new("u", "q", "a", "b", 1.0, 1.0)];
        let updater = OnlineUpdater::default();
        assert!(updater.update(&mut tensor, &mut minibatch, 3, 0.0).is_err());
        assert!(updater.update(&mut tensor, &mut minibatch, 0, 2.0).is_err());
        let mut foreign = vec![Comparison::new("w", "q", "a", "b", 1.0, 1.0)];
        assert!(updater.update(&mut tensor, &mut foreign, 0, 0.5).is_err());
        assert_eq!(foreign[0].value, 1.0);
    }

    #[test]
    fn test_failed_update_leaves_minibatch_alone() {
        let mut tensor = tensor_with(&[("u", "a", 1.0), ("u", "b", -1.0)]);
        let before = tensor.clone();
        let mut minibatch = vec![
            Comparison::new("u", "q", "a", "b", 1.0, 1.0),
            Comparison::new("u", "q", "a", "zzz", 0.5, 1.0),
        ];
        let kept = minibatch.clone();
        let result = OnlineUpdater::default().update(&mut tensor, &mut minibatch, 0, -1.0);
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
        assert_eq!(minibatch, kept);
        assert_eq!(tensor, before);
    }
}
