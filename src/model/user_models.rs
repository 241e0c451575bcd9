use std::collections::BTreeMap;

use super::scoring_model::{keynames, ScoringModel, SharedScales};
use crate::error::ScoreError;
use crate::poll::{Entities, Entity};
use crate::score::{MultiScore, Score};

/// Personal scoring models of all users
///
/// `common_multipliers` and `common_translations` hold scale layers shared
/// by every user; where they define a `(height, criterion)` they override
/// the per-user value.
#[derive(Clone, Debug, PartialEq)]
pub struct UserModels {
    models: BTreeMap<String, ScoringModel>,
    /// Shared multipliers keyed `(height, criterion)`
    pub common_multipliers: MultiScore,
    /// Shared translations keyed `(height, criterion)`
    pub common_translations: MultiScore,
}

impl Default for UserModels {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            common_multipliers: MultiScore::new(&keynames::SCALES),
            common_translations: MultiScore::new(&keynames::SCALES),
        }
    }
}

impl UserModels {
    /// No models
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the model of a user
    pub fn insert(&mut self, username: impl Into<String>, model: ScoringModel) {
        self.models.insert(username.into(), model);
    }

    /// Model of a user
    pub fn get(&self, username: &str) -> Option<&ScoringModel> {
        self.models.get(username)
    }

    /// Mutable model of a user, created empty if absent
    pub fn model_mut(&mut self, username: &str) -> &mut ScoringModel {
        self.models.entry(username.to_string()).or_default()
    }

    /// Models in username order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScoringModel)> {
        self.models.iter().map(|(u, m)| (u.as_str(), m))
    }

    /// Mutable models in username order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ScoringModel)> {
        self.models.iter_mut().map(|(u, m)| (u.as_str(), m))
    }

    /// Usernames in order
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// No models?
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn shared(&self) -> SharedScales<'_> {
        SharedScales {
            multipliers: &self.common_multipliers,
            translations: &self.common_translations,
        }
    }

    /// Score of an entity in a user's model, shared scales applied
    pub fn score(&self, username: &str, entity: &Entity, criterion: &str) -> Score {
        self.models
            .get(username)
            .map(|m| m.score_with(entity, criterion, Some(self.shared())))
            .unwrap_or(Score::Nan)
    }

    /// Defined scores of one user on the catalog
    pub fn evaluate(&self, username: &str, entities: &Entities, criterion: &str) -> Vec<(String, Score)> {
        self.models
            .get(username)
            .map(|m| m.evaluate(entities, criterion, Some(self.shared())))
            .unwrap_or_default()
    }

    /// Defined scores of every user, as `username → entity → score`
    pub fn evaluate_all(
        &self,
        entities: &Entities,
        criterion: &str,
    ) -> BTreeMap<String, BTreeMap<String, Score>> {
        self.models
            .iter()
            .map(|(u, m)| {
                let scores = m
                    .evaluate(entities, criterion, Some(self.shared()))
                    .into_iter()
                    .collect();
                (u.clone(), scores)
            })
            .collect()
    }

    /// Set a scale layer shared by every user
    pub fn set_common_scale(
        &mut self,
        height: usize,
        criterion: &str,
        multiplier: Score,
        translation: Score,
    ) -> Result<(), ScoreError> {
        let h = height.to_string();
        for model in self.models.values_mut() {
            model.ensure_scale_layer(height);
        }
        self.common_multipliers
            .set(&[h.as_str(), criterion], multiplier)?;
        self.common_translations
            .set(&[h.as_str(), criterion], translation)
    }

    /// Height of the next scale layer common to all models
    pub fn next_height(&self) -> usize {
        self.models
            .values()
            .map(ScoringModel::height)
            .max()
            .unwrap_or(0)
    }

    /// Append a squash layer to every model
    pub fn push_squash(&mut self, score_max: f64) {
        for model in self.models.values_mut() {
            model.push_squash(score_max);
        }
    }

    /// Criteria with at least one base score
    pub fn criteria(&self) -> Vec<String> {
        let mut criteria: Vec<String> = self.models.values().flat_map(|m| m.criteria()).collect();
        criteria.sort();
        criteria.dedup();
        criteria
    }
}
