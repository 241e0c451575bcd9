//! Composable scoring models

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::poll::{Entities, Entity};
use crate::score::{MultiScore, Score};

/// How the base score of an entity is computed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelBase {
    /// Directly learned per-entity scores
    #[default]
    Direct,
    /// Direct score plus category biases plus embedding dot parameters
    Linear,
}

/// Operation applied on top of the base score
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Composition {
    /// `multiplier · x + translation`, read from the tables at `height`
    Scale {
        /// Index of the scale layer
        height: usize,
    },
    /// `score_max · x / √(1 + x²)`
    Squash {
        /// Bound of the squashed scores
        score_max: f64,
    },
}

/// Multiplier and translation tables shared by several models
#[derive(Clone, Copy, Debug)]
pub struct SharedScales<'a> {
    /// Multipliers keyed `(height, criterion)`
    pub multipliers: &'a MultiScore,
    /// Translations keyed `(height, criterion)`
    pub translations: &'a MultiScore,
}

/// Scoring model: a base and an ordered list of operations
///
/// Evaluation folds the composition over the base score, left to right.
/// Later stages append layers and never rewrite the base tables.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringModel {
    base: ModelBase,
    composition: Vec<Composition>,
    /// Base scores keyed `(entity_name, criterion)`
    pub directs: MultiScore,
    /// Category biases keyed `(category, group, criterion)`
    pub categories: MultiScore,
    /// Embedding parameters keyed `(coordinate, criterion)`
    pub parameters: MultiScore,
    /// Scale multipliers keyed `(height, criterion)`
    pub multipliers: MultiScore,
    /// Scale translations keyed `(height, criterion)`
    pub translations: MultiScore,
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self::new(ModelBase::Direct)
    }
}

/// Key names of the model tables
pub mod keynames {
    /// `directs`
    pub const DIRECTS: [&str; 2] = ["entity_name", "criterion"];
    /// `categories`
    pub const CATEGORIES: [&str; 3] = ["category", "group", "criterion"];
    /// `parameters`
    pub const PARAMETERS: [&str; 2] = ["coordinate", "criterion"];
    /// `multipliers` and `translations`
    pub const SCALES: [&str; 2] = ["height", "criterion"];
}

impl ScoringModel {
    /// Empty model on the given base
    pub fn new(base: ModelBase) -> Self {
        Self {
            base,
            composition: Vec::new(),
            directs: MultiScore::new(&keynames::DIRECTS),
            categories: MultiScore::new(&keynames::CATEGORIES),
            parameters: MultiScore::new(&keynames::PARAMETERS),
            multipliers: MultiScore::new(&keynames::SCALES),
            translations: MultiScore::new(&keynames::SCALES),
        }
    }

    /// Empty direct model
    pub fn direct() -> Self {
        Self::new(ModelBase::Direct)
    }

    /// Base kind
    pub fn base(&self) -> ModelBase {
        self.base
    }

    /// Operations, innermost first
    pub fn composition(&self) -> &[Composition] {
        &self.composition
    }

    /// Number of scale layers
    pub fn height(&self) -> usize {
        self.composition
            .iter()
            .filter(|op| matches!(op, Composition::Scale { .. }))
            .count()
    }

    /// Does the model hold no base score?
    pub fn is_empty(&self) -> bool {
        self.directs.is_empty() && self.categories.is_empty() && self.parameters.is_empty()
    }

    /// Set a direct score
    pub fn set_direct(&mut self, entity: &str, criterion: &str, score: Score) -> Result<(), ScoreError> {
        self.directs.set(&[entity, criterion], score)
    }

    /// Append a scale layer if `height` is new, and set its values for `criterion`
    ///
    /// A criterion missing from a layer is left unscaled by it.
    pub fn set_scale(
        &mut self,
        height: usize,
        criterion: &str,
        multiplier: Score,
        translation: Score,
    ) -> Result<(), ScoreError> {
        self.ensure_scale_layer(height);
        let h = height.to_string();
        self.multipliers.set(&[h.as_str(), criterion], multiplier)?;
        self.translations.set(&[h.as_str(), criterion], translation)
    }

    /// Insert a scale layer at `height` unless one exists
    ///
    /// Scale layers stay sorted by height, below any squash layer, whatever
    /// order they are first touched in.
    pub fn ensure_scale_layer(&mut self, height: usize) {
        let exists = self
            .composition
            .iter()
            .any(|op| *op == Composition::Scale { height });
        if exists {
            return;
        }
        let position = self
            .composition
            .iter()
            .position(|op| match *op {
                Composition::Scale { height: h } => h > height,
                Composition::Squash { .. } => true,
            })
            .unwrap_or(self.composition.len());
        self.composition
            .insert(position, Composition::Scale { height });
    }

    /// Append a squash layer
    pub fn push_squash(&mut self, score_max: f64) {
        self.composition.push(Composition::Squash { score_max });
    }

    /// Multiplier of a layer, or NaN when the layer leaves `criterion` alone
    pub fn multiplier(&self, height: usize, criterion: &str) -> Score {
        self.multipliers.get(&[height.to_string().as_str(), criterion])
    }

    /// Translation of a layer, or NaN
    pub fn translation(&self, height: usize, criterion: &str) -> Score {
        self.translations
            .get(&[height.to_string().as_str(), criterion])
    }

    /// Score before any composition
    pub fn base_score(&self, entity: &Entity, criterion: &str) -> Score {
        let direct = self
            .directs
            .get(&[entity.entity_name.as_str(), criterion]);
        match self.base {
            ModelBase::Direct => direct,
            ModelBase::Linear => {
                let mut total = direct;
                for (category, group) in &entity.categories {
                    let bias = self
                        .categories
                        .get(&[category.as_str(), group.as_str(), criterion]);
                    total = add_defined(total, bias);
                }
                if let Some(embedding) = &entity.embedding {
                    for (coordinate, w) in embedding.iter().enumerate() {
                        let theta = self
                            .parameters
                            .get(&[coordinate.to_string().as_str(), criterion]);
                        if !theta.is_nan() {
                            total = add_defined(total, theta * *w);
                        }
                    }
                }
                total
            }
        }
    }

    /// Evaluate the model on an entity
    pub fn score(&self, entity: &Entity, criterion: &str) -> Score {
        self.score_with(entity, criterion, None)
    }

    /// Evaluate the model, letting shared scales override this model's scales
    pub fn score_with(
        &self,
        entity: &Entity,
        criterion: &str,
        shared: Option<SharedScales<'_>>,
    ) -> Score {
        let base = self.base_score(entity, criterion);
        self.compose(base, criterion, shared)
    }

    /// Fold the composition over a base score
    pub fn compose(&self, base: Score, criterion: &str, shared: Option<SharedScales<'_>>) -> Score {
        if base.is_nan() {
            return base;
        }
        self.composition.iter().fold(base, |score, op| match *op {
            Composition::Scale { height } => {
                let key = [height.to_string(), criterion.to_string()];
                let (mut m, mut t) = (self.multipliers.get(&key), self.translations.get(&key));
                if let Some(shared) = shared {
                    let (sm, st) = (shared.multipliers.get(&key), shared.translations.get(&key));
                    if !sm.is_nan() {
                        m = sm;
                    }
                    if !st.is_nan() {
                        t = st;
                    }
                }
                let scaled = if m.is_nan() { score } else { m * score };
                if t.is_nan() {
                    scaled
                } else {
                    scaled + t
                }
            }
            Composition::Squash { score_max } => squash(score, score_max),
        })
    }

    /// Defined scores of the catalog entities on `criterion`, in name order
    pub fn evaluate(
        &self,
        entities: &Entities,
        criterion: &str,
        shared: Option<SharedScales<'_>>,
    ) -> Vec<(String, Score)> {
        entities
            .iter()
            .filter_map(|e| {
                let s = self.score_with(e, criterion, shared);
                (!s.is_nan()).then(|| (e.entity_name.clone(), s))
            })
            .collect()
    }

    /// Criteria having base scores
    pub fn criteria(&self) -> Vec<String> {
        let mut criteria: Vec<String> = self
            .directs
            .iter()
            .map(|(k, _)| k[1].clone())
            .chain(self.categories.iter().map(|(k, _)| k[2].clone()))
            .chain(self.parameters.iter().map(|(k, _)| k[1].clone()))
            .collect();
        criteria.sort();
        criteria.dedup();
        criteria
    }
}

fn add_defined(total: Score, term: Score) -> Score {
    match (total.is_nan(), term.is_nan()) {
        (true, _) => term,
        (false, true) => total,
        (false, false) => total + term,
    }
}

/// `score_max · x / √(1 + x²)` applied to the value and both interval ends
pub fn squash(score: Score, score_max: f64) -> Score {
    if score.is_nan() {
        return score;
    }
    let f = |x: f64| {
        if x.is_infinite() {
            score_max * x.signum()
        } else {
            score_max * x / (1.0 + x * x).sqrt()
        }
    };
    Score::from_bounds(f(score.value()), f(score.min()), f(score.max()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_model() {
        let mut model = ScoringModel::direct();
        model
            .set_direct("a", "c", Score::new(1.0, 0.5, 0.5).unwrap())
            .unwrap();
        assert_eq!(model.score(&Entity::new("a"), "c").value(), 1.0);
        assert!(model.score(&Entity::new("b"), "c").is_nan());
        assert!(model.score(&Entity::new("a"), "other").is_nan());
    }

    #[test]
    fn test_scale_then_squash() {
        let mut model = ScoringModel::direct();
        model.set_direct("a", "c", Score::certain(1.0)).unwrap();
        model
            .set_scale(0, "c", Score::certain(2.0), Score::certain(-1.0))
            .unwrap();
        assert_eq!(model.height(), 1);
        assert_eq!(model.score(&Entity::new("a"), "c").value(), 1.0);
        model.push_squash(100.0);
        let squashed = model.score(&Entity::new("a"), "c").value();
        assert!((squashed - 100.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_late_scale_layer_runs_first() {
        let mut model = ScoringModel::direct();
        model.set_direct("a", "c2", Score::certain(1.0)).unwrap();
        model
            .set_scale(1, "c2", Score::certain(1.0), Score::certain(10.0))
            .unwrap();
        model
            .set_scale(0, "c2", Score::certain(2.0), Score::certain(0.0))
            .unwrap();
        assert_eq!(
            model.composition(),
            &[Composition::Scale { height: 0 }, Composition::Scale { height: 1 }]
        );
        assert_eq!(model.score(&Entity::new("a"), "c2").value(), 12.0);

        model.push_squash(100.0);
        model.ensure_scale_layer(2);
        assert_eq!(model.composition()[2], Composition::Scale { height: 2 });
        assert!(matches!(model.composition()[3], Composition::Squash { .. }));
    }

    #[test]
    fn test_missing_criterion_is_unscaled() {
        let mut model = ScoringModel::direct();
        model.set_direct("a", "x", Score::certain(3.0)).unwrap();
        model
            .set_scale(0, "y", Score::certain(2.0), Score::certain(1.0))
            .unwrap();
        assert_eq!(model.score(&Entity::new("a"), "x").value(), 3.0);
    }

    #[test]
    fn test_shared_scales_override() {
        let mut model = ScoringModel::direct();
        model.set_direct("a", "c", Score::certain(1.0)).unwrap();
        model
            .set_scale(0, "c", Score::certain(2.0), Score::certain(0.0))
            .unwrap();
        let mut multipliers = MultiScore::new(&keynames::SCALES);
        multipliers.set(&["0", "c"], Score::certain(5.0)).unwrap();
        let translations = MultiScore::new(&keynames::SCALES);
        let shared = SharedScales {
            multipliers: &multipliers,
            translations: &translations,
        };
        let s = model.score_with(&Entity::new("a"), "c", Some(shared));
        assert_eq!(s.value(), 5.0);
    }

    #[test]
    fn test_linear_model() {
        let mut model = ScoringModel::new(ModelBase::Linear);
        model.set_direct("a", "c", Score::certain(1.0)).unwrap();
        model
            .categories
            .set(&["language", "fr", "c"], Score::certain(0.5))
            .unwrap();
        model.parameters.set(&["0", "c"], Score::certain(2.0)).unwrap();
        model.parameters.set(&["1", "c"], Score::certain(-1.0)).unwrap();
        let entity = Entity::new("a")
            .with_category("language", "fr")
            .with_embedding(vec![1.0, 3.0]);
        assert!((model.score(&entity, "c").value() - (1.0 + 0.5 + 2.0 - 3.0)).abs() < 1e-12);

        // no direct score, only the embedding part
        let other = Entity::new("b").with_embedding(vec![1.0, 0.0]);
        assert_eq!(model.score(&other, "c").value(), 2.0);
    }

    #[test]
    fn test_squash_bounds() {
        let s = squash(Score::new(0.0, 1e9, 1.0).unwrap(), 100.0);
        assert_eq!(s.value(), 0.0);
        assert!(s.min() > -100.0 - 1e-9);
        assert!((s.max() - 100.0 / 2f64.sqrt()).abs() < 1e-9);
        let inf = squash(Score::new(1.0, f64::INFINITY, 0.0).unwrap(), 10.0);
        assert!((inf.min() + 10.0).abs() < 1e-12);
    }
}
