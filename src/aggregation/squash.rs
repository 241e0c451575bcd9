use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, ScoringResult};
use crate::model::{squash, ScoringModel, UserModels};

/// Final squash of all scores into `[-score_max, score_max]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Squash {
    /// Bound of the squashed scores
    pub score_max: f64,
}

impl Default for Squash {
    fn default() -> Self {
        Self { score_max: 100.0 }
    }
}

impl Squash {
    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        if !(self.score_max > 0.0) || !self.score_max.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "score_max must be positive and finite, got {}",
                self.score_max
            )));
        }
        Ok(())
    }

    /// Append a squash layer to every user model and return the squashed
    /// global model
    pub fn apply(&self, models: &mut UserModels, global: &ScoringModel) -> ScoringResult<ScoringModel> {
        self.validate()?;
        models.push_squash(self.score_max);
        let mut squashed = ScoringModel::direct();
        for (key, score) in global.directs.iter() {
            squashed.set_direct(&key[0], &key[1], squash(*score, self.score_max))?;
        }
        Ok(squashed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::Entity;
    use crate::score::Score;

    #[test]
    fn test_squash_bounds_users_and_global() {
        let entity = Entity::new("a");
        let mut user = ScoringModel::direct();
        user.set_direct("a", "q", Score::symmetric(1e6, 1.0)).unwrap();
        let mut models = UserModels::new();
        models.insert("u", user);
        let mut global = ScoringModel::direct();
        global.set_direct("a", "q", Score::symmetric(1.0, 1.0)).unwrap();

        let squashed = Squash::default().apply(&mut models, &global).unwrap();
        let g = squashed.score(&entity, "q");
        assert!((g.value() - 100.0 / 2f64.sqrt()).abs() < 1e-9);
        assert!(g.max() <= 100.0 && g.min() >= 0.0);
        let u = models.score("u", &entity, "q");
        assert!(u.value() <= 100.0 && u.value() > 99.0);
    }

    #[test]
    fn test_invalid_score_max() {
        assert!(Squash { score_max: 0.0 }.validate().is_err());
    }
}
