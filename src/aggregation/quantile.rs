use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostics::{Stage, TaskFailure};
use crate::error::{PipelineError, ScoringResult};
use crate::model::{ScoringModel, UserModels};
use crate::pipeline::CancellationToken;
use crate::poll::{Entities, VotingRights};
use crate::primitives::{qr_quantile, qr_uncertainty, Sample};
use crate::score::Score;

/// Entity-wise Lipschitz-resilient quantile of the users' scaled scores
///
/// Each user weighs by their voting right on the (entity, criterion).
/// A low quantile rewards entities that few raters dislike.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitywiseQrQuantile {
    /// Aggregated quantile
    pub quantile: f64,
    /// Maximal influence of one unit of voting right
    pub lipschitz: f64,
    /// Root-finding tolerance
    pub error: f64,
}

impl Default for EntitywiseQrQuantile {
    fn default() -> Self {
        Self {
            quantile: 0.2,
            lipschitz: 0.1,
            error: 1e-5,
        }
    }
}

/// Global scores of one criterion
#[derive(Clone, Debug, Default)]
pub struct AggregationOutcome {
    /// Score of every entity with at least one weighted rater
    pub scores: BTreeMap<String, Score>,
    /// Entities whose aggregation failed
    pub failures: Vec<TaskFailure>,
}

impl AggregationOutcome {
    /// Write the scores as directs of the global model
    pub fn write_into(&self, global: &mut ScoringModel, criterion: &str) -> ScoringResult<()> {
        for (entity, score) in &self.scores {
            global.set_direct(entity, criterion, *score)?;
        }
        Ok(())
    }
}

impl EntitywiseQrQuantile {
    /// Set the aggregated quantile
    pub fn with_quantile(mut self, quantile: f64) -> Self {
        self.quantile = quantile;
        self
    }

    /// Set the Lipschitz constant
    pub fn with_lipschitz(mut self, lipschitz: f64) -> Self {
        self.lipschitz = lipschitz;
        self
    }

    /// Check the settings
    pub fn validate(&self) -> ScoringResult<()> {
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "quantile must be in (0, 1), got {}",
                self.quantile
            )));
        }
        if !(self.lipschitz > 0.0) || !(self.error > 0.0) {
            return Err(PipelineError::InvalidArgument(
                "lipschitz and error must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Aggregate one sample of weighted scores
    pub fn aggregate_sample(&self, sample: &Sample) -> ScoringResult<Score> {
        let value = qr_quantile(self.lipschitz, self.quantile, sample, 0.0, self.error)?;
        let uncertainty = qr_uncertainty(self.lipschitz, sample, 1.0, self.error, Some(value))?;
        Ok(Score::symmetric(value, uncertainty))
    }

    /// Aggregate every entity of `criterion`
    ///
    /// Missing user scores are absent from the sample, not zero. Entities
    /// without any positive voting right get no score.
    pub fn aggregate(
        &self,
        models: &UserModels,
        entities: &Entities,
        voting_rights: &VotingRights,
        criterion: &str,
        pool: &ThreadPool,
        cancel: &CancellationToken,
    ) -> ScoringResult<AggregationOutcome> {
        self.validate()?;
        let mut samples: BTreeMap<&str, Sample> = BTreeMap::new();
        for username in models.usernames() {
            for entity in entities.iter() {
                let right = voting_rights.get(username, &entity.entity_name, criterion);
                if right <= 0.0 {
                    continue;
                }
                let score = models.score(username, entity, criterion);
                if !score.is_nan() {
                    samples
                        .entry(entity.entity_name.as_str())
                        .or_default()
                        .push(score, right);
                }
            }
        }

        let tasks: Vec<(&str, &Sample)> = samples.iter().map(|(e, s)| (*e, s)).collect();
        let results: Vec<ScoringResult<Score>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|(_, sample)| {
                    cancel.check()?;
                    self.aggregate_sample(sample)
                })
                .collect()
        });
        cancel.check()?;

        let mut outcome = AggregationOutcome::default();
        for ((entity, _), result) in tasks.iter().zip(results) {
            match result {
                Ok(score) => {
                    outcome.scores.insert(entity.to_string(), score);
                }
                Err(e) if e.is_isolated() => {
                    tracing::warn!(entity, criterion, error = %e, "aggregation failed, entity skipped");
                    outcome
                        .failures
                        .push(TaskFailure::new(Stage::Aggregation, None, criterion, &e));
                }
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(criterion, n_entities = outcome.scores.len(), "entities aggregated");
        Ok(outcome)
    }
}
