//! Pipeline sequencer
//!
//! Runs the stages in order on a bounded worker pool:
//!
//! 1. trust propagation over the vouches;
//! 2. preference learning for every (user, criterion);
//! 3. voting rights;
//! 4. per criterion, Mehestan scaling followed by the common zero shift and
//!    standardization layers;
//! 5. entity-wise aggregation into the global model;
//! 6. squash.
//!
//! Stages are separated by barriers: all tasks of a stage are merged, in
//! sorted key order, before the next one starts.
//!
//! # Example
//!
//! ```rust
//! use collabscore::prelude::*;
//!
//! let users = Users::from_rows(vec![User::new("alice").with_trust(1.0)]).unwrap();
//! let entities = Entities::from_names(&["a", "b"]).unwrap();
//! let comparisons =
//!     Comparisons::from_rows(vec![Comparison::new("alice", "q", "a", "b", 5.0, 10.0)]).unwrap();
//! let poll = Poll::new(users, entities).with_comparisons(comparisons);
//!
//! let pipeline = Pipeline::new(PipelineConfig::default().with_max_workers(1)).unwrap();
//! let result = pipeline.run(&poll, &CancellationToken::new()).unwrap();
//! assert_eq!(result.user_models.len(), 1);
//! ```

mod cancel;
mod output;

pub use cancel::*;
pub use output::*;

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::diagnostics::{PipelineStats, Stage};
use crate::error::{PipelineError, ScoringResult};
use crate::model::{ScoringModel, UserModels};
use crate::poll::{Poll, Users, VotingRights};
use crate::scaling::CommonScaling;
use crate::trust::TrustPropagation;
use crate::voting_rights::VotingRightsAssignment;

/// Everything a run produces
#[derive(Clone, Debug)]
pub struct PipelineResult {
    /// Users with trust, scaler flags, activities and thresholds
    pub users: Users,
    /// Personal models with their scale and squash layers
    pub user_models: UserModels,
    /// Voting rights
    pub voting_rights: VotingRights,
    /// Global scores, keyed `(entity_name, criterion)`
    pub global_model: ScoringModel,
    /// Counts, timings and isolated failures
    pub stats: PipelineStats,
}

/// Configured pipeline with its worker pool
pub struct Pipeline {
    config: PipelineConfig,
    pool: ThreadPool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl Pipeline {
    /// Validate the config and start the worker pool
    pub fn new(config: PipelineConfig) -> ScoringResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|i| format!("collabscore-{}", i))
            .build()
            .map_err(|e| PipelineError::InvalidArgument(format!("cannot start workers: {}", e)))?;
        Ok(Self { config, pool })
    }

    /// Settings of the pipeline
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a poll
    pub fn run(&self, poll: &Poll, cancel: &CancellationToken) -> ScoringResult<PipelineResult> {
        self.run_with(poll, None, cancel, &mut NoOutput)
    }

    /// Run every stage, starting the fits from `previous` models and
    /// reporting the tables to `output`
    pub fn run_with(
        &self,
        poll: &Poll,
        previous: Option<&UserModels>,
        cancel: &CancellationToken,
        output: &mut dyn PipelineOutput,
    ) -> ScoringResult<PipelineResult> {
        let start = Instant::now();
        poll.validate()?;
        let mut poll = poll.clone();
        let mut stats = PipelineStats {
            n_users: poll.users.len(),
            n_entities: poll.entities.len(),
            n_comparisons: poll.comparisons.len(),
            ..PipelineStats::new()
        };
        tracing::info!(
            n_users = stats.n_users,
            n_entities = stats.n_entities,
            n_comparisons = stats.n_comparisons,
            workers = self.pool.current_num_threads(),
            "pipeline started"
        );

        let stage_start = Instant::now();
        self.config.trust.apply(&mut poll.users, &poll.vouches)?;
        self.finish_stage(&mut stats, Stage::Trust, stage_start, cancel)?;
        output.on_trust(&poll.users)?;

        let stage_start = Instant::now();
        let learned = self
            .config
            .preference_learning
            .learn(&poll, previous, &self.pool, cancel)?;
        learned.apply_thresholds(&mut poll.users);
        stats.n_fits = learned.n_fits;
        stats.failures.extend(learned.failures);
        let mut user_models = learned.user_models;
        self.finish_stage(&mut stats, Stage::PreferenceLearning, stage_start, cancel)?;
        output.on_user_models(Stage::PreferenceLearning, &user_models)?;

        let stage_start = Instant::now();
        let voting_rights = self.config.voting_rights.assign(&poll)?;
        self.finish_stage(&mut stats, Stage::VotingRights, stage_start, cancel)?;
        output.on_voting_rights(&voting_rights)?;

        let criteria: Vec<String> = poll.criteria().into_iter().collect();
        stats.n_criteria = criteria.len();

        let stage_start = Instant::now();
        let height = user_models.next_height();
        for criterion in &criteria {
            let scaled = self.config.mehestan.scale(
                &mut user_models,
                &poll.users,
                &poll.entities,
                &poll.made_public,
                criterion,
                height,
                self.config.seed,
                &self.pool,
                cancel,
            )?;
            scaled.apply(&mut poll.users, criterion);
            stats.n_scalers.insert(criterion.clone(), scaled.scalers.len());
            stats.failures.extend(scaled.failures);

            if let Some(zero_shift) = &self.config.zero_shift {
                zero_shift.apply(
                    &mut user_models,
                    &poll.entities,
                    &voting_rights,
                    criterion,
                    height + 1,
                )?;
            }
            if let Some(standardize) = &self.config.standardize {
                standardize.apply(
                    &mut user_models,
                    &poll.entities,
                    &voting_rights,
                    criterion,
                    height + 2,
                )?;
            }
            cancel.check()?;
        }
        self.finish_stage(&mut stats, Stage::Scaling, stage_start, cancel)?;
        output.on_user_models(Stage::Scaling, &user_models)?;

        let stage_start = Instant::now();
        let mut global_model = ScoringModel::direct();
        for criterion in &criteria {
            let aggregated = self.config.aggregation.aggregate(
                &user_models,
                &poll.entities,
                &voting_rights,
                criterion,
                &self.pool,
                cancel,
            )?;
            aggregated.write_into(&mut global_model, criterion)?;
            stats
                .n_global_scores
                .insert(criterion.clone(), aggregated.scores.len());
            stats.failures.extend(aggregated.failures);
        }
        self.finish_stage(&mut stats, Stage::Aggregation, stage_start, cancel)?;
        output.on_global_model(Stage::Aggregation, &global_model)?;

        let stage_start = Instant::now();
        let global_model = self
            .config
            .post_process
            .apply(&mut user_models, &global_model)?;
        self.finish_stage(&mut stats, Stage::PostProcess, stage_start, cancel)?;
        output.on_user_models(Stage::PostProcess, &user_models)?;
        output.on_global_model(Stage::PostProcess, &global_model)?;

        stats.set_runtime(start.elapsed());
        tracing::info!(
            runtime_ms = stats.timing.total_ms,
            n_failures = stats.n_failures(),
            "pipeline finished"
        );
        Ok(PipelineResult {
            users: poll.users,
            user_models,
            voting_rights,
            global_model,
            stats,
        })
    }

    fn finish_stage(
        &self,
        stats: &mut PipelineStats,
        stage: Stage,
        stage_start: Instant,
        cancel: &CancellationToken,
    ) -> ScoringResult<()> {
        let elapsed = stage_start.elapsed();
        stats.timing.record(stage, elapsed);
        tracing::info!(%stage, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "stage finished");
        cancel.check()
    }
}

/// Prelude for pipeline module
pub mod prelude {
    pub use super::{
        CancellationToken, NoOutput, Pipeline, PipelineOutput, PipelineResult, StageLog,
    };
}
