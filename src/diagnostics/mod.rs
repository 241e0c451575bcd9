//! Diagnostics and statistics
//!
//! This module collects the statistics of a pipeline run: stage timings,
//! task counts and the per-(user, criterion) failures that were isolated
//! instead of aborting the run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Trust propagation
    Trust,
    /// Per-user preference learning
    PreferenceLearning,
    /// Voting-right assignment
    VotingRights,
    /// Collaborative scaling
    Scaling,
    /// Entity-wise aggregation
    Aggregation,
    /// Squashing
    PostProcess,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Trust => "trust",
            Stage::PreferenceLearning => "preference_learning",
            Stage::VotingRights => "voting_rights",
            Stage::Scaling => "scaling",
            Stage::Aggregation => "aggregation",
            Stage::PostProcess => "post_process",
        };
        f.write_str(name)
    }
}

/// A unit of work that failed without stopping the pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Stage where the task ran
    pub stage: Stage,
    /// User of the task, if any
    pub username: Option<String>,
    /// Criterion of the task
    pub criterion: String,
    /// Rendered error
    pub error: String,
}

impl TaskFailure {
    /// Record a failure
    pub fn new(stage: Stage, username: Option<&str>, criterion: &str, error: &PipelineError) -> Self {
        Self {
            stage,
            username: username.map(str::to_string),
            criterion: criterion.to_string(),
            error: error.to_string(),
        }
    }
}

/// Timing statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    /// Time per stage (ms)
    pub stages_ms: BTreeMap<Stage, f64>,
    /// Total run time (ms)
    pub total_ms: f64,
}

impl TimingStats {
    /// Create new timing stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a stage's time
    pub fn with_stage(mut self, stage: Stage, duration: Duration) -> Self {
        self.record(stage, duration);
        self
    }

    /// Record a stage's time, adding to any earlier record
    pub fn record(&mut self, stage: Stage, duration: Duration) {
        *self.stages_ms.entry(stage).or_insert(0.0) += duration.as_secs_f64() * 1000.0;
    }

    /// Set total time
    pub fn with_total(mut self, duration: Duration) -> Self {
        self.total_ms = duration.as_secs_f64() * 1000.0;
        self
    }

    /// Time of a stage (ms), zero if it did not run
    pub fn stage_ms(&self, stage: Stage) -> f64 {
        self.stages_ms.get(&stage).copied().unwrap_or(0.0)
    }
}

/// Statistics of a pipeline run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Users in the poll
    pub n_users: usize,
    /// Entities in the catalog
    pub n_entities: usize,
    /// Comparisons in the poll
    pub n_comparisons: usize,
    /// Criteria processed
    pub n_criteria: usize,
    /// Preference-learning fits attempted
    pub n_fits: usize,
    /// Scalers selected, per criterion
    pub n_scalers: BTreeMap<String, usize>,
    /// Entities with a global score, per criterion
    pub n_global_scores: BTreeMap<String, usize>,
    /// Isolated failures
    pub failures: Vec<TaskFailure>,
    /// Timing information
    pub timing: TimingStats,
}

impl PipelineStats {
    /// Create a new stats collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an isolated failure
    pub fn record_failure(&mut self, failure: TaskFailure) {
        self.failures.push(failure);
    }

    /// Number of isolated failures
    pub fn n_failures(&self) -> usize {
        self.failures.len()
    }

    /// Failures of one stage
    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &TaskFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// Set the total runtime
    pub fn set_runtime(&mut self, duration: Duration) {
        self.timing.total_ms = duration.as_secs_f64() * 1000.0;
    }

    /// Get a summary of the run
    pub fn summary(&self) -> String {
        let scalers: usize = self.n_scalers.values().sum();
        let scores: usize = self.n_global_scores.values().sum();
        format!(
            "Pipeline Summary:\n\
             - Users: {}\n\
             - Entities: {}\n\
             - Comparisons: {}\n\
             - Criteria: {}\n\
             - Fits: {} ({} failed)\n\
             - Scalers: {}\n\
             - Global scores: {}\n\
             - Runtime: {:.2}ms",
            self.n_users,
            self.n_entities,
            self.n_comparisons,
            self.n_criteria,
            self.n_fits,
            self.failures_in(Stage::PreferenceLearning).count(),
            scalers,
            scores,
            self.timing.total_ms,
        )
    }
}

/// Prelude for diagnostics module
pub mod prelude {
    pub use super::{PipelineStats, Stage, TaskFailure, TimingStats};
}
