//! Checkpoint state
//!
//! A checkpoint holds everything a run produced, as flat tables, with the
//! settings that produced it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::rows::OutputTables;
use crate::config::PipelineConfig;
use crate::diagnostics::PipelineStats;
use crate::error::ScoringResult;
use crate::model::{ScoringModel, UserModels};
use crate::pipeline::PipelineResult;
use crate::poll::{Users, VotingRights};

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Saved outputs of a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Settings of the run
    pub config: Option<PipelineConfig>,
    /// Users with trust, scaler flags and thresholds
    pub users: Users,
    /// Output tables
    pub tables: OutputTables,
    /// Run statistics
    pub stats: Option<PipelineStats>,
    /// Custom metadata
    pub metadata: BTreeMap<String, String>,
}

impl PipelineCheckpoint {
    /// Checkpoint of the given outputs
    pub fn new(
        users: Users,
        user_models: &UserModels,
        voting_rights: &VotingRights,
        global_model: &ScoringModel,
    ) -> ScoringResult<Self> {
        Ok(Self {
            version: CHECKPOINT_VERSION,
            config: None,
            users,
            tables: OutputTables::from_outputs(user_models, voting_rights, global_model)?,
            stats: None,
            metadata: BTreeMap::new(),
        })
    }

    /// Checkpoint of a finished run
    pub fn from_result(result: &PipelineResult, config: &PipelineConfig) -> ScoringResult<Self> {
        Ok(Self::new(
            result.users.clone(),
            &result.user_models,
            &result.voting_rights,
            &result.global_model,
        )?
        .with_config(config.clone())
        .with_stats(result.stats.clone()))
    }

    /// Set the settings
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the statistics
    pub fn with_stats(mut self, stats: PipelineStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Add custom metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if checkpoint is compatible with current version
    pub fn is_compatible(&self) -> bool {
        self.version <= CHECKPOINT_VERSION
    }

    /// Rebuilt user models, usable as the starting point of a new run
    pub fn user_models(&self) -> ScoringResult<UserModels> {
        self.tables.user_models()
    }

    /// Rebuilt voting rights
    pub fn voting_rights(&self) -> VotingRights {
        self.tables.voting_rights()
    }

    /// Rebuilt global model
    pub fn global_model(&self) -> ScoringResult<ScoringModel> {
        self.tables.global_model()
    }
}
