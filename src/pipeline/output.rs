use crate::diagnostics::Stage;
use crate::error::ScoringResult;
use crate::model::{ScoringModel, UserModels};
use crate::poll::{Users, VotingRights};

/// Receives the tables of a run as stages complete
///
/// Every hook defaults to doing nothing. An error returned by a hook aborts
/// the run.
pub trait PipelineOutput {
    /// Users with their trust scores, after trust propagation
    fn on_trust(&mut self, _users: &Users) -> ScoringResult<()> {
        Ok(())
    }

    /// User models after a stage that changed them
    fn on_user_models(&mut self, _stage: Stage, _models: &UserModels) -> ScoringResult<()> {
        Ok(())
    }

    /// Assigned voting rights
    fn on_voting_rights(&mut self, _voting_rights: &VotingRights) -> ScoringResult<()> {
        Ok(())
    }

    /// Global model after a stage that changed it
    fn on_global_model(&mut self, _stage: Stage, _global: &ScoringModel) -> ScoringResult<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOutput;

impl PipelineOutput for NoOutput {}

/// Keeps the stages it was notified of, in order
#[derive(Clone, Debug, Default)]
pub struct StageLog {
    /// Notified stages
    pub stages: Vec<Stage>,
}

impl PipelineOutput for StageLog {
    fn on_trust(&mut self, _users: &Users) -> ScoringResult<()> {
        self.stages.push(Stage::Trust);
        Ok(())
    }

    fn on_user_models(&mut self, stage: Stage, _models: &UserModels) -> ScoringResult<()> {
        self.stages.push(stage);
        Ok(())
    }

    fn on_voting_rights(&mut self, _voting_rights: &VotingRights) -> ScoringResult<()> {
        self.stages.push(Stage::VotingRights);
        Ok(())
    }

    fn on_global_model(&mut self, stage: Stage, _global: &ScoringModel) -> ScoringResult<()> {
        self.stages.push(stage);
        Ok(())
    }
}
