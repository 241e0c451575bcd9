//! Preference learning
//!
//! This module turns the comparisons and ratings of one user on one
//! criterion into latent entity scores with uncertainties:
//!
//! - [`RootLaw`]: the family of likelihoods of a comparison given a score
//!   difference
//! - [`GbtProblem`]: the loss of one (user, criterion) fit
//! - [`GeneralizedBradleyTerry`]: the learner, run per user in parallel
//! - [`OnlineUpdater`]: cheap re-optimization after one comparison changed

mod gbt;
mod online;
mod problem;
mod root_law;

pub use gbt::*;
pub use online::*;
pub use problem::GbtProblem;
pub use root_law::*;

/// Prelude for preference module
pub mod prelude {
    pub use super::{
        GbtFit, GeneralizedBradleyTerry, LearningOutcome, OnlineUpdateReport, OnlineUpdater,
        RootLaw, ScoreTensor,
    };
}
