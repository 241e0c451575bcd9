//! Scoring models
//!
//! A [`ScoringModel`] is a base (direct scores, or a linear model over
//! categories and embeddings) followed by an ordered list of
//! [`Composition`] operations. [`UserModels`] holds one model per user and
//! the scale layers they share.

mod scoring_model;
mod user_models;

pub use scoring_model::*;
pub use user_models::*;

/// Prelude for model module
pub mod prelude {
    pub use super::{Composition, ModelBase, ScoringModel, SharedScales, UserModels};
}
