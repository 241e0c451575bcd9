//! Aggregation into global scores
//!
//! The scaled scores of all users are aggregated entity by entity with a
//! Lipschitz-resilient quantile, then squashed.

mod quantile;
mod squash;

pub use quantile::*;
pub use squash::*;

/// Prelude for aggregation module
pub mod prelude {
    pub use super::{AggregationOutcome, EntitywiseQrQuantile, Squash};
}
