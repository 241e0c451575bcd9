//! Score algebra
//!
//! [`Score`] is the scalar estimate with asymmetric uncertainty used
//! everywhere in the pipeline, and [`MultiScore`] is its keyed sparse table.

mod multiscore;
#[allow(clippy::module_inception)]
mod score;

pub use multiscore::*;
pub use score::*;

/// Prelude for score module
pub mod prelude {
    pub use super::multiscore::{Keys, MultiScore};
    pub use super::score::Score;
}
