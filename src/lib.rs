//! # collabscore
//!
//! Collaborative preference aggregation for Rust.
//!
//! Users compare entities of a shared catalog on one or several criteria.
//! This library turns those comparisons into scores:
//!
//! - **Personal models**: a generalized Bradley–Terry model per user and
//!   criterion, with asymmetric uncertainties derived from the loss shape
//! - **Collaborative scaling**: Mehestan maps every personal scale onto a
//!   common one, with bounded influence of any single user
//! - **Resilient aggregation**: trust-weighted, overtrust-bounded voting
//!   rights and Lipschitz-resilient quantiles give one global score per
//!   entity
//!
//! ## Quick Start
//!
//! ```rust
//! use collabscore::prelude::*;
//!
//! let users = Users::from_rows(vec![
//!     User::new("alice").with_trust(1.0),
//!     User::new("bob").with_trust(1.0),
//! ])
//! .unwrap();
//! let entities = Entities::from_names(&["x", "y", "z"]).unwrap();
//! let comparisons = Comparisons::from_rows(vec![
//!     Comparison::new("alice", "quality", "x", "y", 6.0, 10.0),
//!     Comparison::new("alice", "quality", "y", "z", 4.0, 10.0),
//!     Comparison::new("bob", "quality", "x", "z", 8.0, 10.0),
//! ])
//! .unwrap();
//! let poll = Poll::new(users, entities).with_comparisons(comparisons);
//!
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//! let result = pipeline.run(&poll, &CancellationToken::new()).unwrap();
//! println!("{}", result.stats.summary());
//! ```

pub mod aggregation;
pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod poll;
pub mod preference;
pub mod primitives;
pub mod scaling;
pub mod score;
pub mod solvers;
pub mod trust;
pub mod voting_rights;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregation::prelude::*;
    pub use crate::checkpoint::prelude::*;
    pub use crate::config::prelude::*;
    pub use crate::diagnostics::prelude::*;
    pub use crate::error::*;
    pub use crate::model::prelude::*;
    pub use crate::pipeline::prelude::*;
    pub use crate::poll::prelude::*;
    pub use crate::preference::prelude::*;
    pub use crate::primitives::prelude::*;
    pub use crate::scaling::prelude::*;
    pub use crate::score::prelude::*;
    pub use crate::solvers::prelude::*;
    pub use crate::trust::prelude::*;
    pub use crate::voting_rights::prelude::*;
}
