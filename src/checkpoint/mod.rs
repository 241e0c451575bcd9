//! Output persistence
//!
//! The outputs of a run are flattened into row tables ([`OutputTables`]),
//! wrapped in a versioned [`PipelineCheckpoint`] and saved as JSON or
//! bincode. Loading rebuilds the user models, voting rights and global
//! model from the rows.

mod recovery;
mod rows;
mod state;

pub use recovery::*;
pub use rows::*;
pub use state::*;

/// Prelude for checkpoint module
pub mod prelude {
    pub use super::recovery::*;
    pub use super::rows::OutputTables;
    pub use super::state::*;
}
