//! Lipschitz-resilient statistics
//!
//! Robust estimators used by Mehestan scaling and by the final aggregation.
//! Each estimator bounds the influence that a single voter can have on its
//! output by a constant proportional to the voter's weight, the
//! Lipschitz constant.
//!
//! # Example
//!
//! ```rust
//! use collabscore::primitives::{qr_median, Sample};
//! use collabscore::score::Score;
//!
//! let sample = Sample::from_scores(vec![
//!     (Score::symmetric(1.0, 0.1), 1.0),
//!     (Score::symmetric(1.2, 0.1), 1.0),
//!     (Score::symmetric(50.0, 0.1), 1.0),
//! ]);
//! let median = qr_median(10.0, &sample, 0.0, 1e-6).unwrap();
//! assert!(median > 1.0 && median < 1.3);
//! ```

mod mean;
mod quantile;
mod sample;

pub use mean::*;
pub use quantile::*;
pub use sample::*;

/// Prelude for primitives module
pub mod prelude {
    pub use super::{
        clip_mean, lipschitz_resilient_mean, qr_median, qr_quantile, qr_standard_deviation,
        qr_uncertainty, Sample,
    };
}
