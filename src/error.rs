//! Error types for collabscore
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Error type for score algebra and keyed score tables
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    /// A score was built with a negative (or NaN) uncertainty
    #[error("Negative uncertainty: left {left}, right {right}")]
    NegativeUncertainty { left: f64, right: f64 },

    /// Number of keys does not match the table depth
    #[error("Key depth mismatch: expected {expected}, got {actual}")]
    DepthMismatch { expected: usize, actual: usize },

    /// Keyname not present in the table
    #[error("Unknown keyname: {0}")]
    UnknownKeyname(String),

    /// Tables with different keyname sets were combined
    #[error("Keyname mismatch: expected {expected:?}, got {actual:?}")]
    KeynameMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

/// Error type for numerical solvers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// Root finding could not bracket a sign change
    #[error("No sign change in [{lower}, {upper}]")]
    NoBracket { lower: f64, upper: f64 },

    /// Iteration cap reached before convergence
    #[error("No convergence after {iterations} iterations (metric {metric:.3e})")]
    MaxIterations { iterations: usize, metric: f64 },

    /// Objective, gradient or iterate became NaN or infinite
    #[error("Non-finite value: {0}")]
    NonFinite(String),
}

/// Error type for checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// IO error during checkpoint
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Checkpoint version mismatch
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Checkpoint file not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Corrupted checkpoint data
    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),
}

/// Top-level error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed input row, duplicate key, bad configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough data to produce a result
    #[error("Unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// Optimizer failure (iteration cap, non-finite values)
    #[error("Convergence error: {0}")]
    Convergence(#[from] SolverError),

    /// Cooperative cancellation
    #[error("Cancelled")]
    Cancelled,

    /// Score algebra error
    #[error("Score error: {0}")]
    Score(#[from] ScoreError),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// IO error surfaced by a collaborator
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Is this error confined to one (user, criterion) fit?
    ///
    /// Such errors are recorded and skipped; the others abort the pipeline.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            PipelineError::Convergence(_) | PipelineError::Unsatisfiable(_)
        )
    }
}

/// Result type alias for pipeline operations
pub type ScoringResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_error_display() {
        let err = ScoreError::NegativeUncertainty {
            left: -1.0,
            right: 0.5,
        };
        assert_eq!(err.to_string(), "Negative uncertainty: left -1, right 0.5");

        let err = ScoreError::DepthMismatch {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Key depth mismatch: expected 2, got 1");
    }

    #[test]
    fn test_solver_error_display() {
        let err = SolverError::NoBracket {
            lower: -1.0,
            upper: 1.0,
        };
        assert_eq!(err.to_string(), "No sign change in [-1, 1]");

        let err = SolverError::MaxIterations {
            iterations: 100,
            metric: 0.5,
        };
        assert_eq!(
            err.to_string(),
            "No convergence after 100 iterations (metric 5.000e-1)"
        );
    }

    #[test]
    fn test_pipeline_error_from_solver_error() {
        let err: PipelineError = SolverError::NonFinite("gradient".to_string()).into();
        assert!(matches!(err, PipelineError::Convergence(_)));
        assert!(err.is_isolated());
    }

    #[test]
    fn test_pipeline_error_from_score_error() {
        let err: PipelineError = ScoreError::UnknownKeyname("height".to_string()).into();
        assert!(matches!(err, PipelineError::Score(_)));
        assert!(!err.is_isolated());
        assert!(!PipelineError::Cancelled.is_isolated());
    }
}
