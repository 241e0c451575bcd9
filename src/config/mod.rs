//! Pipeline configuration
//!
//! Every stage carries its own settings struct with the documented
//! defaults. [`PipelineConfig`] gathers them and loads from TOML:
//!
//! ```toml
//! max_workers = 4
//! seed = 7
//!
//! [preference_learning]
//! prior_std_dev = 7.0
//!
//! [mehestan]
//! min_activity = 10.0
//!
//! [aggregation]
//! quantile = 0.2
//! ```
//!
//! Missing keys take their default value.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregation::{EntitywiseQrQuantile, Squash};
use crate::error::{PipelineError, ScoringResult};
use crate::preference::GeneralizedBradleyTerry;
use crate::scaling::{CommonScaling, Mehestan, QuantileZeroShift, Standardize};
use crate::trust::TrustConfig;
use crate::voting_rights::AffineOvertrust;

/// Preference learning settings
pub type PreferenceLearningConfig = GeneralizedBradleyTerry;
/// Voting rights settings
pub type VotingRightsConfig = AffineOvertrust;
/// Collaborative scaling settings
pub type MehestanConfig = Mehestan;
/// Common zero-shift settings
pub type ZeroShiftConfig = QuantileZeroShift;
/// Common standardization settings
pub type StandardizeConfig = Standardize;
/// Aggregation settings
pub type AggregationConfig = EntitywiseQrQuantile;
/// Post-processing settings
pub type PostProcessConfig = Squash;

/// Settings of a whole pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-user model fitting
    pub preference_learning: PreferenceLearningConfig,
    /// Trust propagation
    pub trust: TrustConfig,
    /// Voting rights
    pub voting_rights: VotingRightsConfig,
    /// Mehestan scaling
    pub mehestan: MehestanConfig,
    /// Common zero shift, skipped when absent
    pub zero_shift: Option<ZeroShiftConfig>,
    /// Common standardization, skipped when absent
    pub standardize: Option<StandardizeConfig>,
    /// Entity-wise aggregation
    pub aggregation: AggregationConfig,
    /// Final squash
    pub post_process: PostProcessConfig,
    /// Worker threads, 0 for one per core
    pub max_workers: usize,
    /// Seed of every random draw
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preference_learning: PreferenceLearningConfig::default(),
            trust: TrustConfig::default(),
            voting_rights: VotingRightsConfig::default(),
            mehestan: MehestanConfig::default(),
            zero_shift: Some(ZeroShiftConfig::default()),
            standardize: Some(StandardizeConfig::default()),
            aggregation: AggregationConfig::default(),
            post_process: PostProcessConfig::default(),
            max_workers: 0,
            seed: 0,
        }
    }
}

impl PipelineConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preference learning settings
    pub fn with_preference_learning(mut self, config: PreferenceLearningConfig) -> Self {
        self.preference_learning = config;
        self
    }

    /// Set the trust propagation
    pub fn with_trust(mut self, config: TrustConfig) -> Self {
        self.trust = config;
        self
    }

    /// Set the voting rights settings
    pub fn with_voting_rights(mut self, config: VotingRightsConfig) -> Self {
        self.voting_rights = config;
        self
    }

    /// Set the Mehestan settings
    pub fn with_mehestan(mut self, config: MehestanConfig) -> Self {
        self.mehestan = config;
        self
    }

    /// Set or disable the common zero shift
    pub fn with_zero_shift(mut self, config: Option<ZeroShiftConfig>) -> Self {
        self.zero_shift = config;
        self
    }

    /// Set or disable the common standardization
    pub fn with_standardize(mut self, config: Option<StandardizeConfig>) -> Self {
        self.standardize = config;
        self
    }

    /// Set the aggregation settings
    pub fn with_aggregation(mut self, config: AggregationConfig) -> Self {
        self.aggregation = config;
        self
    }

    /// Set the post-processing settings
    pub fn with_post_process(mut self, config: PostProcessConfig) -> Self {
        self.post_process = config;
        self
    }

    /// Set the number of worker threads
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml(toml_str: &str) -> ScoringResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            PipelineError::InvalidArgument(format!("invalid configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ScoringResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> ScoringResult<String> {
        toml::to_string(self).map_err(|e| {
            PipelineError::InvalidArgument(format!("configuration not serializable: {}", e))
        })
    }

    /// Check every stage's settings
    pub fn validate(&self) -> ScoringResult<()> {
        self.preference_learning.validate()?;
        match &self.trust {
            TrustConfig::LipschiTrust(lipschitrust) => lipschitrust.validate()?,
            TrustConfig::NoPropagation => {}
        }
        self.voting_rights.validate()?;
        self.mehestan.validate()?;
        if let Some(zero_shift) = &self.zero_shift {
            zero_shift.validate()?;
        }
        if let Some(standardize) = &self.standardize {
            standardize.validate()?;
        }
        self.aggregation.validate()?;
        self.post_process.validate()?;
        Ok(())
    }
}

/// Prelude for config module
pub mod prelude {
    pub use super::{
        AggregationConfig, MehestanConfig, PipelineConfig, PostProcessConfig,
        PreferenceLearningConfig, StandardizeConfig, VotingRightsConfig, ZeroShiftConfig,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.preference_learning.prior_std_dev, 7.0);
        assert_eq!(config.mehestan.min_activity, 10.0);
        assert_eq!(config.mehestan.n_scalers_max, 100);
        assert_eq!(config.aggregation.quantile, 0.2);
        assert_eq!(config.post_process.score_max, 100.0);
        assert_eq!(config.zero_shift.as_ref().map(|z| z.zero_quantile), Some(0.15));
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            max_workers = 2
            seed = 11

            [mehestan]
            min_activity = 3.0

            [aggregation]
            quantile = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.seed, 11);
        assert_eq!(config.mehestan.min_activity, 3.0);
        assert_eq!(config.mehestan.lipschitz, 0.1);
        assert_eq!(config.aggregation.quantile, 0.5);
        assert_eq!(config.voting_rights.privacy_penalty, 0.5);
    }

    #[test]
    fn test_trust_selection() {
        let config = PipelineConfig::from_toml("trust = \"NoPropagation\"").unwrap();
        assert_eq!(config.trust, TrustConfig::NoPropagation);
        let config = PipelineConfig::from_toml("[trust.LipschiTrust]\ndecay = 0.5").unwrap();
        match config.trust {
            TrustConfig::LipschiTrust(l) => {
                assert_eq!(l.decay, 0.5);
                assert_eq!(l.sink_vouch, 5.0);
            }
            other => panic!("unexpected trust config {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_toml("[aggregation]\nquantile = 1.5").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
        let err = PipelineConfig::from_toml("max_workers = \"many\"").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let config = PipelineConfig::default().with_seed(3).with_max_workers(1);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();
        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.seed, 3);
        assert_eq!(loaded.max_workers, 1);
        assert_eq!(loaded.mehestan, config.mehestan);
    }
}
