//! Booster Configuration
//!
//! Defines the configuration used by the quantile booster.
use crate::config::ConfigIO;
use crate::errors::FlucastError;
use crate::tree::TreeParams;
use crate::utils::{validate_float_parameter, validate_fraction, validate_positive_count};
use serde::{Deserialize, Serialize};

fn default_log_iterations() -> usize {
    0
}
fn default_max_depth() -> Option<usize> {
    None
}
fn default_subsample() -> f64 {
    1.0
}

/// Configuration for the `QuantileBooster`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoosterConfig {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf output.
    pub learning_rate: f64,
    /// Maximum number of leaves per tree.
    pub num_leaves: usize,
    /// Maximum depth per tree, unlimited when `None`.
    #[serde(default = "default_max_depth")]
    pub max_depth: Option<usize>,
    /// Minimum number of rows in a leaf.
    pub min_data_in_leaf: usize,
    /// Minimum gain for a split to be made.
    pub min_split_gain: f64,
    /// Maximum number of bins for discretization.
    pub max_bin: u16,
    /// Share of rows sampled for each tree.
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    /// Logging frequency (every N iterations).
    #[serde(default = "default_log_iterations")]
    pub log_iterations: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        BoosterConfig {
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: None,
            min_data_in_leaf: 20,
            min_split_gain: 0.0,
            max_bin: 255,
            subsample: 1.0,
            log_iterations: 0,
        }
    }
}

impl BoosterConfig {
    pub fn validate(&self) -> Result<(), FlucastError> {
        validate_positive_count(self.n_estimators, "n_estimators")?;
        validate_positive_count(self.num_leaves, "num_leaves")?;
        validate_positive_count(usize::from(self.max_bin), "max_bin")?;
        validate_float_parameter(self.learning_rate, f64::MIN_POSITIVE, f64::INFINITY, "learning_rate")?;
        validate_float_parameter(self.min_split_gain, 0.0, f64::INFINITY, "min_split_gain")?;
        validate_fraction(self.subsample, "subsample")
    }

    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            num_leaves: self.num_leaves,
            max_depth: self.max_depth,
            min_data_in_leaf: self.min_data_in_leaf,
            min_split_gain: self.min_split_gain,
        }
    }
}

impl ConfigIO for BoosterConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_booster_config_default() {
        let config = BoosterConfig::default();
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.num_leaves, 31);
        assert_eq!(config.max_bin, 255);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_booster_config_json() {
        let config = BoosterConfig::default();
        let json = config.json_dump().unwrap();
        let config2 = BoosterConfig::from_json(&json).unwrap();
        assert_eq!(config, config2);

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("booster.json");
        config.save(&file_path).unwrap();
        assert_eq!(BoosterConfig::load(&file_path).unwrap(), config);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"n_estimators": 10, "learning_rate": 0.05, "num_leaves": 7, "min_data_in_leaf": 3, "min_split_gain": 0.0, "max_bin": 64}"#;
        let config = BoosterConfig::from_json(json).unwrap();
        assert_eq!(config.max_depth, None);
        assert_eq!(config.subsample, 1.0);
        assert_eq!(config.log_iterations, 0);
    }

    #[test]
    fn test_invalid_subsample() {
        let config = BoosterConfig {
            subsample: 0.0,
            ..BoosterConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
