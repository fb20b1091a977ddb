//! Configuration
//!
//! Immutable settings for models and runs. Model variants are built from a
//! base record with `with_*` copies; nothing is ever changed in place.
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::booster::BoosterConfig;
use crate::constants::DEFAULT_OUTPUT_SOURCE;
use crate::data::{hub_quantile_levels, QuantileLevel};
use crate::errors::FlucastError;
use crate::sampler::SeasonalBaggingSampler;
use crate::transform::PowerTransform;
use crate::utils::{items_to_strings, validate_fraction, validate_positive_count, validate_quantile_levels};

/// IO
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FlucastError> {
        fs::write(path, self.json_dump()?).map_err(|e| FlucastError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object.
    fn json_dump(&self) -> Result<String, FlucastError> {
        serde_json::to_string(self).map_err(|e| FlucastError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    fn from_json(json_str: &str) -> Result<Self, FlucastError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| FlucastError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, FlucastError> {
        let json_str = fs::read_to_string(path).map_err(|e| FlucastError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

/// Settings for the bagged gradient boosting quantile model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbqConfig {
    pub model_name: String,
    pub num_bags: usize,
    pub bag_frac_samples: f64,
    pub sources: Vec<String>,
    /// Source whose rows are reported.
    pub output_source: String,
    pub power_transform: PowerTransform,
    /// Threads used to fit bags; rayon's default when `None`.
    pub num_threads: Option<usize>,
    pub booster: BoosterConfig,
}

impl Default for GbqConfig {
    fn default() -> Self {
        GbqConfig {
            model_name: "gbq_qr".to_string(),
            num_bags: 100,
            bag_frac_samples: 0.7,
            sources: vec!["flusurvnet".to_string(), "hhs".to_string(), "ilinet".to_string()],
            output_source: DEFAULT_OUTPUT_SOURCE.to_string(),
            power_transform: PowerTransform::FourthRoot,
            num_threads: None,
            booster: BoosterConfig::default(),
        }
    }
}

impl GbqConfig {
    pub const VARIANTS: [&'static str; 2] = ["gbq_qr", "gbq_qr_hhs_only"];

    /// Look up a named model variant.
    pub fn variant(name: &str) -> Result<Self, FlucastError> {
        let base = GbqConfig::default();
        match name {
            "gbq_qr" => Ok(base),
            "gbq_qr_hhs_only" => Ok(base
                .with_model_name(name)
                .with_bag_frac_samples(1.0)
                .with_sources(&["hhs"])),
            _ => Err(FlucastError::ParseString(
                name.to_string(),
                "model_name".to_string(),
                items_to_strings(&Self::VARIANTS),
            )),
        }
    }

    pub fn with_model_name(self, model_name: &str) -> Self {
        GbqConfig {
            model_name: model_name.to_string(),
            ..self
        }
    }

    pub fn with_num_bags(self, num_bags: usize) -> Self {
        GbqConfig { num_bags, ..self }
    }

    pub fn with_bag_frac_samples(self, bag_frac_samples: f64) -> Self {
        GbqConfig {
            bag_frac_samples,
            ..self
        }
    }

    pub fn with_sources(self, sources: &[&str]) -> Self {
        GbqConfig {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            ..self
        }
    }

    pub fn with_num_threads(self, num_threads: Option<usize>) -> Self {
        GbqConfig { num_threads, ..self }
    }

    pub fn with_booster(self, booster: BoosterConfig) -> Self {
        GbqConfig { booster, ..self }
    }

    pub fn validate(&self) -> Result<(), FlucastError> {
        validate_positive_count(self.num_bags, "num_bags")?;
        validate_fraction(self.bag_frac_samples, "bag_frac_samples")?;
        self.booster.validate()
    }

    pub fn sampler(&self) -> Result<SeasonalBaggingSampler, FlucastError> {
        SeasonalBaggingSampler::new(self.num_bags, self.bag_frac_samples)
    }
}

impl ConfigIO for GbqConfig {}

/// How SARIX parameters are shared across locations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    None,
    Shared,
}

impl std::str::FromStr for Pooling {
    type Err = FlucastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Pooling::None),
            "shared" => Ok(Pooling::Shared),
            _ => Err(FlucastError::ParseString(
                s.to_string(),
                "Pooling".to_string(),
                items_to_strings(&["none", "shared"]),
            )),
        }
    }
}

/// Exogenous series fed to the SARIX model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Covariate {
    XmasSpike,
}

/// Settings for the seasonal autoregressive model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SarixConfig {
    pub model_name: String,
    pub sources: Vec<String>,
    pub fit_locations_separately: bool,
    pub p: usize,
    #[serde(rename = "P")]
    pub seasonal_p: usize,
    pub d: usize,
    #[serde(rename = "D")]
    pub seasonal_d: usize,
    pub season_period: usize,
    pub power_transform: PowerTransform,
    pub theta_pooling: Pooling,
    pub sigma_pooling: Pooling,
    pub covariates: Vec<Covariate>,
}

impl Default for SarixConfig {
    fn default() -> Self {
        SarixConfig {
            model_name: "sarix".to_string(),
            sources: vec![DEFAULT_OUTPUT_SOURCE.to_string()],
            fit_locations_separately: false,
            p: 1,
            seasonal_p: 0,
            d: 0,
            seasonal_d: 0,
            season_period: 1,
            power_transform: PowerTransform::None,
            theta_pooling: Pooling::Shared,
            sigma_pooling: Pooling::None,
            covariates: vec![Covariate::XmasSpike],
        }
    }
}

impl SarixConfig {
    /// Parse a variant name such as `sarix_p4_4rt_thetashared_sigmanone_xmas_spike`.
    pub fn variant(name: &str) -> Result<Self, FlucastError> {
        let bad_name = || {
            FlucastError::ParseString(
                name.to_string(),
                "model_name".to_string(),
                "sarix_p{order}_{none|4rt}_theta{none|shared}_sigma{none|shared}[_xmas_spike]".to_string(),
            )
        };
        let (stem, covariates) = match name.strip_suffix("_xmas_spike") {
            Some(stem) => (stem, vec![Covariate::XmasSpike]),
            None => (name, vec![]),
        };
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 5 || parts[0] != "sarix" {
            return Err(bad_name());
        }
        let p = parts[1]
            .strip_prefix('p')
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(bad_name)?;
        let power_transform = parts[2].parse::<PowerTransform>()?;
        let theta_pooling = parts[3].strip_prefix("theta").ok_or_else(bad_name)?.parse::<Pooling>()?;
        let sigma_pooling = parts[4].strip_prefix("sigma").ok_or_else(bad_name)?.parse::<Pooling>()?;
        Ok(SarixConfig {
            model_name: name.to_string(),
            p,
            power_transform,
            theta_pooling,
            sigma_pooling,
            covariates,
            ..SarixConfig::default()
        })
    }

    pub fn with_p(self, p: usize) -> Self {
        SarixConfig { p, ..self }
    }

    pub fn with_power_transform(self, power_transform: PowerTransform) -> Self {
        SarixConfig {
            power_transform,
            ..self
        }
    }

    pub fn with_theta_pooling(self, theta_pooling: Pooling) -> Self {
        SarixConfig { theta_pooling, ..self }
    }

    pub fn with_covariates(self, covariates: Vec<Covariate>) -> Self {
        SarixConfig { covariates, ..self }
    }

    pub fn with_fit_locations_separately(self, fit_locations_separately: bool) -> Self {
        SarixConfig {
            fit_locations_separately,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), FlucastError> {
        validate_positive_count(self.season_period, "season_period")?;
        if self.p + self.seasonal_p == 0 && self.covariates.is_empty() {
            return Err(FlucastError::InvalidParameter(
                "p".to_string(),
                "at least one autoregressive lag or covariate".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

impl ConfigIO for SarixConfig {}

/// Posterior sampler effort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct McmcSettings {
    pub num_warmup: usize,
    pub num_samples: usize,
    pub num_chains: usize,
}

/// Settings for one forecast run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub ref_date: NaiveDate,
    pub max_horizon: i64,
    pub quantiles: Vec<QuantileLevel>,
    pub output_root: PathBuf,
    pub artifact_store_root: PathBuf,
    pub save_feat_importance: bool,
    pub mcmc: McmcSettings,
}

impl RunConfig {
    /// Full run: 23 hub quantile levels out to five weeks.
    pub fn full(ref_date: NaiveDate) -> Self {
        RunConfig {
            ref_date,
            max_horizon: 5,
            quantiles: hub_quantile_levels(),
            output_root: PathBuf::from("../../submissions-hub/model-output"),
            artifact_store_root: PathBuf::from("../../submissions-hub/model-artifacts"),
            save_feat_importance: false,
            mcmc: McmcSettings {
                num_warmup: 1000,
                num_samples: 1000,
                num_chains: 1,
            },
        }
    }

    /// Short run for smoke testing: three quantile levels out to three weeks.
    pub fn short(ref_date: NaiveDate) -> Self {
        RunConfig {
            max_horizon: 3,
            quantiles: QuantileLevel::from_levels(&[0.025, 0.5, 0.975]),
            mcmc: McmcSettings {
                num_warmup: 200,
                num_samples: 200,
                num_chains: 1,
            },
            ..RunConfig::full(ref_date)
        }
    }

    pub fn with_quantiles(self, quantiles: Vec<QuantileLevel>) -> Self {
        RunConfig { quantiles, ..self }
    }

    pub fn with_max_horizon(self, max_horizon: i64) -> Self {
        RunConfig { max_horizon, ..self }
    }

    pub fn with_output_root<P: AsRef<Path>>(self, output_root: P) -> Self {
        RunConfig {
            output_root: output_root.as_ref().to_path_buf(),
            ..self
        }
    }

    pub fn with_artifact_store_root<P: AsRef<Path>>(self, artifact_store_root: P) -> Self {
        RunConfig {
            artifact_store_root: artifact_store_root.as_ref().to_path_buf(),
            ..self
        }
    }

    pub fn with_save_feat_importance(self, save_feat_importance: bool) -> Self {
        RunConfig {
            save_feat_importance,
            ..self
        }
    }

    pub fn q_levels(&self) -> Vec<f64> {
        self.quantiles.iter().map(|q| q.level).collect()
    }

    pub fn validate(&self) -> Result<(), FlucastError> {
        validate_quantile_levels(&self.q_levels())?;
        if self.max_horizon < 0 {
            return Err(FlucastError::InvalidParameter(
                "max_horizon".to_string(),
                "integer of at least 0".to_string(),
                self.max_horizon.to_string(),
            ));
        }
        Ok(())
    }
}

impl ConfigIO for RunConfig {}

/// The first Saturday strictly after `today`; weekly forecasts are relative to it.
pub fn next_saturday(today: NaiveDate) -> NaiveDate {
    let days_from_monday = i64::from(today.weekday().num_days_from_monday());
    today + Duration::days(7 - (days_from_monday + 2) % 7)
}

/// Resolve the reference date of a run: a given date must be a Saturday,
/// a missing one defaults to the first Saturday after `today`.
pub fn resolve_ref_date(ref_date: Option<NaiveDate>, today: NaiveDate) -> Result<NaiveDate, FlucastError> {
    match ref_date {
        None => Ok(next_saturday(today)),
        Some(d) if d.weekday() == Weekday::Sat => Ok(d),
        Some(d) => Err(FlucastError::InvalidReferenceDate(
            d.to_string(),
            "ref_date must be a Saturday".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbq_variants() {
        let base = GbqConfig::variant("gbq_qr").unwrap();
        assert_eq!(base.num_bags, 100);
        assert_eq!(base.bag_frac_samples, 0.7);

        let hhs = GbqConfig::variant("gbq_qr_hhs_only").unwrap();
        assert_eq!(hhs.model_name, "gbq_qr_hhs_only");
        assert_eq!(hhs.bag_frac_samples, 1.0);
        assert_eq!(hhs.sources, vec!["hhs".to_string()]);
        assert_eq!(hhs.num_bags, base.num_bags);
        assert!(GbqConfig::variant("gbq_unknown").is_err());
    }

    #[test]
    fn test_overrides_do_not_touch_base() {
        let base = GbqConfig::default();
        let small = base.clone().with_num_bags(5);
        assert_eq!(base.num_bags, 100);
        assert_eq!(small.num_bags, 5);
    }

    #[test]
    fn test_gbq_validation() {
        assert!(GbqConfig::default().validate().is_ok());
        assert!(GbqConfig::default().with_bag_frac_samples(0.0).validate().is_err());
        assert!(GbqConfig::default().with_bag_frac_samples(1.01).validate().is_err());
        assert!(GbqConfig::default().with_num_bags(0).validate().is_err());
    }

    #[test]
    fn test_sarix_variant_parsing() {
        let cfg = SarixConfig::variant("sarix_p4_4rt_thetashared_sigmanone_xmas_spike").unwrap();
        assert_eq!(cfg.p, 4);
        assert_eq!(cfg.power_transform, PowerTransform::FourthRoot);
        assert_eq!(cfg.theta_pooling, Pooling::Shared);
        assert_eq!(cfg.sigma_pooling, Pooling::None);
        assert_eq!(cfg.covariates, vec![Covariate::XmasSpike]);

        let cfg = SarixConfig::variant("sarix_p8_4rt_thetanone_sigmanone").unwrap();
        assert_eq!(cfg.p, 8);
        assert_eq!(cfg.theta_pooling, Pooling::None);
        assert!(cfg.covariates.is_empty());

        assert!(SarixConfig::variant("sarix_px_4rt_thetanone_sigmanone").is_err());
        assert!(SarixConfig::variant("sarix_p2_cube_thetanone_sigmanone").is_err());
        assert!(SarixConfig::variant("arima_p2_4rt_thetanone_sigmanone").is_err());
    }

    #[test]
    fn test_sarix_json_field_names() {
        let json = SarixConfig::default().json_dump().unwrap();
        assert!(json.contains("\"P\":0"));
        assert!(json.contains("\"theta_pooling\":\"shared\""));
        assert!(json.contains("\"covariates\":[\"xmas_spike\"]"));
        assert_eq!(SarixConfig::from_json(&json).unwrap(), SarixConfig::default());
    }

    #[test]
    fn test_run_configs() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let full = RunConfig::full(d);
        assert_eq!(full.max_horizon, 5);
        assert_eq!(full.quantiles.len(), 23);
        assert!(full.validate().is_ok());

        let short = RunConfig::short(d);
        assert_eq!(short.max_horizon, 3);
        assert_eq!(short.q_levels(), vec![0.025, 0.5, 0.975]);
        assert_eq!(short.mcmc.num_samples, 200);
        assert_eq!(short.output_root, full.output_root);
    }

    #[test]
    fn test_next_saturday() {
        // 2024-01-03 is a Wednesday.
        let wed = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(next_saturday(wed), NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        let sat = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(next_saturday(sat), NaiveDate::from_ymd_opt(2024, 1, 13).unwrap());
        let sun = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(next_saturday(sun), NaiveDate::from_ymd_opt(2024, 1, 13).unwrap());
    }

    #[test]
    fn test_resolve_ref_date() {
        let wed = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let sat = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(resolve_ref_date(None, wed).unwrap(), sat);
        assert_eq!(resolve_ref_date(Some(sat), wed).unwrap(), sat);
        assert!(matches!(
            resolve_ref_date(Some(wed), wed),
            Err(FlucastError::InvalidReferenceDate(_, _))
        ));
    }
}
