/// Additive offset applied before the fourth root.
pub const TRANSFORM_OFFSET: f64 = 0.01;
/// Floor reference; its fourth power is added before the fourth root.
pub const TRANSFORM_FLOOR: f64 = 0.75;
/// Incidence rates are expressed per this many people.
pub const RATE_MULTIPLIER: f64 = 100_000.0;
/// Offset added to the per-series scale factor by the GBQ model.
pub const GBQ_SCALE_OFFSET: f64 = 0.01;
/// Internal horizon minus this value gives the reported horizon.
pub const HORIZON_OFFSET: i64 = 2;
pub const DAYS_PER_WEEK: i64 = 7;
pub const TARGET_LABEL: &str = "wk inc flu hosp";
pub const OUTPUT_TYPE_QUANTILE: &str = "quantile";
pub const DEFAULT_OUTPUT_SOURCE: &str = "hhs";
/// Model seeds are drawn uniformly from `[0, MODEL_SEED_UPPER)`.
pub const MODEL_SEED_UPPER: u64 = 100_000_000;
pub const IN_SEASON_FIRST_WEEK: u32 = 5;
pub const IN_SEASON_LAST_WEEK: u32 = 45;
/// Width of the christmas spike covariate, in weeks.
pub const XMAS_SPIKE_WIDTH: f64 = 3.0;
pub const MODEL_NAME_PREFIX: &str = "UMass-";
