//! Quantile Booster
//!
//! Gradient boosted regression trees fit to the pinball loss at a single
//! quantile level.

// public modules
pub mod config;
pub mod core;
pub mod predict;

// private modules
mod setters;

pub use self::config::BoosterConfig;
pub use self::core::QuantileBooster;
pub use self::predict::FittedQuantileBooster;
