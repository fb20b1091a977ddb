//! Model
//!
//! The capability seam between orchestration and the learning algorithm.
//! The ensemble only ever fits and predicts through these traits, so any
//! quantile learner can be plugged in.
use crate::data::Matrix;
use crate::errors::FlucastError;

/// A fitted model that maps feature rows to predictions.
pub trait FittedModel: Send {
    /// Predict one value per row of `data`.
    fn predict(&self, data: &Matrix<f64>) -> Vec<f64>;

    /// Importance of each feature, if the model tracks it.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        None
    }
}

/// A learner that fits one model per quantile level.
pub trait Trainable: Sync {
    type Model: FittedModel;

    /// Fit a model for quantile level `quantile` on `data` and target `y`.
    /// The same `seed` must always give the same model.
    fn fit(&self, data: &Matrix<f64>, y: &[f64], quantile: f64, seed: u64) -> Result<Self::Model, FlucastError>;
}
