//! Prediction Methods
//!
//! Prediction and feature importance for a fitted booster.
use crate::config::ConfigIO;
use crate::data::Matrix;
use crate::model::FittedModel;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};

/// A booster fit at one quantile level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FittedQuantileBooster {
    pub quantile: f64,
    pub base_score: f64,
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl FittedModel for FittedQuantileBooster {
    fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
        let mut init_preds = vec![self.base_score; data.rows];
        self.trees.iter().for_each(|tree| {
            for (p_, val) in init_preds.iter_mut().zip(tree.predict(data)) {
                *p_ += val;
            }
        });
        init_preds
    }

    /// Total split gain per feature.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        let mut totals = vec![0.0; self.n_features];
        self.trees.iter().for_each(|t| t.accumulate_gain(&mut totals));
        Some(totals)
    }
}

impl ConfigIO for FittedQuantileBooster {}
