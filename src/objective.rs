//! Quantile Loss function for quantile regression.
use serde::{Deserialize, Serialize};

use crate::utils::lower_quantile;

/// Quantile Loss (pinball loss), targets a specific quantile of the conditional distribution.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct QuantileLoss {
    /// Target quantile in `(0, 1)`. For example, `0.5` for the median.
    pub quantile: f64,
}

impl QuantileLoss {
    pub fn new(quantile: f64) -> Self {
        QuantileLoss { quantile }
    }

    /// Per-sample loss.
    #[inline]
    pub fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f32> {
        let q = self.quantile;
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let s = *y_ - *yhat_;
                let l = if s >= 0.0 { q * s } else { (q - 1.0) * s };
                l as f32
            })
            .collect()
    }

    /// Per-sample gradient. The hessian is constant.
    #[inline]
    pub fn gradient(&self, y: &[f64], yhat: &[f64]) -> Vec<f32> {
        let quantile = self.quantile as f32;
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| if yhat_ - y_ >= 0.0 { 1.0 - quantile } else { -quantile })
            .collect()
    }

    /// Initial prediction before any trees are added.
    pub fn initial_value(&self, y: &[f64]) -> f64 {
        lower_quantile(y, self.quantile)
    }

    /// Leaf output that minimizes the loss for the residuals `y - yhat` in the leaf.
    pub fn leaf_value(&self, residuals: &[f64]) -> f64 {
        if residuals.is_empty() {
            0.0
        } else {
            lower_quantile(residuals, self.quantile)
        }
    }
}
