use crate::binning::bin_matrix;
use crate::booster::config::BoosterConfig;
use crate::booster::predict::FittedQuantileBooster;
use crate::data::Matrix;
use crate::errors::FlucastError;
use crate::model::Trainable;
use crate::objective::QuantileLoss;
use crate::sampler::{RandomSampler, Sampler};
use crate::tree::Tree;
use crate::utils::validate_float_parameter;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Quantile Booster object
///
/// Holds only configuration; every call to [`fit`](Trainable::fit) returns a
/// new [`FittedQuantileBooster`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuantileBooster {
    pub cfg: BoosterConfig,
}

impl QuantileBooster {
    pub fn new(cfg: BoosterConfig) -> Self {
        QuantileBooster { cfg }
    }

    fn validate_inputs(&self, data: &Matrix<f64>, y: &[f64], quantile: f64) -> Result<(), FlucastError> {
        self.cfg.validate()?;
        validate_float_parameter(quantile, f64::MIN_POSITIVE, 1.0 - f64::EPSILON, "quantile")?;
        if data.rows == 0 {
            return Err(FlucastError::InvalidTrainingData("no training rows".to_string()));
        }
        if y.len() != data.rows {
            return Err(FlucastError::InvalidTrainingData(format!(
                "{} targets for {} rows",
                y.len(),
                data.rows
            )));
        }
        if let Some(v) = y.iter().find(|v| !v.is_finite()) {
            return Err(FlucastError::InvalidTrainingData(format!("non-finite target value {}", v)));
        }
        Ok(())
    }
}

impl Trainable for QuantileBooster {
    type Model = FittedQuantileBooster;

    fn fit(&self, data: &Matrix<f64>, y: &[f64], quantile: f64, seed: u64) -> Result<Self::Model, FlucastError> {
        self.validate_inputs(data, y, quantile)?;
        let start = Instant::now();

        let objective = QuantileLoss::new(quantile);
        let binned = bin_matrix(data, self.cfg.max_bin);
        let params = self.cfg.tree_params();
        let base_score = objective.initial_value(y);
        let mut yhat = vec![base_score; data.rows];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sampler = RandomSampler::new(self.cfg.subsample);
        let all_rows: Vec<usize> = (0..data.rows).collect();
        let mut trees = Vec::with_capacity(self.cfg.n_estimators);

        for i in 0..self.cfg.n_estimators {
            let grad = objective.gradient(y, &yhat);
            let mut index = if self.cfg.subsample < 1.0 {
                sampler.sample(&mut rng, &all_rows).0
            } else {
                all_rows.clone()
            };
            if index.is_empty() {
                continue;
            }

            let mut tree = Tree::grow(&binned, data.rows, &mut index, &grad, &params);
            if tree.nodes.len() == 1 {
                debug!("round {}: no split meets the requirements, stopping.", i);
                break;
            }
            let lr = self.cfg.learning_rate;
            tree.refit_leaves(&index, |rows| {
                let residuals: Vec<f64> = rows.iter().map(|r| y[*r] - yhat[*r]).collect();
                objective.leaf_value(&residuals) * lr
            });
            for (p_, val) in yhat.iter_mut().zip(tree.predict(data)) {
                *p_ += val;
            }

            if self.cfg.log_iterations > 0 && i % self.cfg.log_iterations == 0 {
                let loss = objective.loss(y, &yhat);
                info!(
                    "round {:0?}, tree.nodes: {:1?}, tree.depth: {:2?}, loss: {:3?}",
                    i,
                    tree.nodes.len(),
                    tree.depth(),
                    loss.iter().sum::<f32>() / loss.len() as f32,
                );
            }
            trees.push(tree);
        }

        if self.cfg.log_iterations > 0 {
            info!(
                "Finished training a booster with {0} trees in {1} seconds.",
                trees.len(),
                start.elapsed().as_secs()
            );
        }

        Ok(FittedQuantileBooster {
            quantile,
            base_score,
            n_features: data.cols,
            trees,
        })
    }
}
