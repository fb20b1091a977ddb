//! Ensemble
//!
//! Bagged quantile regression. One model is fit for every (bag, quantile
//! level) pair on the training rows whose season is in the bag; each model
//! predicts its held-out rows and the test rows, and the test predictions
//! are reduced with the median over bags.
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{FeatureTable, Matrix};
use crate::errors::FlucastError;
use crate::model::{FittedModel, Trainable};
use crate::sampler::{SeasonalBaggingSampler, SeedPlan};
use crate::utils::{median, nan_median, pinball_loss, validate_quantile_levels};

/// Predictions indexed `[row, bag, quantile]`. Missing slots hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTensor {
    pub rows: usize,
    pub bags: usize,
    pub quantiles: usize,
    values: Vec<f64>,
}

impl PredictionTensor {
    pub fn missing(rows: usize, bags: usize, quantiles: usize) -> Self {
        PredictionTensor {
            rows,
            bags,
            quantiles,
            values: vec![f64::NAN; rows * bags * quantiles],
        }
    }

    #[inline]
    fn offset(&self, row: usize, bag: usize, quantile: usize) -> usize {
        (row * self.bags + bag) * self.quantiles + quantile
    }

    pub fn set(&mut self, row: usize, bag: usize, quantile: usize, value: f64) {
        let i = self.offset(row, bag, quantile);
        self.values[i] = value;
    }

    /// `None` for a slot that was never filled.
    pub fn get(&self, row: usize, bag: usize, quantile: usize) -> Option<f64> {
        let v = self.values[self.offset(row, bag, quantile)];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// All bag values for one (row, quantile), missing ones as NaN.
    pub fn bag_values(&self, row: usize, quantile: usize) -> Vec<f64> {
        (0..self.bags)
            .map(|b| self.values[self.offset(row, b, quantile)])
            .collect()
    }

    /// Median across bags, `[row][quantile]`. NaN where any bag is missing.
    pub fn median_over_bags(&self) -> Vec<Vec<f64>> {
        (0..self.rows)
            .map(|r| (0..self.quantiles).map(|q| median(&self.bag_values(r, q))).collect())
            .collect()
    }

    /// Median across the bags that hold a value, `[row][quantile]`.
    pub fn nan_median_over_bags(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.rows)
            .map(|r| (0..self.quantiles).map(|q| nan_median(&self.bag_values(r, q))).collect())
            .collect()
    }
}

/// Everything an ensemble run produces.
#[derive(Debug, Clone)]
pub struct EnsembleOutput {
    /// Median over bags, `[test row][quantile]`.
    pub test_quantiles: Vec<Vec<f64>>,
    pub test_by_bag: PredictionTensor,
    /// Out-of-bag predictions on the training rows.
    pub oob: PredictionTensor,
    pub plan: SeedPlan,
    /// Mean importance over bags, `[quantile][feature]`, when the learner reports it.
    pub feature_importance: Option<Vec<Vec<f64>>>,
}

impl EnsembleOutput {
    pub fn oob_median(&self) -> Vec<Vec<Option<f64>>> {
        self.oob.nan_median_over_bags()
    }

    /// Mean pinball loss of the out-of-bag median per quantile level, over the
    /// training rows held out by at least one bag. `None` when no row was.
    pub fn oob_pinball_loss(&self, y: &[f64], q_levels: &[f64]) -> Vec<Option<f64>> {
        let med = self.oob_median();
        q_levels
            .iter()
            .enumerate()
            .map(|(qi, q)| {
                let (y_obs, yhat): (Vec<f64>, Vec<f64>) = med
                    .iter()
                    .zip(y)
                    .filter_map(|(row, y_)| row[qi].map(|p| (*y_, p)))
                    .unzip();
                if y_obs.is_empty() {
                    None
                } else {
                    Some(pinball_loss(&y_obs, &yhat, *q))
                }
            })
            .collect()
    }
}

struct BagFit {
    bag: usize,
    quantile: usize,
    oob_preds: Vec<f64>,
    test_preds: Vec<f64>,
    importance: Option<Vec<f64>>,
}

/// Fits `num_bags` x `q_levels.len()` quantile models with a shared learner.
pub struct QuantileEnsembleTrainer<'a, M: Trainable> {
    pub learner: &'a M,
    pub sampler: SeasonalBaggingSampler,
    pub q_levels: Vec<f64>,
    pub num_threads: Option<usize>,
}

impl<'a, M: Trainable> QuantileEnsembleTrainer<'a, M> {
    pub fn new(learner: &'a M, sampler: SeasonalBaggingSampler, q_levels: &[f64]) -> Result<Self, FlucastError> {
        validate_quantile_levels(q_levels)?;
        Ok(QuantileEnsembleTrainer {
            learner,
            sampler,
            q_levels: q_levels.to_vec(),
            num_threads: None,
        })
    }

    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Fit every bag and quantile level and predict `test`.
    ///
    /// * `train` - Rows without a target are dropped; out-of-bag predictions
    ///   follow the order of the remaining rows.
    /// * `rng_seed` - Seed of the single stream that draws model seeds and bags.
    pub fn fit_predict(
        &self,
        train: &FeatureTable,
        test: &FeatureTable,
        rng_seed: u64,
    ) -> Result<EnsembleOutput, FlucastError> {
        let train = train.training_rows()?;
        if test.n_rows() == 0 {
            return Err(FlucastError::EmptyTestSet);
        }
        if test.n_features() != train.n_features() {
            return Err(FlucastError::ShapeMismatch(format!(
                "{} test features, {} training features",
                test.n_features(),
                train.n_features()
            )));
        }
        let y = train.targets();
        let seasons = train.seasons();
        let n_q = self.q_levels.len();
        let plan = SeedPlan::draw(rng_seed, &self.sampler, n_q, &seasons)?;

        // Row membership per bag.
        let memberships: Vec<(Vec<usize>, Vec<usize>)> = plan
            .bags
            .iter()
            .enumerate()
            .map(|(b, bag)| {
                let (in_bag, out_of_bag): (Vec<usize>, Vec<usize>) =
                    (0..train.n_rows()).partition(|i| bag.contains(&train.meta[*i].season));
                if out_of_bag.is_empty() {
                    warn!("bag {} holds every season; it has no out-of-bag rows", b + 1);
                }
                (in_bag, out_of_bag)
            })
            .collect();

        let tasks: Vec<(usize, usize)> = (0..self.sampler.num_bags())
            .flat_map(|b| (0..n_q).map(move |q| (b, q)))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads.unwrap_or(0))
            .build()
            .map_err(|e| {
                FlucastError::InvalidParameter("num_threads".to_string(), "a usable thread count".to_string(), e.to_string())
            })?;

        let train_matrix = train.matrix();
        let test_matrix = test.matrix();
        let fits: Vec<BagFit> = pool.install(|| {
            tasks
                .par_iter()
                .map(|(b, q)| {
                    let (in_bag, out_of_bag) = &memberships[*b];
                    self.fit_one(*b, *q, &plan, &train_matrix, &y, in_bag, out_of_bag, &test_matrix)
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut oob = PredictionTensor::missing(train.n_rows(), self.sampler.num_bags(), n_q);
        let mut test_by_bag = PredictionTensor::missing(test.n_rows(), self.sampler.num_bags(), n_q);
        let mut importance: Option<Vec<Vec<f64>>> = Some(vec![vec![0.0; train.n_features()]; n_q]);
        for fit in fits {
            let (_, out_of_bag) = &memberships[fit.bag];
            for (row, v) in out_of_bag.iter().zip(&fit.oob_preds) {
                oob.set(*row, fit.bag, fit.quantile, *v);
            }
            for (row, v) in fit.test_preds.iter().enumerate() {
                test_by_bag.set(row, fit.bag, fit.quantile, *v);
            }
            importance = match (importance, fit.importance) {
                (Some(mut totals), Some(imp)) => {
                    for (t, v) in totals[fit.quantile].iter_mut().zip(imp) {
                        *t += v / self.sampler.num_bags() as f64;
                    }
                    Some(totals)
                }
                _ => None,
            };
        }

        // Barrier: every bag has finished.
        let test_quantiles = test_by_bag.median_over_bags();
        Ok(EnsembleOutput {
            test_quantiles,
            test_by_bag,
            oob,
            plan,
            feature_importance: importance,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn fit_one(
        &self,
        b: usize,
        q: usize,
        plan: &SeedPlan,
        train: &Matrix<f64>,
        y: &[f64],
        in_bag: &[usize],
        out_of_bag: &[usize],
        test: &Matrix<f64>,
    ) -> Result<BagFit, FlucastError> {
        if q == 0 {
            info!("bag number {}", b + 1);
        }
        let q_level = self.q_levels[q];
        let seed = plan.model_seeds[b][q];
        let x_bag = train.select_rows(in_bag);
        let y_bag: Vec<f64> = in_bag.iter().map(|i| y[*i]).collect();
        let model = self
            .learner
            .fit(&Matrix::new(&x_bag, in_bag.len(), train.cols), &y_bag, q_level, seed)
            .map_err(|e| FlucastError::FitFailed {
                bag: b,
                quantile: q_level,
                reason: e.to_string(),
            })?;
        debug!("bag {}, quantile {}: fit on {} rows with seed {}", b + 1, q_level, in_bag.len(), seed);

        let oob_preds = if out_of_bag.is_empty() {
            Vec::new()
        } else {
            let x_oob = train.select_rows(out_of_bag);
            model.predict(&Matrix::new(&x_oob, out_of_bag.len(), train.cols))
        };
        Ok(BagFit {
            bag: b,
            quantile: q,
            oob_preds,
            test_preds: model.predict(test),
            importance: model.feature_importance(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booster::QuantileBooster;
    use crate::data::tests::meta;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Predicts the quantile level plus the seed's last digit; records fits.
    struct SeedEcho {
        fits: AtomicUsize,
    }

    struct SeedEchoModel {
        value: f64,
    }

    impl FittedModel for SeedEchoModel {
        fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
            vec![self.value; data.rows]
        }
    }

    impl Trainable for SeedEcho {
        type Model = SeedEchoModel;
        fn fit(&self, data: &Matrix<f64>, y: &[f64], quantile: f64, seed: u64) -> Result<Self::Model, FlucastError> {
            assert_eq!(data.rows, y.len());
            self.fits.fetch_add(1, Ordering::SeqCst);
            Ok(SeedEchoModel {
                value: quantile + (seed % 10) as f64,
            })
        }
    }

    struct AlwaysFails;

    impl Trainable for AlwaysFails {
        type Model = SeedEchoModel;
        fn fit(&self, _: &Matrix<f64>, _: &[f64], _: f64, _: u64) -> Result<Self::Model, FlucastError> {
            Err(FlucastError::InvalidTrainingData("degenerate bag".to_string()))
        }
    }

    /// `n_seasons` seasons of 10 weeks, one feature, target equal to the feature.
    fn table(n_seasons: usize) -> FeatureTable {
        let start = NaiveDate::from_ymd_opt(2015, 10, 3).unwrap();
        let mut m = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for s in 0..n_seasons {
            for w in 0..10 {
                let date = start + chrono::Duration::weeks((s * 52 + w) as i64);
                m.push(meta("01", &format!("season{}", s), 10 + w as u32, date));
                let v = (s * 10 + w) as f64;
                x.push(v);
                y.push(Some(v / 10.0));
            }
        }
        FeatureTable::new(vec!["x".to_string()], m, x, y).unwrap()
    }

    #[test]
    fn test_median_aggregation() {
        let mut t = PredictionTensor::missing(1, 5, 1);
        for (b, v) in [3.0, 1.0, 5.0, 2.0, 4.0].iter().enumerate() {
            t.set(0, b, 0, *v);
        }
        assert_eq!(t.median_over_bags(), vec![vec![3.0]]);
    }

    #[test]
    fn test_missing_slots() {
        let mut t = PredictionTensor::missing(2, 3, 1);
        t.set(0, 1, 0, 2.0);
        t.set(0, 2, 0, 4.0);
        assert_eq!(t.get(0, 0, 0), None);
        assert_eq!(t.get(0, 1, 0), Some(2.0));
        assert_eq!(t.nan_median_over_bags(), vec![vec![Some(3.0)], vec![None]]);
        assert!(t.median_over_bags()[0][0].is_nan());
    }

    #[test]
    fn test_every_pair_fit_and_oob_filled() {
        let learner = SeedEcho {
            fits: AtomicUsize::new(0),
        };
        let sampler = SeasonalBaggingSampler::new(6, 0.5).unwrap();
        let trainer = QuantileEnsembleTrainer::new(&learner, sampler, &[0.1, 0.5, 0.9]).unwrap();
        let train = table(4);
        let test = train.take_rows(&[39]);
        let out = trainer.fit_predict(&train, &test, 99).unwrap();
        assert_eq!(learner.fits.load(Ordering::SeqCst), 18);

        for b in 0..6 {
            let bag = &out.plan.bags[b];
            assert_eq!(bag.seasons.len(), 2);
            for r in 0..train.n_rows() {
                let held_out = !bag.contains(&train.meta[r].season);
                for q in 0..3 {
                    assert_eq!(out.oob.get(r, b, q).is_some(), held_out);
                }
            }
            for q in 0..3 {
                let expected = [0.1, 0.5, 0.9][q] + (out.plan.model_seeds[b][q] % 10) as f64;
                assert_eq!(out.test_by_bag.get(0, b, q), Some(expected));
            }
        }
        assert_eq!(out.test_quantiles.len(), 1);
        assert_eq!(out.test_quantiles[0].len(), 3);
        assert!(out.feature_importance.is_none());
    }

    #[test]
    fn test_full_fraction_leaves_oob_missing() {
        let learner = SeedEcho {
            fits: AtomicUsize::new(0),
        };
        let sampler = SeasonalBaggingSampler::new(3, 1.0).unwrap();
        let trainer = QuantileEnsembleTrainer::new(&learner, sampler, &[0.5]).unwrap();
        let train = table(3);
        let out = trainer.fit_predict(&train, &train.take_rows(&[0]), 1).unwrap();
        assert!(out.oob_median().iter().all(|row| row[0].is_none()));
        assert_eq!(out.oob_pinball_loss(&train.targets(), &[0.5]), vec![None]);
    }

    #[test]
    fn test_deterministic_and_thread_independent() {
        let booster = QuantileBooster::default().set_n_estimators(10).set_min_data_in_leaf(3);
        let sampler = SeasonalBaggingSampler::new(4, 0.7).unwrap();
        let train = table(5);
        let test = train.take_rows(&[5, 25, 45]);
        let one = QuantileEnsembleTrainer::new(&booster, sampler, &[0.25, 0.75])
            .unwrap()
            .set_num_threads(Some(1))
            .fit_predict(&train, &test, 1_700_000_000)
            .unwrap();
        let many = QuantileEnsembleTrainer::new(&booster, sampler, &[0.25, 0.75])
            .unwrap()
            .set_num_threads(Some(4))
            .fit_predict(&train, &test, 1_700_000_000)
            .unwrap();
        assert_eq!(one.plan, many.plan);
        assert_eq!(one.test_by_bag, many.test_by_bag);
        assert_eq!(one.test_quantiles, many.test_quantiles);

        let imp = one.feature_importance.as_ref().unwrap();
        assert_eq!(imp.len(), 2);
        assert_eq!(imp[0].len(), 1);

        let losses = one.oob_pinball_loss(&train.targets(), &[0.25, 0.75]);
        assert!(losses.iter().all(|l| l.map_or(false, |v| v >= 0.0)));
    }

    #[test]
    fn test_fit_failure_is_fatal() {
        let sampler = SeasonalBaggingSampler::new(2, 0.5).unwrap();
        let trainer = QuantileEnsembleTrainer::new(&AlwaysFails, sampler, &[0.5]).unwrap();
        let train = table(2);
        let res = trainer.fit_predict(&train, &train.take_rows(&[0]), 1);
        assert!(matches!(res, Err(FlucastError::FitFailed { .. })));
    }

    #[test]
    fn test_empty_target_is_fatal() {
        let learner = SeedEcho {
            fits: AtomicUsize::new(0),
        };
        let sampler = SeasonalBaggingSampler::new(2, 0.5).unwrap();
        let trainer = QuantileEnsembleTrainer::new(&learner, sampler, &[0.5]).unwrap();
        let mut train = table(2);
        train.delta_target = vec![None; train.n_rows()];
        let res = trainer.fit_predict(&train, &train.take_rows(&[0]), 1);
        assert!(matches!(res, Err(FlucastError::EmptyTrainingTarget)));
        assert_eq!(learner.fits.load(Ordering::SeqCst), 0);
    }
}
