//! GBQ
//!
//! The bagged gradient boosting quantile model, from a prepared modelling
//! table to hub submission rows.
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use crate::booster::QuantileBooster;
use crate::config::{GbqConfig, RunConfig};
use crate::data::{FeatureTable, ObservationMeta};
use crate::ensemble::{EnsembleOutput, QuantileEnsembleTrainer};
use crate::errors::FlucastError;
use crate::io::{build_save_path, write_feature_importance, write_submission};
use crate::model::Trainable;
use crate::noncrossing::QuantileNoncrossingEnforcer;
use crate::rescale::InverseRescaler;
use crate::sampler::seed_from_date;
use crate::submission::{QuantileRow, SubmissionFormatter};

/// Result of one GBQ run.
#[derive(Debug, Clone)]
pub struct GbqForecast {
    pub rows: Vec<QuantileRow>,
    pub ensemble: EnsembleOutput,
    pub feature_names: Vec<String>,
    /// Training rows in the order of the out-of-bag predictions.
    pub train_meta: Vec<ObservationMeta>,
    pub train_targets: Vec<f64>,
}

impl GbqForecast {
    /// Write the submission file and, when requested, the feature importance
    /// table. Returns the submission path.
    pub fn save(&self, model_cfg: &GbqConfig, run_cfg: &RunConfig) -> Result<PathBuf, FlucastError> {
        let path = build_save_path(&run_cfg.output_root, &model_cfg.model_name, run_cfg.ref_date, None);
        write_submission(&path, &self.rows)?;
        if run_cfg.save_feat_importance {
            if let Some(importance) = &self.ensemble.feature_importance {
                let fi_path = build_save_path(
                    &run_cfg.artifact_store_root,
                    &model_cfg.model_name,
                    run_cfg.ref_date,
                    Some("feat_importance"),
                );
                let labels: Vec<String> = run_cfg.quantiles.iter().map(|q| q.label.clone()).collect();
                write_feature_importance(fi_path, &self.feature_names, &labels, importance)?;
            }
        }
        Ok(path)
    }

    /// Mean out-of-bag pinball loss per quantile level.
    pub fn oob_pinball_loss(&self, run_cfg: &RunConfig) -> Vec<Option<f64>> {
        self.ensemble.oob_pinball_loss(&self.train_targets, &run_cfg.q_levels())
    }
}

/// Fit the ensemble on `table` and produce submission rows.
pub fn run_gbq<M: Trainable>(
    table: &FeatureTable,
    model_cfg: &GbqConfig,
    run_cfg: &RunConfig,
    learner: &M,
) -> Result<GbqForecast, FlucastError> {
    model_cfg.validate()?;
    run_cfg.validate()?;
    let start = Instant::now();

    let table = table
        .from_sources(&model_cfg.sources)
        .in_season()
        .up_to_horizon(run_cfg.max_horizon);
    let test = table.test_rows()?;
    let train = table.training_rows()?;
    info!(
        "{}: {} training rows over {} seasons, {} test rows",
        model_cfg.model_name,
        train.n_rows(),
        train.seasons().len(),
        test.n_rows()
    );

    let trainer = QuantileEnsembleTrainer::new(learner, model_cfg.sampler()?, &run_cfg.q_levels())?
        .set_num_threads(model_cfg.num_threads);
    let ensemble = trainer.fit_predict(&train, &test, seed_from_date(run_cfg.ref_date))?;

    let (meta, deltas): (Vec<ObservationMeta>, Vec<Vec<f64>>) = test
        .meta
        .iter()
        .zip(&ensemble.test_quantiles)
        .filter(|(m, _)| m.source == model_cfg.output_source)
        .map(|(m, q)| (m.clone(), q.clone()))
        .unzip();
    let values = InverseRescaler::gbq(model_cfg.power_transform).rescale_deltas(&deltas, &meta);
    let rows = SubmissionFormatter::new(run_cfg.ref_date, &run_cfg.quantiles).format(&meta, &values)?;
    let rows = QuantileNoncrossingEnforcer::new(&run_cfg.q_levels()).enforce(rows)?;
    info!(
        "{}: {} forecast rows in {} seconds",
        model_cfg.model_name,
        rows.len(),
        start.elapsed().as_secs()
    );

    Ok(GbqForecast {
        rows,
        ensemble,
        feature_names: train.feature_names.clone(),
        train_targets: train.targets(),
        train_meta: train.meta,
    })
}

/// [`run_gbq`] with the built in booster, configured by `model_cfg.booster`.
pub fn run_gbq_with_booster(
    table: &FeatureTable,
    model_cfg: &GbqConfig,
    run_cfg: &RunConfig,
) -> Result<GbqForecast, FlucastError> {
    run_gbq(table, model_cfg, run_cfg, &QuantileBooster::new(model_cfg.booster.clone()))
}
