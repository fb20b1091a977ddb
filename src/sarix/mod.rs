//! SARIX
//!
//! Seasonal autoregressive forecasts. Series are batched per location, a
//! [`PosteriorSampler`] draws forecast paths on the transformed scale, and the
//! draws are reduced to quantiles, rescaled and formatted like the GBQ output.
use chrono::{Datelike, Duration, NaiveDate};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{Covariate, RunConfig, SarixConfig};
use crate::constants::XMAS_SPIKE_WIDTH;
use crate::data::{FeatureTable, ObservationMeta};
use crate::errors::FlucastError;
use crate::io::{build_save_path, write_submission};
use crate::noncrossing::QuantileNoncrossingEnforcer;
use crate::rescale::InverseRescaler;
use crate::sampler::seed_from_date;
use crate::submission::{QuantileRow, SubmissionFormatter};
use crate::utils::interpolated_percentile;

pub mod autoregressive;

pub use self::autoregressive::AutoregressiveBootstrap;

/// Spike around the Christmas week: 3 at Christmas, falling to 0 three
/// weeks away.
pub fn xmas_spike(season_week: f64, xmas_week: f64) -> f64 {
    (XMAS_SPIKE_WIDTH - (season_week - xmas_week).abs()).max(0.0)
}

/// Season week of the week ending on the first Saturday on or after
/// December 25, using any observation of the season as an anchor.
pub fn christmas_week(anchor_date: NaiveDate, anchor_week: u32) -> f64 {
    let year = if anchor_date.month() >= 7 {
        anchor_date.year()
    } else {
        anchor_date.year() - 1
    };
    let xmas = NaiveDate::from_ymd_opt(year, 12, 25).unwrap_or(anchor_date);
    let to_saturday = (5 + 7 - i64::from(xmas.weekday().num_days_from_monday())) % 7;
    let xmas_saturday = xmas + Duration::days(to_saturday);
    f64::from(anchor_week) + ((xmas_saturday - anchor_date).num_days() / 7) as f64
}

/// Per location transformed series, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBatch {
    pub locations: Vec<String>,
    /// Observed centered and scaled values, `[location][time]`.
    pub y: Vec<Vec<f64>>,
    /// Covariates, `[location][covariate][time]`, covering the observed weeks
    /// and the forecast horizon.
    pub x: Vec<Vec<Vec<f64>>>,
    /// Last observation of each location.
    pub last: Vec<ObservationMeta>,
}

impl SeriesBatch {
    /// Build a batch from one row per (location, week). Locations keep their
    /// order of first appearance; rows are sorted by date within a location.
    pub fn from_table(table: &FeatureTable, covariates: &[Covariate], horizon: usize) -> Result<Self, FlucastError> {
        let mut locations: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<&ObservationMeta>> = Vec::new();
        for m in &table.meta {
            match locations.iter().position(|l| *l == m.location) {
                Some(i) => rows[i].push(m),
                None => {
                    locations.push(m.location.clone());
                    rows.push(vec![m]);
                }
            }
        }

        let mut batch = SeriesBatch {
            locations: Vec::with_capacity(locations.len()),
            y: Vec::with_capacity(locations.len()),
            x: Vec::with_capacity(locations.len()),
            last: Vec::with_capacity(locations.len()),
        };
        for (location, mut series) in locations.into_iter().zip(rows) {
            series.sort_by_key(|m| m.wk_end_date);
            if series.windows(2).any(|w| w[0].wk_end_date == w[1].wk_end_date) {
                return Err(FlucastError::ShapeMismatch(format!(
                    "location {} has more than one row for a week",
                    location
                )));
            }
            let last = match series.last() {
                Some(m) => (*m).clone(),
                None => continue,
            };
            let x = covariates
                .iter()
                .map(|c| match c {
                    Covariate::XmasSpike => xmas_spike_series(&series, horizon),
                })
                .collect();
            batch.y.push(series.iter().map(|m| m.inc_trans_cs).collect());
            batch.x.push(x);
            batch.last.push(last);
            batch.locations.push(location);
        }
        Ok(batch)
    }

    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }

    /// A batch holding only location `i`.
    pub fn location(&self, i: usize) -> SeriesBatch {
        SeriesBatch {
            locations: vec![self.locations[i].clone()],
            y: vec![self.y[i].clone()],
            x: vec![self.x[i].clone()],
            last: self.last.get(i).cloned().into_iter().collect(),
        }
    }
}

/// The spike covariate for observed weeks and `horizon` weeks after the last.
fn xmas_spike_series(series: &[&ObservationMeta], horizon: usize) -> Vec<f64> {
    let mut xmas_weeks: Vec<(&str, f64)> = Vec::new();
    let mut out = Vec::with_capacity(series.len() + horizon);
    for m in series {
        let xw = match xmas_weeks.iter().find(|(s, _)| *s == m.season) {
            Some((_, w)) => *w,
            None => {
                let w = christmas_week(m.wk_end_date, m.season_week);
                xmas_weeks.push((m.season.as_str(), w));
                w
            }
        };
        out.push(xmas_spike(f64::from(m.season_week), xw));
    }
    if let Some(last) = series.last() {
        let xw = christmas_week(last.wk_end_date, last.season_week);
        for h in 1..=horizon {
            out.push(xmas_spike(f64::from(last.season_week) + h as f64, xw));
        }
    }
    out
}

/// Posterior predictive draws, `[sample][location][horizon]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraws {
    pub num_samples: usize,
    pub num_locations: usize,
    pub horizon: usize,
    values: Vec<f64>,
}

impl PosteriorDraws {
    pub fn new(num_samples: usize, num_locations: usize, horizon: usize) -> Self {
        PosteriorDraws {
            num_samples,
            num_locations,
            horizon,
            values: vec![0.0; num_samples * num_locations * horizon],
        }
    }

    #[inline]
    fn offset(&self, sample: usize, location: usize, h: usize) -> usize {
        (sample * self.num_locations + location) * self.horizon + h
    }

    pub fn set(&mut self, sample: usize, location: usize, h: usize, value: f64) {
        let i = self.offset(sample, location, h);
        self.values[i] = value;
    }

    pub fn get(&self, sample: usize, location: usize, h: usize) -> f64 {
        self.values[self.offset(sample, location, h)]
    }

    /// Every draw for one location and horizon step (zero based).
    pub fn location_horizon(&self, location: usize, h: usize) -> Vec<f64> {
        (0..self.num_samples).map(|s| self.get(s, location, h)).collect()
    }

    /// Stack single location draws along the location axis.
    pub fn concat_locations(parts: &[PosteriorDraws]) -> Result<Self, FlucastError> {
        let first = parts
            .first()
            .ok_or_else(|| FlucastError::SamplingFailed("no locations were sampled".to_string()))?;
        if parts
            .iter()
            .any(|p| p.num_samples != first.num_samples || p.horizon != first.horizon)
        {
            return Err(FlucastError::SamplingFailed(
                "locations returned draws of different shapes".to_string(),
            ));
        }
        let num_locations = parts.iter().map(|p| p.num_locations).sum();
        let mut out = PosteriorDraws::new(first.num_samples, num_locations, first.horizon);
        for s in 0..first.num_samples {
            let mut l_out = 0;
            for p in parts {
                for l in 0..p.num_locations {
                    for h in 0..p.horizon {
                        out.set(s, l_out, h, p.get(s, l, h));
                    }
                    l_out += 1;
                }
            }
        }
        Ok(out)
    }
}

/// Draws forecast paths for a batch of series.
pub trait PosteriorSampler: Sync {
    /// Return draws for horizons `1..=horizon`, on the scale of `batch.y`.
    fn sample(&self, batch: &SeriesBatch, horizon: usize, seed: u64) -> Result<PosteriorDraws, FlucastError>;
}

/// One seed per location, drawn in location order from a stream seeded with
/// `seed`, so separately fit locations resample independently.
pub fn location_seeds(seed: u64, n_locations: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_locations).map(|_| rng.gen::<u64>()).collect()
}

/// Result of one SARIX run.
#[derive(Debug, Clone)]
pub struct SarixForecast {
    pub rows: Vec<QuantileRow>,
    pub draws: PosteriorDraws,
    pub locations: Vec<String>,
}

impl SarixForecast {
    pub fn save(&self, model_cfg: &SarixConfig, run_cfg: &RunConfig) -> Result<PathBuf, FlucastError> {
        let path = build_save_path(&run_cfg.output_root, &model_cfg.model_name, run_cfg.ref_date, None);
        write_submission(&path, &self.rows)?;
        Ok(path)
    }
}

/// Sample forecast paths for every location in `table` and produce
/// submission rows for horizons `1..=run_cfg.max_horizon`.
pub fn run_sarix<S: PosteriorSampler>(
    table: &FeatureTable,
    model_cfg: &SarixConfig,
    run_cfg: &RunConfig,
    sampler: &S,
) -> Result<SarixForecast, FlucastError> {
    model_cfg.validate()?;
    run_cfg.validate()?;
    let horizon = run_cfg.max_horizon as usize;
    let table = table.from_sources(&model_cfg.sources);
    let batch = SeriesBatch::from_table(&table, &model_cfg.covariates, horizon)?;
    if batch.n_locations() == 0 {
        return Err(FlucastError::EmptyTrainingTarget);
    }
    let seed = seed_from_date(run_cfg.ref_date);
    info!(
        "{}: sampling {} locations, horizon {}",
        model_cfg.model_name,
        batch.n_locations(),
        horizon
    );

    let draws = if model_cfg.fit_locations_separately {
        let seeds = location_seeds(seed, batch.n_locations());
        let parts = seeds
            .par_iter()
            .enumerate()
            .map(|(i, location_seed)| sampler.sample(&batch.location(i), horizon, *location_seed))
            .collect::<Result<Vec<_>, _>>()?;
        PosteriorDraws::concat_locations(&parts)?
    } else {
        sampler.sample(&batch, horizon, seed)?
    };
    if draws.num_locations != batch.n_locations() || draws.horizon != horizon || draws.num_samples == 0 {
        return Err(FlucastError::SamplingFailed(format!(
            "expected draws for {} locations and {} horizons, got {} and {}",
            batch.n_locations(),
            horizon,
            draws.num_locations,
            draws.horizon
        )));
    }

    let rescaler = InverseRescaler::sarix(model_cfg.power_transform);
    let formatter = SubmissionFormatter::new(run_cfg.ref_date, &run_cfg.quantiles);
    let q_levels = run_cfg.q_levels();
    let mut rows = Vec::with_capacity(batch.n_locations() * horizon * q_levels.len());
    for (l, last) in batch.last.iter().enumerate() {
        for h in 0..horizon {
            let mut sorted = draws.location_horizon(l, h);
            sorted.sort_by(|a, b| a.total_cmp(b));
            let values: Vec<f64> = q_levels
                .iter()
                .map(|q| rescaler.rescale(interpolated_percentile(&sorted, *q), last))
                .collect();
            rows.extend(formatter.format_unit(&last.location, last.wk_end_date, h as i64 + 1, &values));
        }
    }
    let rows = QuantileNoncrossingEnforcer::new(&q_levels).enforce(rows)?;
    Ok(SarixForecast {
        rows,
        draws,
        locations: batch.locations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{McmcSettings, Pooling};
    use crate::data::tests::meta;
    use crate::data::QuantileLevel;
    use crate::transform::PowerTransform;
    use std::sync::Mutex;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Draws `location + sample / num_samples` at every horizon.
    struct Ladder {
        num_samples: usize,
    }

    impl PosteriorSampler for Ladder {
        fn sample(&self, batch: &SeriesBatch, horizon: usize, _seed: u64) -> Result<PosteriorDraws, FlucastError> {
            let mut d = PosteriorDraws::new(self.num_samples, batch.n_locations(), horizon);
            for s in 0..self.num_samples {
                for l in 0..batch.n_locations() {
                    for h in 0..horizon {
                        d.set(s, l, h, l as f64 + s as f64 / self.num_samples as f64);
                    }
                }
            }
            Ok(d)
        }
    }

    /// Records the seed of every call, then defers to [`Ladder`].
    struct SeedRecorder {
        seeds: Mutex<Vec<u64>>,
    }

    impl PosteriorSampler for SeedRecorder {
        fn sample(&self, batch: &SeriesBatch, horizon: usize, seed: u64) -> Result<PosteriorDraws, FlucastError> {
            if let Ok(mut seeds) = self.seeds.lock() {
                seeds.push(seed);
            }
            Ladder { num_samples: 3 }.sample(batch, horizon, seed)
        }
    }

    /// Weekly rows for two locations through the 2023/24 season, with a
    /// seasonal bump.
    fn series_table(weeks: u32) -> FeatureTable {
        let start = date("2023-08-05");
        let mut m = Vec::new();
        for location in ["01", "02"] {
            for w in 0..weeks {
                let mut row = meta(location, "2023/24", w + 1, start + Duration::weeks(i64::from(w)));
                row.inc_trans_cs = (f64::from(w) / 6.0).sin() + if location == "02" { 1.0 } else { 0.0 };
                row.pop = 100_000.0;
                m.push(row);
            }
        }
        let n = m.len();
        FeatureTable::new(vec![], m, vec![], vec![None; n]).unwrap()
    }

    #[test]
    fn test_xmas_spike() {
        assert_eq!(xmas_spike(21.0, 21.0), 3.0);
        assert_eq!(xmas_spike(19.0, 21.0), 1.0);
        assert_eq!(xmas_spike(24.0, 21.0), 0.0);
        assert_eq!(xmas_spike(30.0, 21.0), 0.0);
    }

    #[test]
    fn test_christmas_week() {
        // 2023-12-25 is a Monday; its week ends Saturday 2023-12-30.
        assert_eq!(christmas_week(date("2023-08-05"), 1), 22.0);
        assert_eq!(christmas_week(date("2024-01-06"), 23), 22.0);
    }

    #[test]
    fn test_batch_from_table() {
        let table = series_table(30);
        let b = SeriesBatch::from_table(&table, &[Covariate::XmasSpike], 4).unwrap();
        assert_eq!(b.locations, vec!["01".to_string(), "02".to_string()]);
        assert_eq!(b.y[0].len(), 30);
        assert_eq!(b.x[0][0].len(), 34);
        assert_eq!(b.x[0][0][21], 3.0);
        assert_eq!(b.last[1].wk_end_date, date("2024-02-24"));

        let one = b.location(1);
        assert_eq!(one.y, vec![b.y[1].clone()]);
        assert_eq!(one.last[0].location, "02");

        let dup = FeatureTable::new(vec![], vec![table.meta[0].clone(), table.meta[0].clone()], vec![], vec![None; 2]).unwrap();
        assert!(SeriesBatch::from_table(&dup, &[], 1).is_err());
    }

    #[test]
    fn test_concat_locations() {
        let mut a = PosteriorDraws::new(2, 1, 1);
        a.set(1, 0, 0, 5.0);
        let mut b = PosteriorDraws::new(2, 1, 1);
        b.set(1, 0, 0, 7.0);
        let c = PosteriorDraws::concat_locations(&[a, b]).unwrap();
        assert_eq!(c.num_locations, 2);
        assert_eq!(c.location_horizon(1, 0), vec![0.0, 7.0]);
        assert!(PosteriorDraws::concat_locations(&[PosteriorDraws::new(2, 1, 1), PosteriorDraws::new(3, 1, 1)]).is_err());
    }

    #[test]
    fn test_run_with_fixed_draws() {
        let table = series_table(30);
        let ref_date = date("2024-03-02");
        let run_cfg = RunConfig::short(ref_date)
            .with_quantiles(QuantileLevel::from_levels(&[0.1, 0.5, 0.9]))
            .with_max_horizon(4);
        let model_cfg = SarixConfig::default();
        let sampler = Ladder { num_samples: 11 };
        let out = run_sarix(&table, &model_cfg, &run_cfg, &sampler).unwrap();

        assert_eq!(out.rows.len(), 2 * 4 * 3);
        let first = &out.rows[0];
        assert_eq!(first.location, "01");
        assert_eq!(first.horizon, -1);
        assert_eq!(first.target_end_date, date("2024-03-02"));
        // Identity transform, center 0, scale 1, pop 1e5: the draw percentile itself.
        assert!((first.value - 0.1 * 10.0 / 11.0).abs() < 1e-12);
        let last = &out.rows[out.rows.len() - 1];
        assert_eq!(last.location, "02");
        assert_eq!(last.horizon, 2);
        assert!((last.value - (1.0 + 0.9 * 10.0 / 11.0)).abs() < 1e-12);

        let separate = run_sarix(
            &table,
            &model_cfg.clone().with_fit_locations_separately(true),
            &run_cfg,
            &sampler,
        )
        .unwrap();
        // Each single location batch is location 0 of its own sampler call.
        assert!(separate.rows.iter().all(|r| r.value < 1.0));
    }

    #[test]
    fn test_run_with_bootstrap() {
        let table = series_table(40);
        let run_cfg = RunConfig::short(date("2024-05-11")).with_max_horizon(3);
        let model_cfg = SarixConfig::variant("sarix_p2_4rt_thetashared_sigmanone_xmas_spike").unwrap();
        assert_eq!(model_cfg.theta_pooling, Pooling::Shared);
        let sampler = AutoregressiveBootstrap::from_config(
            &model_cfg,
            &McmcSettings {
                num_warmup: 0,
                num_samples: 100,
                num_chains: 1,
            },
        );
        let a = run_sarix(&table, &model_cfg, &run_cfg, &sampler).unwrap();
        let b = run_sarix(&table, &model_cfg, &run_cfg, &sampler).unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.rows.len(), 2 * 3 * 3);
        assert!(a.rows.iter().all(|r| r.value >= 0.0));
        for unit in a.rows.chunks(3) {
            assert!(unit.windows(2).all(|w| w[0].value <= w[1].value));
        }
        assert_eq!(model_cfg.power_transform, PowerTransform::FourthRoot);
    }

    #[test]
    fn test_separate_locations_get_distinct_seeds() {
        let seeds = location_seeds(1_700_000_000, 4);
        assert_eq!(seeds, location_seeds(1_700_000_000, 4));
        for (i, a) in seeds.iter().enumerate() {
            assert!(seeds[i + 1..].iter().all(|b| b != a));
        }

        let table = series_table(30);
        let run_cfg = RunConfig::short(date("2024-03-02")).with_max_horizon(2);
        let model_cfg = SarixConfig::default().with_fit_locations_separately(true);
        let recorder = SeedRecorder {
            seeds: Mutex::new(Vec::new()),
        };
        run_sarix(&table, &model_cfg, &run_cfg, &recorder).unwrap();
        let mut used = recorder.seeds.into_inner().unwrap();
        used.sort_unstable();
        let mut expected = location_seeds(seed_from_date(date("2024-03-02")), 2);
        expected.sort_unstable();
        assert_eq!(used, expected);
    }
}
