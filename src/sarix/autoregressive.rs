//! Autoregressive bootstrap
//!
//! A seasonal autoregression fit by least squares on the differenced series,
//! with forecast paths simulated by resampling residuals. Coefficients are
//! shared across locations when `theta_pooling` is `shared`; residuals are
//! pooled when `sigma_pooling` is `shared`.
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{McmcSettings, Pooling, SarixConfig};
use crate::errors::FlucastError;
use crate::sarix::{PosteriorDraws, PosteriorSampler, SeriesBatch};

/// Ridge term added to the normal equations.
const RIDGE: f64 = 1e-8;

/// `series[t] - series[t - lag]`.
pub fn difference(series: &[f64], lag: usize) -> Vec<f64> {
    if series.len() <= lag {
        return Vec::new();
    }
    (lag..series.len()).map(|t| series[t] - series[t - lag]).collect()
}

/// Undo one [`difference`]: extend `history` with the differenced values and
/// return only the new levels.
pub fn integrate(history: &[f64], diffs: &[f64], lag: usize) -> Vec<f64> {
    let mut ext = history.to_vec();
    for dv in diffs {
        let v = dv + ext[ext.len() - lag];
        ext.push(v);
    }
    ext.split_off(history.len())
}

/// Solve `a x = b` for a square row major `a` by Gaussian elimination with
/// partial pivoting.
fn solve(mut a: Vec<f64>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|i, j| a[i * n + col].abs().total_cmp(&a[j * n + col].abs()))?;
        if a[pivot * n + col].abs() < f64::EPSILON {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let f = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= f * a[col * n + k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let s: f64 = ((row + 1)..n).map(|k| a[row * n + k] * x[k]).sum();
        x[row] = (b[row] - s) / a[row * n + row];
    }
    Some(x)
}

/// Least squares coefficients for row major `x` with `cols` columns.
fn least_squares(x: &[f64], y: &[f64], cols: usize) -> Option<Vec<f64>> {
    let mut xtx = vec![0.0; cols * cols];
    let mut xty = vec![0.0; cols];
    for (row, y_) in x.chunks(cols).zip(y) {
        for i in 0..cols {
            xty[i] += row[i] * y_;
            for j in 0..cols {
                xtx[i * cols + j] += row[i] * row[j];
            }
        }
    }
    for i in 0..cols {
        xtx[i * cols + i] += RIDGE;
    }
    solve(xtx, xty)
}

/// One location's series on the differenced scale.
struct Differenced {
    /// Levels at each differencing stage, the observed series first.
    stages: Vec<Vec<f64>>,
    lags: Vec<usize>,
    /// Covariates `[covariate][time]`, observed weeks and horizon, differenced.
    x: Vec<Vec<f64>>,
}

impl Differenced {
    fn z(&self) -> &[f64] {
        self.stages.last().map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Levels for the forecast horizon from simulated differenced values.
    fn integrate(&self, mut path: Vec<f64>) -> Vec<f64> {
        for (stage, lag) in self.stages.iter().zip(&self.lags).rev() {
            path = integrate(stage, &path, *lag);
        }
        path
    }
}

/// Fitted coefficients and residuals for every location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArFit {
    /// Intercept, AR lags, seasonal AR lags, covariates; one vector per
    /// location, identical across locations when pooled.
    pub coefficients: Vec<Vec<f64>>,
    pub residuals: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoregressiveBootstrap {
    pub p: usize,
    pub seasonal_p: usize,
    pub d: usize,
    pub seasonal_d: usize,
    pub season_period: usize,
    pub theta_pooling: Pooling,
    pub sigma_pooling: Pooling,
    pub num_samples: usize,
}

impl AutoregressiveBootstrap {
    pub fn from_config(cfg: &SarixConfig, mcmc: &McmcSettings) -> Self {
        AutoregressiveBootstrap {
            p: cfg.p,
            seasonal_p: cfg.seasonal_p,
            d: cfg.d,
            seasonal_d: cfg.seasonal_d,
            season_period: cfg.season_period,
            theta_pooling: cfg.theta_pooling,
            sigma_pooling: cfg.sigma_pooling,
            num_samples: mcmc.num_samples * mcmc.num_chains.max(1),
        }
    }

    fn lags(&self) -> Vec<usize> {
        let mut lags = vec![1; self.d];
        lags.extend(std::iter::repeat(self.season_period).take(self.seasonal_d));
        lags
    }

    /// Longest lag reached back by a regression row.
    fn max_lag(&self) -> usize {
        self.p.max(self.seasonal_p * self.season_period)
    }

    fn n_params(&self, n_covariates: usize) -> usize {
        1 + self.p + self.seasonal_p + n_covariates
    }

    fn design_row(&self, z: &[f64], x: &[Vec<f64>], t: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.n_params(x.len()));
        row.push(1.0);
        row.extend((1..=self.p).map(|k| z[t - k]));
        row.extend((1..=self.seasonal_p).map(|k| z[t - k * self.season_period]));
        row.extend(x.iter().map(|c| c[t]));
        row
    }

    fn difference_all(&self, batch: &SeriesBatch) -> Result<Vec<Differenced>, FlucastError> {
        let lags = self.lags();
        batch
            .y
            .iter()
            .zip(&batch.x)
            .zip(&batch.locations)
            .map(|((y, x), location)| {
                let mut stages = vec![y.clone()];
                let mut x: Vec<Vec<f64>> = x.clone();
                for lag in &lags {
                    let next = difference(stages.last().map(|s| s.as_slice()).unwrap_or(&[]), *lag);
                    stages.push(next);
                    x = x.iter().map(|c| difference(c, *lag)).collect();
                }
                let series = Differenced {
                    stages,
                    lags: lags.clone(),
                    x,
                };
                if series.z().len() <= self.max_lag() {
                    return Err(FlucastError::SamplingFailed(format!(
                        "series for location {} has {} observations, too few for the model",
                        location,
                        y.len()
                    )));
                }
                Ok(series)
            })
            .collect()
    }

    fn fit_differenced(&self, series: &[Differenced]) -> Result<ArFit, FlucastError> {
        let cols = self.n_params(series.first().map_or(0, |s| s.x.len()));
        let rows_of = |s: &Differenced| -> (Vec<f64>, Vec<f64>) {
            let z = s.z();
            let mut x = Vec::new();
            let mut y = Vec::new();
            for t in self.max_lag()..z.len() {
                x.extend(self.design_row(z, &s.x, t));
                y.push(z[t]);
            }
            (x, y)
        };
        let singular = || FlucastError::SamplingFailed("singular design matrix".to_string());

        let coefficients: Vec<Vec<f64>> = match self.theta_pooling {
            Pooling::Shared => {
                let (mut x, mut y) = (Vec::new(), Vec::new());
                for s in series {
                    let (xs, ys) = rows_of(s);
                    x.extend(xs);
                    y.extend(ys);
                }
                let beta = least_squares(&x, &y, cols).ok_or_else(singular)?;
                vec![beta; series.len()]
            }
            Pooling::None => series
                .iter()
                .map(|s| {
                    let (x, y) = rows_of(s);
                    least_squares(&x, &y, cols).ok_or_else(singular)
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let residuals = series
            .iter()
            .zip(&coefficients)
            .map(|(s, beta)| {
                let (x, y) = rows_of(s);
                x.chunks(cols)
                    .zip(&y)
                    .map(|(row, y_)| y_ - row.iter().zip(beta).map(|(a, b)| a * b).sum::<f64>())
                    .collect()
            })
            .collect();
        Ok(ArFit {
            coefficients,
            residuals,
        })
    }

    /// Fit coefficients and residuals without simulating.
    pub fn fit(&self, batch: &SeriesBatch) -> Result<ArFit, FlucastError> {
        self.fit_differenced(&self.difference_all(batch)?)
    }
}

impl PosteriorSampler for AutoregressiveBootstrap {
    fn sample(&self, batch: &SeriesBatch, horizon: usize, seed: u64) -> Result<PosteriorDraws, FlucastError> {
        if self.num_samples == 0 {
            return Err(FlucastError::SamplingFailed("num_samples must be positive".to_string()));
        }
        let series = self.difference_all(batch)?;
        for (s, location) in series.iter().zip(&batch.locations) {
            if s.x.iter().any(|c| c.len() < s.z().len() + horizon) {
                return Err(FlucastError::ShapeMismatch(format!(
                    "covariates for location {} do not cover the forecast horizon",
                    location
                )));
            }
        }
        let fit = self.fit_differenced(&series)?;
        let pooled: Vec<f64> = fit.residuals.iter().flatten().copied().collect();
        debug!(
            "autoregression fit on {} locations, {} residuals",
            series.len(),
            pooled.len()
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mut draws = PosteriorDraws::new(self.num_samples, series.len(), horizon);
        for sample in 0..self.num_samples {
            for (l, s) in series.iter().enumerate() {
                let resid = match self.sigma_pooling {
                    Pooling::Shared => &pooled,
                    Pooling::None => &fit.residuals[l],
                };
                let beta = &fit.coefficients[l];
                let mut z = s.z().to_vec();
                let start = z.len();
                for _ in 0..horizon {
                    let t = z.len();
                    let mean: f64 = self.design_row(&z, &s.x, t).iter().zip(beta).map(|(a, b)| a * b).sum();
                    let shock = if resid.is_empty() {
                        0.0
                    } else {
                        resid[rng.gen_range(0..resid.len())]
                    };
                    z.push(mean + shock);
                }
                let path = s.integrate(z.split_off(start));
                for (h, v) in path.into_iter().enumerate() {
                    draws.set(sample, l, h, v);
                }
            }
        }
        Ok(draws)
    }
}
