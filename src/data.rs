//! Data
//!
//! Containers for the modelling table: a column major feature matrix plus the
//! per-row bookkeeping needed to turn model-space predictions back into
//! reported incidence.
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::{HORIZON_OFFSET, IN_SEASON_FIRST_WEEK, IN_SEASON_LAST_WEEK};
use crate::errors::FlucastError;

/// Contiguous Column Major Matrix data container.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `u16`, `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i + j * self.rows]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Copy the given rows into a new column major buffer.
    pub fn select_rows(&self, rows: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(rows.len() * self.cols);
        for j in 0..self.cols {
            let col = self.get_col(j);
            out.extend(rows.iter().map(|i| col[*i]));
        }
        out
    }
}

/// A jagged column aligned matrix, that owns its data contents.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct JaggedMatrix<T> {
    /// The contents of the matrix.
    pub data: Vec<T>,
    /// The end index's of the matrix.
    pub ends: Vec<usize>,
}

impl<T> JaggedMatrix<T> {
    pub fn new() -> Self {
        JaggedMatrix {
            data: Vec::new(),
            ends: Vec::new(),
        }
    }

    /// Append a column.
    pub fn push_col(&mut self, col: Vec<T>) {
        self.data.extend(col);
        self.ends.push(self.data.len());
    }

    pub fn cols(&self) -> usize {
        self.ends.len()
    }

    /// Get the column of a jagged array.
    pub fn get_col(&self, col: usize) -> &[T] {
        let i = if col == 0 { 0 } else { self.ends[col - 1] };
        &self.data[i..self.ends[col]]
    }
}

/// A predictive quantile level and the label it is reported under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileLevel {
    pub level: f64,
    pub label: String,
}

impl QuantileLevel {
    /// Label with the shortest decimal rendering of the level, e.g. `0.1`.
    pub fn new(level: f64) -> Self {
        QuantileLevel {
            level,
            label: level.to_string(),
        }
    }

    pub fn with_label(level: f64, label: &str) -> Self {
        QuantileLevel {
            level,
            label: label.to_string(),
        }
    }

    pub fn from_levels(levels: &[f64]) -> Vec<QuantileLevel> {
        levels.iter().map(|q| QuantileLevel::new(*q)).collect()
    }
}

/// The 23 quantile levels requested by the forecast hub.
pub fn hub_quantile_levels() -> Vec<QuantileLevel> {
    QuantileLevel::from_levels(&[
        0.01, 0.025, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85,
        0.9, 0.95, 0.975, 0.99,
    ])
}

/// Bookkeeping for one (source, location, date, horizon) row of the modelling table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationMeta {
    pub source: String,
    pub location: String,
    pub season: String,
    pub season_week: u32,
    pub wk_end_date: NaiveDate,
    pub pop: f64,
    /// Internal horizon, in weeks past `wk_end_date`.
    pub horizon: i64,
    /// Last observed value on the centered and scaled transformed scale.
    pub inc_trans_cs: f64,
    pub inc_trans_center_factor: f64,
    pub inc_trans_scale_factor: f64,
}

/// Modelling table: features are stored column major.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub meta: Vec<ObservationMeta>,
    pub features: Vec<f64>,
    pub delta_target: Vec<Option<f64>>,
}

impl FeatureTable {
    pub fn new(
        feature_names: Vec<String>,
        meta: Vec<ObservationMeta>,
        features: Vec<f64>,
        delta_target: Vec<Option<f64>>,
    ) -> Result<Self, FlucastError> {
        let rows = meta.len();
        if features.len() != rows * feature_names.len() {
            return Err(FlucastError::ShapeMismatch(format!(
                "{} feature values for {} rows and {} features",
                features.len(),
                rows,
                feature_names.len()
            )));
        }
        if delta_target.len() != rows {
            return Err(FlucastError::ShapeMismatch(format!(
                "{} targets for {} rows",
                delta_target.len(),
                rows
            )));
        }
        Ok(FeatureTable {
            feature_names,
            meta,
            features,
            delta_target,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.meta.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn matrix(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.features, self.n_rows(), self.n_features())
    }

    /// A new table holding the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> FeatureTable {
        FeatureTable {
            feature_names: self.feature_names.clone(),
            meta: rows.iter().map(|i| self.meta[*i].clone()).collect(),
            features: self.matrix().select_rows(rows),
            delta_target: rows.iter().map(|i| self.delta_target[*i]).collect(),
        }
    }

    fn filter<F: Fn(usize) -> bool>(&self, keep: F) -> FeatureTable {
        let rows: Vec<usize> = (0..self.n_rows()).filter(|i| keep(*i)).collect();
        self.take_rows(&rows)
    }

    /// Rows from the given surveillance sources.
    pub fn from_sources(&self, sources: &[String]) -> FeatureTable {
        self.filter(|i| sources.contains(&self.meta[i].source))
    }

    /// Rows whose season week lies inside the modelled part of the season.
    pub fn in_season(&self) -> FeatureTable {
        let kept = self.filter(|i| {
            let w = self.meta[i].season_week;
            (IN_SEASON_FIRST_WEEK..=IN_SEASON_LAST_WEEK).contains(&w)
        });
        let dropped = self.n_rows() - kept.n_rows();
        if dropped > 0 {
            warn!(
                "{} rows outside season weeks {}..={} dropped",
                dropped, IN_SEASON_FIRST_WEEK, IN_SEASON_LAST_WEEK
            );
        }
        kept
    }

    /// Rows whose reported horizon, `horizon - HORIZON_OFFSET`, lies in
    /// `0..=max_horizon`.
    pub fn up_to_horizon(&self, max_horizon: i64) -> FeatureTable {
        self.filter(|i| (0..=max_horizon).contains(&(self.meta[i].horizon - HORIZON_OFFSET)))
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.meta.iter().map(|m| m.wk_end_date).max()
    }

    /// Rows at the most recent week ending date, the forecast origin.
    pub fn test_rows(&self) -> Result<FeatureTable, FlucastError> {
        let latest = self.latest_date().ok_or(FlucastError::EmptyTestSet)?;
        Ok(self.filter(|i| self.meta[i].wk_end_date == latest))
    }

    /// Rows with an observed target.
    pub fn training_rows(&self) -> Result<FeatureTable, FlucastError> {
        let train = self.filter(|i| self.delta_target[i].map(|v| !v.is_nan()).unwrap_or(false));
        if train.n_rows() == 0 {
            return Err(FlucastError::EmptyTrainingTarget);
        }
        Ok(train)
    }

    /// Target values. Missing targets are returned as NaN.
    pub fn targets(&self) -> Vec<f64> {
        self.delta_target.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }

    /// Distinct seasons in order of first appearance.
    pub fn seasons(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for m in &self.meta {
            if !seen.contains(&m.season) {
                seen.push(m.season.clone());
            }
        }
        seen
    }
}
