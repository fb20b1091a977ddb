//! Submission
//!
//! The long, one row per quantile, table that forecast hubs accept.
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::constants::{DAYS_PER_WEEK, HORIZON_OFFSET, OUTPUT_TYPE_QUANTILE, TARGET_LABEL};
use crate::data::{ObservationMeta, QuantileLevel};
use crate::errors::FlucastError;

/// One predictive quantile for one location and horizon. Fields serialize in
/// hub column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileRow {
    pub location: String,
    pub reference_date: NaiveDate,
    pub horizon: i64,
    pub target_end_date: NaiveDate,
    pub target: String,
    pub output_type: String,
    /// Label of the quantile level, e.g. `0.025`.
    pub output_type_id: String,
    pub value: f64,
    #[serde(skip)]
    pub quantile_level: f64,
}

/// Reshapes wide `[row][quantile]` predictions into [`QuantileRow`]s.
#[derive(Debug, Clone)]
pub struct SubmissionFormatter {
    pub reference_date: NaiveDate,
    pub quantiles: Vec<QuantileLevel>,
}

impl SubmissionFormatter {
    pub fn new(reference_date: NaiveDate, quantiles: &[QuantileLevel]) -> Self {
        SubmissionFormatter {
            reference_date,
            quantiles: quantiles.to_vec(),
        }
    }

    /// Rows for one forecast unit. `raw_horizon` counts weeks past
    /// `wk_end_date`; the reported horizon is shifted by two weeks.
    pub fn format_unit(&self, location: &str, wk_end_date: NaiveDate, raw_horizon: i64, values: &[f64]) -> Vec<QuantileRow> {
        let target_end_date = wk_end_date + Duration::days(DAYS_PER_WEEK * raw_horizon);
        self.quantiles
            .iter()
            .zip(values)
            .map(|(q, v)| QuantileRow {
                location: location.to_string(),
                reference_date: self.reference_date,
                horizon: raw_horizon - HORIZON_OFFSET,
                target_end_date,
                target: TARGET_LABEL.to_string(),
                output_type: OUTPUT_TYPE_QUANTILE.to_string(),
                output_type_id: q.label.clone(),
                value: *v,
                quantile_level: q.level,
            })
            .collect()
    }

    /// Melt a wide block whose rows line up with `meta`.
    pub fn format(&self, meta: &[ObservationMeta], values: &[Vec<f64>]) -> Result<Vec<QuantileRow>, FlucastError> {
        if meta.len() != values.len() {
            return Err(FlucastError::ShapeMismatch(format!(
                "{} prediction rows for {} test rows",
                values.len(),
                meta.len()
            )));
        }
        let mut rows = Vec::with_capacity(meta.len() * self.quantiles.len());
        for (m, v) in meta.iter().zip(values) {
            if v.len() != self.quantiles.len() {
                return Err(FlucastError::ShapeMismatch(format!(
                    "{} predictions for {} quantile levels",
                    v.len(),
                    self.quantiles.len()
                )));
            }
            rows.extend(self.format_unit(&m.location, m.wk_end_date, m.horizon, v));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::meta;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_format_unit_fields() {
        let f = SubmissionFormatter::new(date("2024-01-06"), &QuantileLevel::from_levels(&[0.1, 0.5]));
        let rows = f.format_unit("06", date("2023-12-30"), 3, &[1.0, 2.0]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].horizon, 1);
        assert_eq!(rows[0].target_end_date, date("2024-01-20"));
        assert_eq!(rows[0].target, "wk inc flu hosp");
        assert_eq!(rows[0].output_type, "quantile");
        assert_eq!(rows[1].output_type_id, "0.5");
        assert_eq!(rows[1].quantile_level, 0.5);
        assert_eq!(rows[1].value, 2.0);
    }

    #[test]
    fn test_format_melts_rows() {
        let f = SubmissionFormatter::new(date("2024-01-06"), &QuantileLevel::from_levels(&[0.25, 0.75]));
        let mut m1 = meta("01", "2023/24", 20, date("2024-01-06"));
        m1.horizon = 2;
        let mut m2 = m1.clone();
        m2.horizon = 4;
        let rows = f.format(&[m1, m2], &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].horizon, 0);
        assert_eq!(rows[0].target_end_date, date("2024-01-20"));
        assert_eq!(rows[3].horizon, 2);
        assert_eq!(rows[3].value, 4.0);
    }

    #[test]
    fn test_format_shape_checked() {
        let f = SubmissionFormatter::new(date("2024-01-06"), &QuantileLevel::from_levels(&[0.5]));
        let m = meta("01", "2023/24", 20, date("2024-01-06"));
        assert!(f.format(&[m.clone()], &[]).is_err());
        assert!(f.format(&[m], &[vec![1.0, 2.0]]).is_err());
    }
}
