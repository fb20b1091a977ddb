//! Quantile noncrossing
//!
//! Independently fit quantile models can cross. Within each forecast unit the
//! values are sorted and paired back with the quantile levels in increasing
//! order, so the reported distribution is always non-decreasing.
use chrono::NaiveDate;
use hashbrown::HashMap;
use log::debug;

use crate::errors::FlucastError;
use crate::submission::QuantileRow;

/// Rows sharing a key describe one predictive distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForecastUnit {
    pub location: String,
    pub reference_date: NaiveDate,
    pub horizon: i64,
    pub target_end_date: NaiveDate,
    pub target: String,
    pub output_type: String,
}

impl ForecastUnit {
    fn of(row: &QuantileRow) -> Self {
        ForecastUnit {
            location: row.location.clone(),
            reference_date: row.reference_date,
            horizon: row.horizon,
            target_end_date: row.target_end_date,
            target: row.target.clone(),
            output_type: row.output_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuantileNoncrossingEnforcer {
    /// Quantile levels every unit must carry, each exactly once.
    expected_levels: Vec<f64>,
}

impl QuantileNoncrossingEnforcer {
    pub fn new(expected_levels: &[f64]) -> Self {
        QuantileNoncrossingEnforcer {
            expected_levels: expected_levels.to_vec(),
        }
    }

    /// Number of expected levels present in the group.
    fn levels_present(&self, group: &[QuantileRow]) -> usize {
        self.expected_levels
            .iter()
            .filter(|q| group.iter().any(|r| r.quantile_level == **q))
            .count()
    }

    /// Sort values within each unit. Output is ordered by unit, then quantile
    /// level.
    pub fn enforce(&self, rows: Vec<QuantileRow>) -> Result<Vec<QuantileRow>, FlucastError> {
        let mut groups: HashMap<ForecastUnit, Vec<QuantileRow>> = HashMap::new();
        for row in rows {
            groups.entry(ForecastUnit::of(&row)).or_default().push(row);
        }
        let mut units: Vec<(ForecastUnit, Vec<QuantileRow>)> = groups.into_iter().collect();
        units.sort_by(|a, b| a.0.cmp(&b.0));

        let n_levels = self.expected_levels.len();
        let mut out = Vec::with_capacity(units.len() * n_levels);
        let mut n_repaired = 0;
        for (unit, mut group) in units {
            let present = self.levels_present(&group);
            if group.len() != n_levels || present != n_levels {
                return Err(FlucastError::IncompleteQuantileGroup(
                    format!("{} horizon {} ({})", unit.location, unit.horizon, unit.target_end_date),
                    present,
                    n_levels,
                ));
            }
            group.sort_by(|a, b| a.quantile_level.total_cmp(&b.quantile_level));
            let mut values: Vec<f64> = group.iter().map(|r| r.value).collect();
            if values.windows(2).any(|w| w[0] > w[1]) {
                n_repaired += 1;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            for (row, v) in group.iter_mut().zip(values) {
                row.value = v;
            }
            out.extend(group);
        }
        debug!("quantile crossing repaired in {} forecast units", n_repaired);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QuantileLevel;
    use crate::submission::SubmissionFormatter;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const LEVELS: [f64; 3] = [0.1, 0.5, 0.9];

    fn rows(location: &str, raw_horizon: i64, values: &[f64]) -> Vec<QuantileRow> {
        let f = SubmissionFormatter::new(date("2024-01-06"), &QuantileLevel::from_levels(&LEVELS));
        f.format_unit(location, date("2024-01-06"), raw_horizon, values)
    }

    fn values(rows: &[QuantileRow]) -> Vec<f64> {
        rows.iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_crossing_repaired() {
        let enforcer = QuantileNoncrossingEnforcer::new(&LEVELS);
        let out = enforcer.enforce(rows("01", 2, &[5.0, 1.0, 3.0])).unwrap();
        assert_eq!(values(&out), vec![1.0, 3.0, 5.0]);
        let labels: Vec<&str> = out.iter().map(|r| r.output_type_id.as_str()).collect();
        assert_eq!(labels, vec!["0.1", "0.5", "0.9"]);
    }

    #[test]
    fn test_idempotent() {
        let enforcer = QuantileNoncrossingEnforcer::new(&LEVELS);
        let mut input = rows("02", 3, &[2.0, 9.0, 0.5]);
        input.extend(rows("01", 2, &[7.0, 7.0, 1.0]));
        input.reverse();
        let once = enforcer.enforce(input).unwrap();
        let twice = enforcer.enforce(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_groups_kept_apart_and_ordered() {
        let enforcer = QuantileNoncrossingEnforcer::new(&LEVELS);
        let mut input = rows("02", 2, &[3.0, 2.0, 1.0]);
        input.extend(rows("01", 3, &[30.0, 20.0, 10.0]));
        input.extend(rows("01", 2, &[0.3, 0.2, 0.1]));
        let out = enforcer.enforce(input).unwrap();
        assert_eq!(values(&out), vec![0.1, 0.2, 0.3, 10.0, 20.0, 30.0, 1.0, 2.0, 3.0]);
        assert_eq!(out[0].location, "01");
        assert_eq!(out[0].horizon, 0);
        assert_eq!(out[3].horizon, 1);
        assert_eq!(out[6].location, "02");
    }

    #[test]
    fn test_missing_level_is_fatal() {
        let enforcer = QuantileNoncrossingEnforcer::new(&LEVELS);
        let mut input = rows("01", 2, &[1.0, 2.0, 3.0]);
        input.pop();
        assert!(matches!(
            enforcer.enforce(input),
            Err(FlucastError::IncompleteQuantileGroup(_, 2, 3))
        ));
    }

    #[test]
    fn test_duplicated_level_is_fatal() {
        let enforcer = QuantileNoncrossingEnforcer::new(&LEVELS);
        let mut input = rows("01", 2, &[1.0, 2.0, 3.0]);
        input[1].quantile_level = 0.1;
        input[1].output_type_id = "0.1".to_string();
        assert!(matches!(
            enforcer.enforce(input),
            Err(FlucastError::IncompleteQuantileGroup(_, 2, 3))
        ));
    }
}
