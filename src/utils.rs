use crate::errors::FlucastError;
use std::collections::VecDeque;

/// Create a string of all available items.
pub fn items_to_strings(items: &[&str]) -> String {
    items.join(", ")
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    v.iter().map(|x| format!("{:.4}", x)).collect::<Vec<_>>().join(", ")
}

// Validation
pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), FlucastError> {
    if value.is_nan() || value < min || max < value {
        Err(FlucastError::InvalidParameter(
            parameter.to_string(),
            format!("real value within range {} and {}", min, max),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate a value in the half open interval `(0, 1]`.
pub fn validate_fraction(value: f64, parameter: &str) -> Result<(), FlucastError> {
    if value.is_nan() || value <= 0.0 || value > 1.0 {
        Err(FlucastError::InvalidParameter(
            parameter.to_string(),
            "real value in (0, 1]".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_positive_count(value: usize, parameter: &str) -> Result<(), FlucastError> {
    if value == 0 {
        Err(FlucastError::InvalidParameter(
            parameter.to_string(),
            "integer greater than 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Quantile levels must lie strictly inside `(0, 1)` and be strictly increasing.
pub fn validate_quantile_levels(levels: &[f64]) -> Result<(), FlucastError> {
    if levels.is_empty() {
        return Err(FlucastError::InvalidParameter(
            "q_levels".to_string(),
            "at least one quantile level".to_string(),
            "an empty list".to_string(),
        ));
    }
    for q in levels {
        if q.is_nan() || *q <= 0.0 || *q >= 1.0 {
            return Err(FlucastError::InvalidParameter(
                "q_levels".to_string(),
                "levels strictly between 0 and 1".to_string(),
                q.to_string(),
            ));
        }
    }
    if levels.windows(2).any(|w| w[0] >= w[1]) {
        return Err(FlucastError::InvalidParameter(
            "q_levels".to_string(),
            "strictly increasing levels".to_string(),
            fmt_vec_output(levels),
        ));
    }
    Ok(())
}

/// Naive weighted percentiles calculation.
///
/// Currently this function does not support missing values.
///
/// * `v` - A slice of which to find percentiles for.
/// * `sample_weight` - Sample weights for the instances of the vector.
/// * `percentiles` - Percentiles to look for in the data. This should be
///     values from 0 to 1, and in sorted order.
pub fn percentiles(v: &[f64], sample_weight: &[f64], percentiles: &[f64]) -> Vec<f64> {
    let mut p = Vec::new();
    if v.is_empty() {
        return p;
    }
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_unstable_by(|a, b| v[*a].total_cmp(&v[*b]));

    let mut pcts = VecDeque::from_iter(percentiles.iter());
    let mut current_pct = match pcts.pop_front() {
        Some(p_) => *p_,
        None => return p,
    };

    let mut cuml_pct = 0.0;
    let total_values: f64 = sample_weight.iter().sum();

    for i in idx.iter() {
        cuml_pct += sample_weight[*i] / total_values;
        // The same value can satisfy several percentiles.
        while current_pct == 0.0 || cuml_pct >= current_pct {
            p.push(v[*i]);
            match pcts.pop_front() {
                Some(p_) => current_pct = *p_,
                None => return p,
            }
        }
    }
    // Rounding can leave the top percentiles unfilled.
    let last = v[idx[idx.len() - 1]];
    p.resize(percentiles.len(), last);
    p
}

/// Smallest value whose cumulative share of the observations reaches `q`.
pub fn lower_quantile(v: &[f64], q: f64) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let mut sorted = v.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let target = sorted.len() as f64 * q;
    let mut cuml = 0.0;
    for x in &sorted {
        cuml += 1.0;
        if cuml >= target {
            return *x;
        }
    }
    sorted[sorted.len() - 1]
}

/// Median, averaging the two middle values for even lengths.
/// Returns NaN for an empty slice or if any value is NaN.
pub fn median(v: &[f64]) -> f64 {
    if v.is_empty() || v.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = v.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median of the non-missing values, `None` when every value is missing.
pub fn nan_median(v: &[f64]) -> Option<f64> {
    let present: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
    if present.is_empty() {
        None
    } else {
        Some(median(&present))
    }
}

/// Percentile with linear interpolation between order statistics.
///
/// * `sorted` - Values in ascending order.
/// * `q` - Level in `[0, 1]`.
pub fn interpolated_percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Mean pinball loss of predictions `yhat` for targets `y` at level `q`.
pub fn pinball_loss(y: &[f64], yhat: &[f64], q: f64) -> f64 {
    let total: f64 = y
        .iter()
        .zip(yhat)
        .map(|(y_, yhat_)| {
            let s = y_ - yhat_;
            if s >= 0.0 {
                q * s
            } else {
                (q - 1.0) * s
            }
        })
        .sum();
    total / y.len() as f64
}

/// Return the index of the first value in a sorted
/// vector that is greater than a provided value.
/// Missing values map to bin zero.
///
/// * `x` - The sorted slice of values.
/// * `v` - The value used to calculate the first
///   value larger than it.
#[inline]
pub fn map_bin(x: &[f64], v: f64) -> Option<u16> {
    if v.is_nan() {
        return Some(0);
    }
    let mut low = 0;
    let mut high = x.len();
    while low != high {
        let mid = (low + high) / 2;
        if x[mid] <= v {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    u16::try_from(low).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let v = vec![4., 5., 6., 1., 2., 3., 7., 8., 9., 10.];
        let w = vec![1.; v.len()];
        let p = vec![0.3, 0.5, 0.75, 1.0];
        let p = percentiles(&v, &w, &p);
        assert_eq!(p, vec![3.0, 5.0, 8.0, 10.0]);
    }

    #[test]
    fn test_percentiles_weighted() {
        let v = vec![10., 8., 9., 1., 2., 3., 6., 7., 4., 5.];
        let w = vec![1., 1., 1., 1., 1., 2., 1., 1., 5., 1.];
        let p = vec![0.3, 0.5, 0.75, 1.0];
        let p = percentiles(&v, &w, &p);
        assert_eq!(p, vec![4.0, 4.0, 7.0, 10.0]);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0);
        assert_eq!(median(&[5.0, 1.0, 4.0, 2.0]), 3.0);
        assert!(median(&[]).is_nan());
        assert!(median(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_nan_median_skips_missing() {
        assert_eq!(nan_median(&[f64::NAN, 1.0, 3.0]), Some(2.0));
        assert_eq!(nan_median(&[f64::NAN, f64::NAN]), None);
    }

    #[test]
    fn test_lower_quantile() {
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(lower_quantile(&y, 0.5), 3.0);
        assert_eq!(lower_quantile(&y, 0.8), 4.0);
        assert_eq!(lower_quantile(&y, 0.99), 5.0);
    }

    #[test]
    fn test_interpolated_percentile() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert!((interpolated_percentile(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((interpolated_percentile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((interpolated_percentile(&v, 1.0) - 4.0).abs() < 1e-12);
        assert!((interpolated_percentile(&v, 0.1) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_pinball_loss() {
        let l = pinball_loss(&[1.0, 1.0], &[2.0, 0.5], 0.7);
        assert!((l - (0.3 + 0.35) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_map_bin() {
        let v = vec![f64::MIN, 1., 4., 8., 9.];
        assert_eq!(1, map_bin(&v, 0.).unwrap());
        assert_eq!(2, map_bin(&v, 1.).unwrap());
        assert_eq!(2, map_bin(&v, 2.).unwrap());
        assert_eq!(3, map_bin(&v, 4.).unwrap());
        assert_eq!(5, map_bin(&v, 9.).unwrap());
        assert_eq!(5, map_bin(&v, 10.).unwrap());
        assert_eq!(0, map_bin(&v, f64::NAN).unwrap());
    }

    #[test]
    fn test_validate_fraction() {
        assert!(validate_fraction(0.7, "bag_frac_samples").is_ok());
        assert!(validate_fraction(1.0, "bag_frac_samples").is_ok());
        assert!(validate_fraction(0.0, "bag_frac_samples").is_err());
        assert!(validate_fraction(1.5, "bag_frac_samples").is_err());
        assert!(validate_fraction(f64::NAN, "bag_frac_samples").is_err());
    }

    #[test]
    fn test_validate_quantile_levels() {
        assert!(validate_quantile_levels(&[0.1, 0.5, 0.9]).is_ok());
        assert!(validate_quantile_levels(&[]).is_err());
        assert!(validate_quantile_levels(&[0.5, 0.1]).is_err());
        assert!(validate_quantile_levels(&[0.0, 0.5]).is_err());
    }
}
