//! Power transform
//!
//! Maps incidence counts to a variance stabilized scale and back. A count is
//! first expressed as a rate per 100,000 people, then passed through the
//! power transform, then centered and scaled with per-series factors. The
//! factors are computed by the data loader; nothing here looks at data.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::constants::{RATE_MULTIPLIER, TRANSFORM_FLOOR, TRANSFORM_OFFSET};
use crate::errors::FlucastError;
use crate::utils::items_to_strings;

/// Power transform applied to surveillance signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerTransform {
    /// Identity.
    #[serde(rename = "none")]
    None,
    /// Fourth root with an additive floor.
    #[serde(rename = "4rt")]
    FourthRoot,
}

impl FromStr for PowerTransform {
    type Err = FlucastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PowerTransform::None),
            "4rt" => Ok(PowerTransform::FourthRoot),
            _ => Err(FlucastError::ParseString(
                s.to_string(),
                "PowerTransform".to_string(),
                items_to_strings(&["none", "4rt"]),
            )),
        }
    }
}

impl Display for PowerTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerTransform::None => write!(f, "none"),
            PowerTransform::FourthRoot => write!(f, "4rt"),
        }
    }
}

/// Additive terms that keep the fourth root away from zero incidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasCorrection {
    pub offset: f64,
    pub floor: f64,
}

impl Default for BiasCorrection {
    fn default() -> Self {
        BiasCorrection {
            offset: TRANSFORM_OFFSET,
            floor: TRANSFORM_FLOOR,
        }
    }
}

impl BiasCorrection {
    /// Total amount added to the rate before the root is taken.
    pub fn total(&self) -> f64 {
        self.offset + self.floor.powi(4)
    }
}

/// Per-series centering and scaling statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub center: f64,
    pub scale: f64,
    /// Added to `scale` before use. The GBQ model fits with an offset of 0.01.
    #[serde(default)]
    pub scale_offset: f64,
}

impl ScaleFactors {
    pub fn new(center: f64, scale: f64) -> Self {
        ScaleFactors {
            center,
            scale,
            scale_offset: 0.0,
        }
    }

    pub fn with_scale_offset(self, scale_offset: f64) -> Self {
        ScaleFactors { scale_offset, ..self }
    }

    pub fn effective_scale(&self) -> f64 {
        self.scale + self.scale_offset
    }

    pub fn standardize(&self, transformed: f64) -> f64 {
        transformed / self.effective_scale() - self.center
    }

    pub fn unstandardize(&self, standardized: f64) -> f64 {
        (standardized + self.center) * self.effective_scale()
    }
}

impl PowerTransform {
    /// Exponent that undoes the transform.
    pub fn power(&self) -> i32 {
        match self {
            PowerTransform::None => 1,
            PowerTransform::FourthRoot => 4,
        }
    }

    /// Transform a rate per 100,000.
    pub fn forward_rate(&self, rate: f64, bias: &BiasCorrection) -> f64 {
        match self {
            PowerTransform::None => rate,
            PowerTransform::FourthRoot => (rate + bias.total()).powf(0.25),
        }
    }

    /// Undo [`forward_rate`](PowerTransform::forward_rate). Negative transformed
    /// values are floored at zero before the power is applied. The result is
    /// not clamped and may be slightly negative near zero incidence.
    pub fn inverse_rate(&self, transformed: f64, bias: &BiasCorrection) -> f64 {
        match self {
            PowerTransform::None => transformed,
            PowerTransform::FourthRoot => transformed.max(0.0).powi(4) - bias.total(),
        }
    }

    /// Count to centered and scaled transformed value.
    pub fn forward(&self, count: f64, pop: f64, factors: &ScaleFactors, bias: &BiasCorrection) -> f64 {
        let rate = count * RATE_MULTIPLIER / pop;
        factors.standardize(self.forward_rate(rate, bias))
    }

    /// Centered and scaled transformed value to a non-negative count.
    pub fn inverse(&self, standardized: f64, pop: f64, factors: &ScaleFactors, bias: &BiasCorrection) -> f64 {
        let rate = self.inverse_rate(factors.unstandardize(standardized), bias);
        (rate * pop / RATE_MULTIPLIER).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transform() {
        assert_eq!("4rt".parse::<PowerTransform>().unwrap(), PowerTransform::FourthRoot);
        assert_eq!("none".parse::<PowerTransform>().unwrap(), PowerTransform::None);
        assert!("sqrt".parse::<PowerTransform>().is_err());
        assert_eq!(PowerTransform::FourthRoot.to_string(), "4rt");
    }

    #[test]
    fn test_fourth_root_round_trip() {
        let bias = BiasCorrection::default();
        let cases = [
            (0.0, 1_000_000.0, ScaleFactors::new(0.0, 1.0)),
            (12.0, 500_000.0, ScaleFactors::new(-1.2, 0.8)),
            (2500.0, 39_000_000.0, ScaleFactors::new(0.4, 1.7).with_scale_offset(0.01)),
            (1.0e5, 8_000_000.0, ScaleFactors::new(3.0, 0.3)),
        ];
        for (count, pop, factors) in cases {
            let t = PowerTransform::FourthRoot.forward(count, pop, &factors, &bias);
            let back = PowerTransform::FourthRoot.inverse(t, pop, &factors, &bias);
            assert!((back - count).abs() < 1e-8 * count.max(1.0), "{} -> {} -> {}", count, t, back);
        }
    }

    #[test]
    fn test_identity_round_trip() {
        let bias = BiasCorrection::default();
        let factors = ScaleFactors::new(0.5, 2.0);
        let t = PowerTransform::None.forward(40.0, 200_000.0, &factors, &bias);
        assert!((t - (20.0 / 2.0 - 0.5)).abs() < 1e-12);
        let back = PowerTransform::None.inverse(t, 200_000.0, &factors, &bias);
        assert!((back - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_clamps_to_zero() {
        let bias = BiasCorrection::default();
        let factors = ScaleFactors::new(0.0, 1.0);
        for t in [-1.0e6, -3.0, 0.0, 0.5] {
            assert_eq!(PowerTransform::FourthRoot.inverse(t, 1_000_000.0, &factors, &bias), 0.0);
        }
        assert_eq!(PowerTransform::None.inverse(-2.0, 1_000_000.0, &factors, &bias), 0.0);
    }

    #[test]
    fn test_bias_constants() {
        let bias = BiasCorrection::default();
        assert!((bias.total() - (0.01 + 0.31640625)).abs() < 1e-15);
    }
}
