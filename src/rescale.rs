//! Inverse rescaling
//!
//! Turns model-scale predictions back into reported incidence counts.
//! The operations are applied in a fixed order because the power transform
//! is nonlinear:
//!
//! 1. add the predicted increment to the last observed centered and scaled value;
//! 2. undo centering and scaling with the series' own factors;
//! 3. floor at zero, raise to the transform power and remove the bias terms;
//! 4. convert the rate per 100,000 to a count with the series population;
//! 5. clamp at zero.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::GBQ_SCALE_OFFSET;
use crate::data::ObservationMeta;
use crate::transform::{BiasCorrection, PowerTransform, ScaleFactors};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseRescaler {
    pub transform: PowerTransform,
    pub bias: BiasCorrection,
    /// Added to each series' scale factor before unscaling.
    pub scale_offset: f64,
}

impl InverseRescaler {
    pub fn new(transform: PowerTransform, bias: BiasCorrection, scale_offset: f64) -> Self {
        InverseRescaler {
            transform,
            bias,
            scale_offset,
        }
    }

    /// Convention of the gradient boosting model: fourth root, scale factor
    /// widened by 0.01.
    pub fn gbq(transform: PowerTransform) -> Self {
        InverseRescaler::new(transform, BiasCorrection::default(), GBQ_SCALE_OFFSET)
    }

    /// Convention of the autoregressive model: scale factors used as is.
    pub fn sarix(transform: PowerTransform) -> Self {
        InverseRescaler::new(transform, BiasCorrection::default(), 0.0)
    }

    fn factors(&self, meta: &ObservationMeta) -> ScaleFactors {
        ScaleFactors::new(meta.inc_trans_center_factor, meta.inc_trans_scale_factor).with_scale_offset(self.scale_offset)
    }

    /// Rescale an absolute value on the centered and scaled transformed scale.
    /// The result is always finite and non-negative; non-finite inputs or
    /// results map to zero.
    pub fn rescale(&self, value_cs: f64, meta: &ObservationMeta) -> f64 {
        let count = self
            .transform
            .inverse(value_cs, meta.pop, &self.factors(meta), &self.bias);
        if value_cs.is_finite() && count.is_finite() {
            count
        } else {
            warn!(
                "non-finite value {} for location {} on {} clamped to 0",
                value_cs, meta.location, meta.wk_end_date
            );
            0.0
        }
    }

    /// Rescale a predicted increment over the last observed value.
    pub fn rescale_delta(&self, delta: f64, meta: &ObservationMeta) -> f64 {
        self.rescale(meta.inc_trans_cs + delta, meta)
    }

    /// Rescale a `[row][quantile]` block of increments, row metadata aligned.
    pub fn rescale_deltas(&self, deltas: &[Vec<f64>], meta: &[ObservationMeta]) -> Vec<Vec<f64>> {
        deltas
            .iter()
            .zip(meta)
            .map(|(row, m)| row.iter().map(|d| self.rescale_delta(*d, m)).collect())
            .collect()
    }
}
