//! Point losses for forecasts.
//!
//! All losses take `(B, V, H)` predictions and targets and reduce to a
//! single-element tensor with the mean over every element. Ratios with a
//! zero denominator contribute zero instead of NaN.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Threshold between the quadratic and linear regions of [`PointLoss::Huber`].
pub const HUBER_DELTA: f64 = 1.0;

/// A point forecast loss, selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointLoss {
    /// Mean absolute error.
    #[default]
    Mae,
    /// Mean squared error.
    Mse,
    /// Root mean squared error.
    Rmse,
    /// Mean absolute percentage error.
    Mape,
    /// Symmetric mean absolute percentage error, in `[0, 2]`.
    Smape,
    /// Huber loss with `delta = 1`.
    Huber,
}

impl PointLoss {
    /// Every loss.
    pub const ALL: [PointLoss; 6] = [
        PointLoss::Mae,
        PointLoss::Mse,
        PointLoss::Rmse,
        PointLoss::Mape,
        PointLoss::Smape,
        PointLoss::Huber,
    ];

    /// Configuration name.
    pub const fn name(&self) -> &'static str {
        match self {
            PointLoss::Mae => "mae",
            PointLoss::Mse => "mse",
            PointLoss::Rmse => "rmse",
            PointLoss::Mape => "mape",
            PointLoss::Smape => "smape",
            PointLoss::Huber => "huber",
        }
    }

    /// Compute the loss.
    pub fn forward<B: Backend>(&self, preds: Tensor<B, 3>, targets: Tensor<B, 3>) -> Tensor<B, 1> {
        let diff = preds.clone() - targets.clone();
        match self {
            PointLoss::Mae => diff.abs().mean(),
            PointLoss::Mse => diff.powf_scalar(2.0).mean(),
            PointLoss::Rmse => diff.powf_scalar(2.0).mean().sqrt(),
            PointLoss::Mape => divide_no_nan(diff.abs(), targets.abs()).mean(),
            PointLoss::Smape => {
                let denom = targets.abs() + preds.abs();
                divide_no_nan(diff.abs().mul_scalar(2.0), denom).mean()
            }
            PointLoss::Huber => {
                let abs = diff.abs();
                let quadratic = abs.clone().clamp_max(HUBER_DELTA);
                let linear = abs - quadratic.clone();
                (quadratic.powf_scalar(2.0).mul_scalar(0.5) + linear.mul_scalar(HUBER_DELTA)).mean()
            }
        }
    }
}

impl fmt::Display for PointLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PointLoss {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointLoss::ALL
            .into_iter()
            .find(|l| l.name() == s.to_lowercase())
            .ok_or_else(|| TrainError::InvalidConfig(format!("unknown loss '{s}'")))
    }
}

/// `num / denom` with zero where `denom == 0`.
pub(crate) fn divide_no_nan<B: Backend>(num: Tensor<B, 3>, denom: Tensor<B, 3>) -> Tensor<B, 3> {
    let zero = denom.clone().equal_elem(0.0);
    let safe = denom.mask_fill(zero.clone(), 1.0);
    (num / safe).mask_fill(zero, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tensor(values: [f32; 4]) -> Tensor<TestBackend, 3> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape([1, 2, 2])
    }

    fn scalar(loss: PointLoss, preds: [f32; 4], targets: [f32; 4]) -> f32 {
        loss.forward(tensor(preds), tensor(targets)).into_scalar()
    }

    #[test]
    fn test_error_losses() {
        let preds = [1.0, 2.0, 3.0, 4.0];
        let targets = [1.0, 0.0, 3.0, 8.0];
        assert_abs_diff_eq!(scalar(PointLoss::Mae, preds, targets), 1.5);
        assert_abs_diff_eq!(scalar(PointLoss::Mse, preds, targets), 5.0);
        assert_abs_diff_eq!(scalar(PointLoss::Rmse, preds, targets), 5.0f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_percentage_losses_ignore_zero_denominators() {
        let preds = [2.0, 5.0, 0.0, 3.0];
        let targets = [1.0, 0.0, 0.0, 3.0];
        // |2-1|/1 = 1, 5/0 -> 0, 0/0 -> 0, 0
        assert_abs_diff_eq!(scalar(PointLoss::Mape, preds, targets), 0.25);
        // 2*1/3, 2*5/5 = 2, 0/0 -> 0, 0
        assert_abs_diff_eq!(
            scalar(PointLoss::Smape, preds, targets),
            (2.0 / 3.0 + 2.0) / 4.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_huber_regions() {
        let preds = [0.5, 3.0, 0.0, 0.0];
        let targets = [0.0; 4];
        // 0.5 * 0.25 = 0.125 ; 3 - 0.5 = 2.5
        assert_abs_diff_eq!(scalar(PointLoss::Huber, preds, targets), (0.125 + 2.5) / 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_names() {
        assert_eq!("SMAPE".parse::<PointLoss>().unwrap(), PointLoss::Smape);
        assert!("quantile".parse::<PointLoss>().is_err());
        assert_eq!(PointLoss::default(), PointLoss::Mae);
        assert_eq!(serde_json::to_string(&PointLoss::Huber).unwrap(), "\"huber\"");
    }
}
