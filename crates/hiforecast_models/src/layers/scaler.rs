//! Temporal scalers applied to each window before the model sees it.
//!
//! Statistics come from the insample window of every series; forecasts are
//! mapped back with the same statistics before the loss is computed.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Scales below this are replaced by one.
const MIN_SCALE: f32 = 1e-8;

/// Which statistics to standardize windows with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerType {
    /// Leave values untouched.
    #[default]
    Identity,
    /// Mean and standard deviation.
    Standard,
    /// Median and median absolute deviation.
    Robust,
    /// Map the window range to `[0, 1]`.
    #[serde(rename = "minmax")]
    MinMax,
    /// Map the window range to `[-1, 1]`.
    #[serde(rename = "minmax1")]
    MinMax1,
    /// Robust scaling followed by `asinh`.
    Invariant,
}

impl ScalerType {
    /// Every scaler, in documentation order.
    pub const ALL: [ScalerType; 6] = [
        ScalerType::Identity,
        ScalerType::Standard,
        ScalerType::Robust,
        ScalerType::MinMax,
        ScalerType::MinMax1,
        ScalerType::Invariant,
    ];

    /// The configuration name of this scaler.
    pub const fn name(&self) -> &'static str {
        match self {
            ScalerType::Identity => "identity",
            ScalerType::Standard => "standard",
            ScalerType::Robust => "robust",
            ScalerType::MinMax => "minmax",
            ScalerType::MinMax1 => "minmax1",
            ScalerType::Invariant => "invariant",
        }
    }

    /// Compute statistics on `x` `(B, V, L)` and return the scaled window.
    pub fn fit_transform<B: Backend>(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, ScalerStats<B>) {
        let stats = self.fit(x.clone());
        (stats.transform(x), stats)
    }

    /// Compute `(B, V, 1)` shift and scale statistics over time.
    pub fn fit<B: Backend>(&self, x: Tensor<B, 3>) -> ScalerStats<B> {
        let [batch, n_series, _] = x.dims();
        let device = x.device();
        let (shift, scale) = match self {
            ScalerType::Identity => (
                Tensor::zeros([batch, n_series, 1], &device),
                Tensor::ones([batch, n_series, 1], &device),
            ),
            ScalerType::Standard => {
                let mean = x.clone().mean_dim(2);
                let std = (x - mean.clone()).powf_scalar(2.0).mean_dim(2).sqrt();
                (mean, std)
            }
            ScalerType::Robust | ScalerType::Invariant => {
                let median = median_over_time(x.clone());
                let mad = median_over_time((x - median.clone()).abs());
                (median, mad)
            }
            ScalerType::MinMax | ScalerType::MinMax1 => {
                let min = x.clone().min_dim(2);
                let max = x.max_dim(2);
                let range = max - min.clone();
                (min, range)
            }
        };
        let scale = scale.detach();
        let degenerate = scale.clone().lower_elem(MIN_SCALE);
        ScalerStats {
            kind: *self,
            shift: shift.detach(),
            scale: scale.mask_fill(degenerate, 1.0),
        }
    }
}

impl fmt::Display for ScalerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalerType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalerType::ALL
            .into_iter()
            .find(|t| t.name() == s.to_lowercase())
            .ok_or_else(|| ModelError::InvalidConfig(format!("unknown scaler_type '{s}'")))
    }
}

/// Fitted statistics of a [`ScalerType`].
#[derive(Debug, Clone)]
pub struct ScalerStats<B: Backend> {
    kind: ScalerType,
    /// `(B, V, 1)` location.
    pub shift: Tensor<B, 3>,
    /// `(B, V, 1)` spread, never below `1e-8`.
    pub scale: Tensor<B, 3>,
}

impl<B: Backend> ScalerStats<B> {
    /// Scale a `(B, V, T)` tensor with these statistics.
    pub fn transform(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        if self.kind == ScalerType::Identity {
            return x;
        }
        let z = (x - self.shift.clone()) / self.scale.clone();
        match self.kind {
            ScalerType::MinMax1 => z.mul_scalar(2.0).sub_scalar(1.0),
            ScalerType::Invariant => asinh(z),
            _ => z,
        }
    }

    /// Map a `(B, V, H)` tensor back to the original scale.
    pub fn inverse_transform(&self, y: Tensor<B, 3>) -> Tensor<B, 3> {
        if self.kind == ScalerType::Identity {
            return y;
        }
        let z = match self.kind {
            ScalerType::MinMax1 => y.add_scalar(1.0).div_scalar(2.0),
            ScalerType::Invariant => sinh(y),
            _ => y,
        };
        z * self.scale.clone() + self.shift.clone()
    }
}

/// Lower median along time, as `(B, V, 1)`.
fn median_over_time<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, n_series, len] = x.dims();
    let mid = (len - 1) / 2;
    x.sort(2).slice([0..batch, 0..n_series, mid..mid + 1])
}

fn asinh<B: Backend>(z: Tensor<B, 3>) -> Tensor<B, 3> {
    let root = z.clone().powf_scalar(2.0).add_scalar(1.0).sqrt();
    (z + root).log()
}

fn sinh<B: Backend>(z: Tensor<B, 3>) -> Tensor<B, 3> {
    (z.clone().exp() - z.neg().exp()).div_scalar(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn values(x: Tensor<TestBackend, 3>) -> Vec<f32> {
        x.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("robust".parse::<ScalerType>().unwrap(), ScalerType::Robust);
        assert_eq!("MinMax1".parse::<ScalerType>().unwrap(), ScalerType::MinMax1);
        assert!(matches!(
            "zscore".parse::<ScalerType>(),
            Err(ModelError::InvalidConfig(_))
        ));
        let json = serde_json::to_string(&ScalerType::MinMax).unwrap();
        assert_eq!(json, "\"minmax\"");
    }

    #[test]
    fn test_minmax_ranges() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([2.0, 4.0, 6.0], &device).reshape([1, 1, 3]);

        let (z, _) = ScalerType::MinMax.fit_transform(x.clone());
        assert_eq!(values(z), vec![0.0, 0.5, 1.0]);

        let (z, _) = ScalerType::MinMax1.fit_transform(x);
        assert_eq!(values(z), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_robust_uses_median() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 100.0, 3.0, 2.0, 4.0], &device)
            .reshape([1, 1, 5]);
        let stats = ScalerType::Robust.fit(x);
        assert_eq!(values(stats.shift), vec![3.0]);
    }

    #[test]
    fn test_inverse_round_trip_for_every_scaler() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([2, 3, 16], Distribution::Normal(10.0, 3.0), &device);
        for kind in ScalerType::ALL {
            let (z, stats) = kind.fit_transform(x.clone());
            let back = stats.inverse_transform(z);
            let err: f32 = (back - x.clone()).abs().max().into_scalar();
            assert!(err < 1e-3, "{kind} round trip error {err}");
        }
    }

    #[test]
    fn test_constant_window_keeps_unit_scale() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::ones([1, 1, 4], &device);
        let stats = ScalerType::Standard.fit(x.clone());
        assert_abs_diff_eq!(values(stats.scale.clone())[0], 1.0);
        assert_eq!(values(stats.transform(x)), vec![0.0; 4]);
    }
}
