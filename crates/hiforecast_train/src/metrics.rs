//! Forecast accuracy metrics.

use std::fmt;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::losses::PointLoss;

/// Trait for forecast metrics on `(B, V, H)` tensors.
pub trait Metric<B: Backend>: Send + Sync {
    /// Compute the metric from predictions and targets.
    fn compute(&self, preds: &Tensor<B, 3>, targets: &Tensor<B, 3>) -> f32;

    /// Get the metric name.
    fn name(&self) -> &str;

    /// Whether higher is better.
    fn higher_is_better(&self) -> bool {
        false
    }
}

macro_rules! point_metric {
    ($name:ident, $loss:expr, $label:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Default)]
        pub struct $name;

        impl<B: Backend> Metric<B> for $name {
            fn compute(&self, preds: &Tensor<B, 3>, targets: &Tensor<B, 3>) -> f32 {
                $loss
                    .forward(preds.clone(), targets.clone())
                    .into_scalar()
                    .elem()
            }

            fn name(&self) -> &str {
                $label
            }
        }
    };
}

point_metric!(MAE, PointLoss::Mae, "mae", "Mean Absolute Error metric.");
point_metric!(MSE, PointLoss::Mse, "mse", "Mean Squared Error metric.");
point_metric!(RMSE, PointLoss::Rmse, "rmse", "Root Mean Squared Error metric.");
point_metric!(MAPE, PointLoss::Mape, "mape", "Mean Absolute Percentage Error metric.");
point_metric!(SMAPE, PointLoss::Smape, "smape", "Symmetric Mean Absolute Percentage Error metric.");

/// All forecast metrics over a set of windows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean absolute error.
    pub mae: f64,
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute percentage error.
    pub mape: f64,
    /// Symmetric mean absolute percentage error.
    pub smape: f64,
}

impl ForecastMetrics {
    /// Metrics of a single batch.
    pub fn compute<B: Backend>(preds: Tensor<B, 3>, targets: Tensor<B, 3>) -> Self {
        let mut acc = MetricsAccumulator::default();
        acc.update(preds, targets);
        acc.finish()
    }

    /// `(name, value)` pairs in a fixed order.
    pub fn as_pairs(&self) -> [(&'static str, f64); 5] {
        [
            ("mae", self.mae),
            ("mse", self.mse),
            ("rmse", self.rmse),
            ("mape", self.mape),
            ("smape", self.smape),
        ]
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .as_pairs()
            .iter()
            .map(|(name, value)| format!("{name}={value:.6}"))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Running sums for [`ForecastMetrics`] across batches, so every element
/// is weighted equally regardless of batch size.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    abs: f64,
    sq: f64,
    ape: f64,
    sape: f64,
    count: usize,
}

impl MetricsAccumulator {
    /// Add one batch of predictions and targets.
    pub fn update<B: Backend>(&mut self, preds: Tensor<B, 3>, targets: Tensor<B, 3>) {
        let preds: Vec<f32> = preds.into_data().iter::<f32>().collect();
        let targets: Vec<f32> = targets.into_data().iter::<f32>().collect();
        for (&p, &y) in preds.iter().zip(&targets) {
            let (p, y) = (f64::from(p), f64::from(y));
            let err = (p - y).abs();
            self.abs += err;
            self.sq += err * err;
            if y != 0.0 {
                self.ape += err / y.abs();
            }
            let denom = p.abs() + y.abs();
            if denom != 0.0 {
                self.sape += 2.0 * err / denom;
            }
        }
        self.count += preds.len().min(targets.len());
    }

    /// Number of elements seen.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Final metrics; all zero when nothing was added.
    pub fn finish(&self) -> ForecastMetrics {
        if self.count == 0 {
            return ForecastMetrics::default();
        }
        let n = self.count as f64;
        let mse = self.sq / n;
        ForecastMetrics {
            mae: self.abs / n,
            mse,
            rmse: mse.sqrt(),
            mape: self.ape / n,
            smape: self.sape / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tensor(values: &[f32], shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape(shape)
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(<MAE as Metric<TestBackend>>::name(&MAE), "mae");
        assert_eq!(<SMAPE as Metric<TestBackend>>::name(&SMAPE), "smape");
        assert!(!<RMSE as Metric<TestBackend>>::higher_is_better(&RMSE));
    }

    #[test]
    fn test_metrics_match_losses() {
        let preds = tensor(&[1.0, 2.0, 3.0, 4.0], [1, 2, 2]);
        let targets = tensor(&[2.0, 2.0, 1.0, 4.0], [1, 2, 2]);
        let metrics = ForecastMetrics::compute(preds.clone(), targets.clone());

        assert_abs_diff_eq!(metrics.mae, 0.75);
        assert_abs_diff_eq!(metrics.mse, 1.25);
        assert_abs_diff_eq!(metrics.rmse, 1.25f64.sqrt());
        assert_abs_diff_eq!(
            metrics.mae,
            f64::from(MAE.compute(&preds, &targets)),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            metrics.smape,
            f64::from(SMAPE.compute(&preds, &targets)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_accumulator_weights_elements_equally() {
        let mut acc = MetricsAccumulator::default();
        acc.update(tensor(&[1.0, 1.0], [1, 1, 2]), tensor(&[0.0, 0.0], [1, 1, 2]));
        acc.update(tensor(&[3.0; 4], [2, 1, 2]), tensor(&[0.0; 4], [2, 1, 2]));
        assert_eq!(acc.count(), 6);
        assert_abs_diff_eq!(acc.finish().mae, 14.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_accumulator() {
        let metrics = MetricsAccumulator::default().finish();
        assert_eq!(metrics, ForecastMetrics::default());
        assert!(metrics.to_string().starts_with("mae=0.000000"));
    }
}
