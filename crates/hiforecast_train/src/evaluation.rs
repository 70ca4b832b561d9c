//! Forecasting and evaluation with trained models.
//!
//! Every function scales the look-back window with the same scaler the
//! model was trained with and maps the forecast back before returning it.

use burn::prelude::*;
use hiforecast_core::{Split, TSForecastingModel, TSShape, TSTensor};
use hiforecast_data::{MultivariatePanel, TSDataLoader, WindowDataset};
use hiforecast_models::ScalerType;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::metrics::{ForecastMetrics, MetricsAccumulator};

/// Metrics over the test windows of a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Number of windows evaluated.
    pub n_windows: usize,
    /// Accuracy metrics in the original scale.
    pub metrics: ForecastMetrics,
}

fn check_series<B: Backend, M: TSForecastingModel<B>>(model: &M, n_series: usize) -> Result<()> {
    if n_series != model.n_series() {
        return Err(TrainError::InsufficientData(format!(
            "panel has {n_series} series, model expects {}",
            model.n_series()
        )));
    }
    Ok(())
}

fn scaled_forecast<B: Backend, M: TSForecastingModel<B>>(
    model: &M,
    scaler: ScalerType,
    x: Tensor<B, 3>,
) -> Tensor<B, 3> {
    let (z, stats) = scaler.fit_transform(x);
    stats.inverse_transform(model.forecast(z))
}

fn to_array3<B: Backend>(tensor: Tensor<B, 3>) -> Result<Array3<f32>> {
    let [b, v, h] = tensor.dims();
    let values: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    Array3::from_shape_vec((b, v, h), values).map_err(|e| TrainError::ShapeError(e.to_string()))
}

/// Forecast the `h` steps that follow the end of `panel`.
///
/// Uses the last `input_size` observations of every series and returns a
/// `(V, h)` array.
pub fn predict<B, M>(
    model: &M,
    panel: &MultivariatePanel,
    scaler: ScalerType,
    device: &B::Device,
) -> Result<Array2<f32>>
where
    B: Backend,
    M: TSForecastingModel<B>,
{
    check_series(model, panel.n_series())?;
    let window = panel.last_window(model.input_size())?;
    let shape = TSShape::new(1, panel.n_series(), model.input_size());
    let x = TSTensor::<B>::from_values(window.into_iter().collect(), shape, device)?;

    let forecast = to_array3(scaled_forecast(model, scaler, x.into_inner()))?;
    Ok(forecast.index_axis_move(Axis(0), 0))
}

/// Forecast every window of `dataset`, returning `(N, V, h)`.
pub fn predict_windows<B, M>(
    model: &M,
    dataset: &WindowDataset,
    scaler: ScalerType,
    batch_size: usize,
    device: &B::Device,
) -> Result<Array3<f32>>
where
    B: Backend,
    M: TSForecastingModel<B>,
{
    check_series(model, dataset.n_series())?;
    let loader = TSDataLoader::builder(dataset.clone())
        .batch_size(batch_size)
        .split(Split::Test)
        .build()?;

    let mut batches = Vec::with_capacity(loader.n_batches());
    for batch in loader.iter::<B>(device, 0) {
        let batch = batch?;
        batches.push(to_array3(scaled_forecast(model, scaler, batch.x.into_inner()))?);
    }
    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|e| TrainError::ShapeError(e.to_string()))
}

/// Point metrics over all windows of `panel`.
///
/// `panel` should carry `input_size` steps of look-back before its first
/// target, as the test panel of [`hiforecast_data::temporal_split`] does.
pub fn evaluate<B, M>(
    model: &M,
    panel: &MultivariatePanel,
    scaler: ScalerType,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationResult>
where
    B: Backend,
    M: TSForecastingModel<B>,
{
    check_series(model, panel.n_series())?;
    let windows = panel.windows(model.input_size(), model.horizon(), 1)?;
    let loader = TSDataLoader::builder(windows)
        .batch_size(batch_size)
        .split(Split::Test)
        .build()?;

    let mut acc = MetricsAccumulator::default();
    for batch in loader.iter::<B>(device, 0) {
        let batch = batch?;
        let y = batch
            .y
            .ok_or_else(|| TrainError::InsufficientData("test batch without targets".into()))?;
        let y_hat = scaled_forecast(model, scaler, batch.x.into_inner());
        acc.update(y_hat, y);
    }

    let result = EvaluationResult {
        n_windows: loader.len(),
        metrics: acc.finish(),
    };
    info!(model = model.name(), windows = result.n_windows, metrics = %result.metrics, "evaluation");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn_ndarray::NdArray;
    use hiforecast_models::{SOFTSConfig, SOFTS};

    type TestBackend = NdArray;

    fn model() -> SOFTS<TestBackend> {
        SOFTSConfig::new(3, 8, 2)
            .with_hidden_size(8)
            .with_d_core(4)
            .with_d_ff(8)
            .with_e_layers(1)
            .with_segments(1)
            .init(&Default::default())
            .unwrap()
    }

    fn constant_panel(level: f32) -> MultivariatePanel {
        MultivariatePanel::from_array(Array2::from_elem((2, 30), level)).unwrap()
    }

    #[test]
    fn test_predict_shape() {
        let panel = MultivariatePanel::from_array(Array2::from_shape_fn((2, 30), |(v, t)| {
            (v * 30 + t) as f32
        }))
        .unwrap();
        let forecast = predict(&model(), &panel, ScalerType::Standard, &Default::default()).unwrap();
        assert_eq!(forecast.dim(), (2, 3));
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_predict_windows_matches_dataset() {
        let panel = constant_panel(1.0);
        let dataset = panel.windows(8, 3, 1).unwrap();
        let forecasts =
            predict_windows(&model(), &dataset, ScalerType::Identity, 4, &Default::default()).unwrap();
        assert_eq!(forecasts.dim(), (dataset.len(), 2, 3));
    }

    #[test]
    fn test_constant_series_forecasts_its_level() {
        // Instance normalization maps a flat window to its level.
        let panel = constant_panel(7.0);
        let result = evaluate(&model(), &panel, ScalerType::Identity, 8, &Default::default()).unwrap();
        assert_eq!(result.n_windows, 30 - 8 - 3 + 1);
        assert_abs_diff_eq!(result.metrics.mae, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_series_mismatch() {
        let panel = MultivariatePanel::from_array(Array2::zeros((5, 30))).unwrap();
        assert!(predict(&model(), &panel, ScalerType::Identity, &Default::default()).is_err());
    }
}
