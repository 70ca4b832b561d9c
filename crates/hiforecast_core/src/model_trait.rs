//! The seam between forecasting models and the trainer.

use burn::module::Module;
use burn::prelude::*;

/// A multivariate point forecaster.
///
/// Maps `(B, V, input_size)` look-back windows to `(B, V, horizon)`
/// forecasts. Whether the model behaves stochastically (dropout, STAD
/// sampling) follows the backend: autodiff backends train, inner backends
/// infer.
pub trait TSForecastingModel<B: Backend>: Module<B> {
    /// Forecast the next `horizon()` steps of every series.
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3>;

    /// Number of forecast steps.
    fn horizon(&self) -> usize;

    /// Number of look-back steps expected in the input.
    fn input_size(&self) -> usize;

    /// Number of series the model was built for.
    fn n_series(&self) -> usize;

    /// Architecture name, as registered.
    fn name(&self) -> &'static str;
}
