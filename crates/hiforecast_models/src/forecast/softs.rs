//! SOFTS: one STAD encoder and projection per horizon segment.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use hiforecast_core::TSForecastingModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{segment_lengths, CommonParams};
use crate::error::{ModelError, Result};
use crate::layers::{instance_normalize, DataEmbeddingInverted, EncoderConfig, StadEncoder};

fn default_hidden_size() -> usize {
    512
}
fn default_d_core() -> usize {
    512
}
fn default_e_layers() -> usize {
    2
}
fn default_d_ff() -> usize {
    2048
}
fn default_dropout() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}
fn default_segments() -> usize {
    4
}

/// Configuration for [`SOFTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SOFTSConfig {
    /// Forecast horizon.
    pub h: usize,
    /// Look-back window length.
    pub input_size: usize,
    /// Number of series.
    pub n_series: usize,
    /// Token width.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// STAD core width.
    #[serde(default = "default_d_core")]
    pub d_core: usize,
    /// Layers of each segment encoder.
    #[serde(default = "default_e_layers")]
    pub e_layers: usize,
    /// Feed-forward width.
    #[serde(default = "default_d_ff")]
    pub d_ff: usize,
    /// Dropout rate.
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Instance-normalize inputs and denormalize forecasts.
    #[serde(default = "default_true")]
    pub use_norm: bool,
    /// Number of horizon segments.
    #[serde(default = "default_segments")]
    pub segments: usize,
}

impl Default for SOFTSConfig {
    fn default() -> Self {
        Self {
            h: 24,
            input_size: 96,
            n_series: 1,
            hidden_size: default_hidden_size(),
            d_core: default_d_core(),
            e_layers: default_e_layers(),
            d_ff: default_d_ff(),
            dropout: default_dropout(),
            use_norm: true,
            segments: default_segments(),
        }
    }
}

impl SOFTSConfig {
    /// Create a new config.
    pub fn new(h: usize, input_size: usize, n_series: usize) -> Self {
        Self {
            h,
            input_size,
            n_series,
            ..Default::default()
        }
    }

    /// Set hidden size.
    #[must_use]
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set STAD core width.
    #[must_use]
    pub fn with_d_core(mut self, d_core: usize) -> Self {
        self.d_core = d_core;
        self
    }

    /// Set number of encoder layers.
    #[must_use]
    pub fn with_e_layers(mut self, e_layers: usize) -> Self {
        self.e_layers = e_layers;
        self
    }

    /// Set feed-forward width.
    #[must_use]
    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = d_ff;
        self
    }

    /// Set dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Enable or disable instance normalization.
    #[must_use]
    pub fn with_use_norm(mut self, use_norm: bool) -> Self {
        self.use_norm = use_norm;
        self
    }

    /// Set the number of horizon segments.
    #[must_use]
    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    /// Check every hyper-parameter.
    pub fn validate(&self) -> Result<()> {
        CommonParams {
            h: self.h,
            input_size: self.input_size,
            n_series: self.n_series,
            hidden_size: self.hidden_size,
            e_layers: self.e_layers,
            d_ff: self.d_ff,
            dropout: self.dropout,
        }
        .validate()?;
        if self.d_core == 0 {
            return Err(ModelError::InvalidConfig("d_core must be positive".into()));
        }
        if self.segments == 0 || self.segments > self.h {
            return Err(ModelError::InvalidConfig(format!(
                "segments must be in 1..={}, got {}",
                self.h, self.segments
            )));
        }
        Ok(())
    }

    /// Validate and build the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SOFTS<B>> {
        self.validate()?;
        Ok(SOFTS::new(self, device))
    }
}

/// Segmented STAD forecaster.
#[derive(Module, Debug)]
pub struct SOFTS<B: Backend> {
    embedding: DataEmbeddingInverted<B>,
    encoders: Vec<StadEncoder<B>>,
    projections: Vec<Linear<B>>,
    h: usize,
    input_size: usize,
    n_series: usize,
    use_norm: bool,
}

impl<B: Backend> SOFTS<B> {
    fn new(config: &SOFTSConfig, device: &B::Device) -> Self {
        let hidden = config.hidden_size;
        let encoder_config = EncoderConfig::new(hidden, config.e_layers)
            .with_d_ff(config.d_ff)
            .with_dropout(config.dropout)
            .with_final_norm(false);

        let lengths = segment_lengths(config.h, config.segments);
        let encoders = lengths
            .iter()
            .map(|_| encoder_config.init_stad(config.d_core, device))
            .collect();
        let projections = lengths
            .iter()
            .map(|&len| LinearConfig::new(hidden, len).init(device))
            .collect();

        debug!(segments = ?lengths, "built SOFTS");

        Self {
            embedding: DataEmbeddingInverted::new(config.input_size, hidden, config.dropout, device),
            encoders,
            projections,
            h: config.h,
            input_size: config.input_size,
            n_series: config.n_series,
            use_norm: config.use_norm,
        }
    }

    /// Number of horizon segments.
    pub fn segments(&self) -> usize {
        self.encoders.len()
    }
}

impl<B: Backend> TSForecastingModel<B> for SOFTS<B> {
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let (x, stats) = if self.use_norm {
            let (z, stats) = instance_normalize(x);
            (z, Some(stats))
        } else {
            (x, None)
        };

        let tokens = self.embedding.forward(x, None);
        let segments = self
            .encoders
            .iter()
            .zip(&self.projections)
            .map(|(encoder, projection)| projection.forward(encoder.forward(tokens.clone())))
            .collect();
        let out = Tensor::cat(segments, 2);

        match stats {
            Some(stats) => stats.denormalize(out),
            None => out,
        }
    }

    fn horizon(&self) -> usize {
        self.h
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn n_series(&self) -> usize {
        self.n_series
    }

    fn name(&self) -> &'static str {
        "SOFTS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small(h: usize, segments: usize) -> SOFTSConfig {
        SOFTSConfig::new(h, 12, 5)
            .with_hidden_size(16)
            .with_d_core(8)
            .with_d_ff(32)
            .with_e_layers(1)
            .with_segments(segments)
    }

    #[test]
    fn test_forecast_covers_full_horizon() {
        let device = Default::default();
        for (h, segments) in [(8, 4), (9, 4), (5, 1), (3, 3)] {
            let model = small(h, segments).init::<TestBackend>(&device).unwrap();
            assert_eq!(model.segments(), segments);
            let x = Tensor::<TestBackend, 3>::random([2, 5, 12], Distribution::Default, &device);
            assert_eq!(model.forecast(x).dims(), [2, 5, h]);
        }
    }

    #[test]
    fn test_inference_is_deterministic() {
        let device = Default::default();
        let model = small(8, 4).init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 3>::random([2, 5, 12], Distribution::Default, &device);
        let a = model.forecast(x.clone());
        let b = model.forecast(x);
        let diff: f32 = (a - b).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_constant_input_forecasts_its_level() {
        let device = Default::default();
        let model = small(8, 4).init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 3>::ones([1, 5, 12], &device).mul_scalar(42.0);
        let y: Vec<f32> = model.forecast(x).into_data().iter::<f32>().collect();
        assert!(y.iter().all(|v| (v - 42.0).abs() < 0.1), "{y:?}");
    }

    #[test]
    fn test_stad_stack_has_no_final_norm() {
        // embedding 72, STAD layer 596, projection 36; a final LayerNorm(8) would add 16
        let model = SOFTSConfig::new(4, 8, 3)
            .with_hidden_size(8)
            .with_d_core(4)
            .with_d_ff(16)
            .with_e_layers(1)
            .with_segments(1)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        assert_eq!(model.num_params(), 704);
    }

    #[test]
    fn test_validation() {
        assert!(small(3, 4).validate().is_err());
        assert!(small(8, 0).validate().is_err());
        assert!(small(8, 4).with_d_core(0).validate().is_err());
    }
}
