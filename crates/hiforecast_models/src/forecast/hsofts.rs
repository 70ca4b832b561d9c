//! HSOFTS: STAD series mixing over frequency-normalized inputs, followed by
//! a stack of parallel and per-segment projection heads.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use hiforecast_core::TSForecastingModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{segment_lengths, CommonParams};
use crate::error::{ModelError, Result};
use crate::layers::smoothing::normalize_frequencies;
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
fn default_projectors() -> usize {
    4
}
fn default_target_frequency() -> f64 {
    0.75
}

/// Configuration for [`HSOFTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HSOFTSConfig {
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
    /// Encoder layers.
    #[serde(default = "default_e_layers")]
    pub e_layers: usize,
    /// Feed-forward width.
    #[serde(default = "default_d_ff")]
    pub d_ff: usize,
    /// Dropout rate.
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Instance-normalize and frequency-normalize inputs.
    #[serde(default = "default_true")]
    pub use_norm: bool,
    /// Number of parallel heads, and of horizon segments.
    #[serde(default = "default_projectors")]
    pub projectors: usize,
    /// Spectral magnitude the Gaussian smoothing is calibrated against.
    #[serde(default = "default_target_frequency")]
    pub target_frequency: f64,
}

impl Default for HSOFTSConfig {
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
            projectors: default_projectors(),
            target_frequency: default_target_frequency(),
        }
    }
}

impl HSOFTSConfig {
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

    /// Enable or disable input normalization.
    #[must_use]
    pub fn with_use_norm(mut self, use_norm: bool) -> Self {
        self.use_norm = use_norm;
        self
    }

    /// Set the number of projector heads.
    #[must_use]
    pub fn with_projectors(mut self, projectors: usize) -> Self {
        self.projectors = projectors;
        self
    }

    /// Set the target spectral magnitude.
    #[must_use]
    pub fn with_target_frequency(mut self, target_frequency: f64) -> Self {
        self.target_frequency = target_frequency;
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
        if self.projectors == 0 || self.projectors > self.h {
            return Err(ModelError::InvalidConfig(format!(
                "projectors must be in 1..={}, got {}",
                self.h, self.projectors
            )));
        }
        if !(self.target_frequency.is_finite() && self.target_frequency > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "target_frequency must be positive, got {}",
                self.target_frequency
            )));
        }
        Ok(())
    }

    /// Validate and build the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<HSOFTS<B>> {
        self.validate()?;
        Ok(HSOFTS::new(self, device))
    }
}

/// STAD forecaster with stacked projection heads.
#[derive(Module, Debug)]
pub struct HSOFTS<B: Backend> {
    embedding: DataEmbeddingInverted<B>,
    encoder: StadEncoder<B>,
    encoder_proj: Linear<B>,
    projectors: Vec<Linear<B>>,
    final_proj: Linear<B>,
    segment_heads: Vec<Linear<B>>,
    h: usize,
    input_size: usize,
    n_series: usize,
    use_norm: bool,
    target_frequency: f64,
}

impl<B: Backend> HSOFTS<B> {
    fn new(config: &HSOFTSConfig, device: &B::Device) -> Self {
        let hidden = config.hidden_size;
        let h = config.h;

        let encoder = EncoderConfig::new(hidden, config.e_layers)
            .with_d_ff(config.d_ff)
            .with_dropout(config.dropout)
            .with_final_norm(false)
            .init_stad(config.d_core, device);
        let projectors = (0..config.projectors)
            .map(|_| LinearConfig::new(hidden, h).init(device))
            .collect();
        let segment_heads = segment_lengths(h, config.projectors)
            .into_iter()
            .map(|len| LinearConfig::new(h, len).init(device))
            .collect();

        debug!(
            projectors = config.projectors,
            layers = config.e_layers,
            "built HSOFTS"
        );

        Self {
            embedding: DataEmbeddingInverted::new(config.input_size, hidden, config.dropout, device),
            encoder,
            encoder_proj: LinearConfig::new(hidden, hidden).init(device),
            projectors,
            final_proj: LinearConfig::new(config.projectors * h, h).init(device),
            segment_heads,
            h,
            input_size: config.input_size,
            n_series: config.n_series,
            use_norm: config.use_norm,
            target_frequency: config.target_frequency,
        }
    }
}

impl<B: Backend> TSForecastingModel<B> for HSOFTS<B> {
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let (x, stats) = if self.use_norm {
            let (z, stats) = instance_normalize(x);
            (normalize_frequencies(z, self.target_frequency), Some(stats))
        } else {
            (x, None)
        };

        let tokens = self.embedding.forward(x, None);
        let encoded = self.encoder_proj.forward(self.encoder.forward(tokens));

        let stacked = self
            .projectors
            .iter()
            .map(|p| p.forward(encoded.clone()))
            .collect();
        let fused = self.final_proj.forward(Tensor::cat(stacked, 2));

        let segments = self
            .segment_heads
            .iter()
            .map(|head| head.forward(fused.clone()))
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
        "HSOFTS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small(h: usize) -> HSOFTSConfig {
        HSOFTSConfig::new(h, 16, 4)
            .with_hidden_size(16)
            .with_d_core(8)
            .with_d_ff(32)
    }

    #[test]
    fn test_forecast_shape_with_uneven_segments() {
        let device = Default::default();
        for h in [4, 7, 10] {
            let model = small(h).init::<TestBackend>(&device).unwrap();
            let x = Tensor::<TestBackend, 3>::random([3, 4, 16], Distribution::Default, &device);
            assert_eq!(model.forecast(x).dims(), [3, 4, h]);
        }
    }

    #[test]
    fn test_without_norm() {
        let device = Default::default();
        let model = small(6).with_use_norm(false).init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 3>::random([2, 4, 16], Distribution::Default, &device);
        assert_eq!(model.forecast(x).dims(), [2, 4, 6]);
    }

    #[test]
    fn test_constant_input_forecasts_its_level() {
        let device = Default::default();
        let model = small(8).init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 3>::ones([1, 4, 16], &device).mul_scalar(-3.0);
        let y: Vec<f32> = model.forecast(x).into_data().iter::<f32>().collect();
        assert!(y.iter().all(|v| (v + 3.0).abs() < 0.1), "{y:?}");
    }

    #[test]
    fn test_stad_stack_has_no_final_norm() {
        // embedding 72, STAD layer 596, encoder_proj 72, projectors 2 * 36,
        // final_proj 36, segment heads 2 * 10
        let model = HSOFTSConfig::new(4, 8, 3)
            .with_hidden_size(8)
            .with_d_core(4)
            .with_d_ff(16)
            .with_e_layers(1)
            .with_projectors(2)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        assert_eq!(model.num_params(), 868);
    }

    #[test]
    fn test_validation() {
        assert!(small(3).validate().is_err(), "more projectors than steps");
        assert!(small(8).with_projectors(0).validate().is_err());
        assert!(small(8).with_target_frequency(0.0).validate().is_err());
        assert!(small(8).with_d_core(0).validate().is_err());
        assert!(small(8).validate().is_ok());
    }
}
