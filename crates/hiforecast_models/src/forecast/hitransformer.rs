//! HiTransformer: an inverted-token Transformer with pluggable embeddings.
//!
//! Every series is one token. The look-back window is embedded with one of
//! the [`EmbeddingType`]s, mixed across series by a non-causal attention
//! encoder, and projected to the horizon.

use std::fmt;
use std::str::FromStr;

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use hiforecast_core::TSForecastingModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CommonParams;
use crate::error::{ModelError, Result};
use crate::layers::embedding::DEFAULT_EWMA_ALPHA;
use crate::layers::{
    instance_normalize, AttentionEncoder, DataEmbeddingInverted, DiffEmbedding, EncoderConfig,
    EwmaEmbedding, FullAttentionConfig,
};

/// Which token embedding(s) feed the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    /// Linear projection of the raw window.
    #[default]
    Inverted,
    /// First differences with a batch-normalized attention refinement.
    Diff,
    /// Bidirectional EWMA smoothing before the projection.
    Ewma,
    /// Inverted and diff embeddings concatenated to `2 * hidden_size`.
    InvertedDiff,
}

impl EmbeddingType {
    /// Every embedding type.
    pub const ALL: [EmbeddingType; 4] = [
        EmbeddingType::Inverted,
        EmbeddingType::Diff,
        EmbeddingType::Ewma,
        EmbeddingType::InvertedDiff,
    ];

    /// Configuration name.
    pub const fn name(&self) -> &'static str {
        match self {
            EmbeddingType::Inverted => "inverted",
            EmbeddingType::Diff => "diff",
            EmbeddingType::Ewma => "ewma",
            EmbeddingType::InvertedDiff => "inverted_diff",
        }
    }

    /// Width of the embedded tokens for a given `hidden_size`.
    pub const fn token_width(&self, hidden_size: usize) -> usize {
        match self {
            EmbeddingType::InvertedDiff => 2 * hidden_size,
            _ => hidden_size,
        }
    }
}

impl fmt::Display for EmbeddingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmbeddingType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.to_lowercase().replace(['+', '-'], "_");
        EmbeddingType::ALL
            .into_iter()
            .find(|e| e.name() == key)
            .ok_or_else(|| ModelError::Unknown {
                kind: "embedding",
                name: s.to_string(),
            })
    }
}

fn default_hidden_size() -> usize {
    512
}
fn default_n_heads() -> usize {
    8
}
fn default_e_layers() -> usize {
    2
}
fn default_d_layers() -> usize {
    1
}
fn default_d_ff() -> usize {
    2048
}
fn default_factor() -> usize {
    1
}
fn default_dropout() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}
fn default_ewma_alpha() -> f64 {
    DEFAULT_EWMA_ALPHA
}

/// Configuration for [`HiTransformer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiTransformerConfig {
    /// Forecast horizon.
    pub h: usize,
    /// Look-back window length.
    pub input_size: usize,
    /// Number of series.
    pub n_series: usize,
    /// Token width of a single embedding.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Attention heads.
    #[serde(default = "default_n_heads")]
    pub n_heads: usize,
    /// Encoder layers.
    #[serde(default = "default_e_layers")]
    pub e_layers: usize,
    /// Decoder layers. Accepted for config compatibility; the model has no
    /// decoder.
    #[serde(default = "default_d_layers")]
    pub d_layers: usize,
    /// Feed-forward width.
    #[serde(default = "default_d_ff")]
    pub d_ff: usize,
    /// Attention factor. Full attention ignores it.
    #[serde(default = "default_factor")]
    pub factor: usize,
    /// Dropout, also used inside attention.
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Instance-normalize inputs and denormalize forecasts.
    #[serde(default = "default_true")]
    pub use_norm: bool,
    /// Token embedding.
    #[serde(default)]
    pub embedding: EmbeddingType,
    /// Smoothing factor of the EWMA embedding.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
    /// Keep per-layer attention maps.
    #[serde(default)]
    pub output_attention: bool,
}

impl Default for HiTransformerConfig {
    fn default() -> Self {
        Self {
            h: 24,
            input_size: 96,
            n_series: 1,
            hidden_size: default_hidden_size(),
            n_heads: default_n_heads(),
            e_layers: default_e_layers(),
            d_layers: default_d_layers(),
            d_ff: default_d_ff(),
            factor: default_factor(),
            dropout: default_dropout(),
            use_norm: true,
            embedding: EmbeddingType::default(),
            ewma_alpha: DEFAULT_EWMA_ALPHA,
            output_attention: false,
        }
    }
}

impl HiTransformerConfig {
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

    /// Set number of attention heads.
    #[must_use]
    pub fn with_n_heads(mut self, n_heads: usize) -> Self {
        self.n_heads = n_heads;
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

    /// Set the token embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: EmbeddingType) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set the EWMA smoothing factor.
    #[must_use]
    pub fn with_ewma_alpha(mut self, ewma_alpha: f64) -> Self {
        self.ewma_alpha = ewma_alpha;
        self
    }

    /// Keep attention maps.
    #[must_use]
    pub fn with_output_attention(mut self, output_attention: bool) -> Self {
        self.output_attention = output_attention;
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
        if self.n_heads == 0 || self.hidden_size % self.n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hidden_size {} must be divisible by n_heads {}",
                self.hidden_size, self.n_heads
            )));
        }
        if self.embedding == EmbeddingType::Ewma && !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "ewma_alpha must be in (0, 1], got {}",
                self.ewma_alpha
            )));
        }
        Ok(())
    }

    /// Validate and build the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<HiTransformer<B>> {
        self.validate()?;
        Ok(HiTransformer::new(self, device))
    }
}

/// Inverted-token Transformer forecaster.
#[derive(Module, Debug)]
pub struct HiTransformer<B: Backend> {
    inverted: Option<DataEmbeddingInverted<B>>,
    diff: Option<DiffEmbedding<B>>,
    ewma: Option<EwmaEmbedding<B>>,
    encoder: AttentionEncoder<B>,
    projector: Linear<B>,
    h: usize,
    input_size: usize,
    n_series: usize,
    use_norm: bool,
}

impl<B: Backend> HiTransformer<B> {
    fn new(config: &HiTransformerConfig, device: &B::Device) -> Self {
        let HiTransformerConfig {
            input_size,
            hidden_size,
            dropout,
            embedding,
            ..
        } = *config;
        let width = embedding.token_width(hidden_size);

        let inverted = matches!(embedding, EmbeddingType::Inverted | EmbeddingType::InvertedDiff)
            .then(|| DataEmbeddingInverted::new(input_size, hidden_size, dropout, device));
        let diff = matches!(embedding, EmbeddingType::Diff | EmbeddingType::InvertedDiff)
            .then(|| DiffEmbedding::new(input_size, hidden_size, dropout, device));
        let ewma = (embedding == EmbeddingType::Ewma)
            .then(|| EwmaEmbedding::new(input_size, hidden_size, config.ewma_alpha, dropout, device));

        let attention = FullAttentionConfig::new()
            .with_mask_flag(false)
            .with_attention_dropout(dropout)
            .with_output_attention(config.output_attention);
        let encoder = EncoderConfig::new(width, config.e_layers)
            .with_d_ff(config.d_ff)
            .with_dropout(dropout)
            .init_attention(config.n_heads, attention, device);

        debug!(
            embedding = %embedding,
            width,
            layers = config.e_layers,
            "built HiTransformer"
        );

        Self {
            inverted,
            diff,
            ewma,
            encoder,
            projector: LinearConfig::new(width, config.h).init(device),
            h: config.h,
            input_size,
            n_series: config.n_series,
            use_norm: config.use_norm,
        }
    }

    fn embed(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut parts = Vec::with_capacity(2);
        if let Some(inverted) = &self.inverted {
            parts.push(inverted.forward(x.clone(), None));
        }
        if let Some(diff) = &self.diff {
            parts.push(diff.forward(x.clone(), None));
        }
        if let Some(ewma) = &self.ewma {
            parts.push(ewma.forward(x, None));
        }
        Tensor::cat(parts, 2)
    }

    /// Forecast `(B, V, L)` to `(B, V, H)` together with one `(B, heads, N, N)`
    /// attention map per layer when the model keeps them.
    pub fn forecast_with_attention(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, Vec<Tensor<B, 4>>) {
        let (x, stats) = if self.use_norm {
            let (z, stats) = instance_normalize(x);
            (z, Some(stats))
        } else {
            (x, None)
        };

        let tokens = self.embed(x);
        let (encoded, attns) = self.encoder.forward(tokens, None);
        let out = self.projector.forward(encoded);

        let [batch, _, _] = out.dims();
        let out = out.slice([0..batch, 0..self.n_series, 0..self.h]);

        let out = match stats {
            Some(stats) => stats.denormalize(out),
            None => out,
        };
        (out, attns)
    }
}

impl<B: Backend> TSForecastingModel<B> for HiTransformer<B> {
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.forecast_with_attention(x).0
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
        "HiTransformer"
    }
}
