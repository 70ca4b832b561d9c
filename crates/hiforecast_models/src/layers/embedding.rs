//! Token embeddings.
//!
//! The "inverted" family treats every series as one token and embeds its
//! whole look-back window: `(B, V, L) -> (B, V, d_model)`. [`DataEmbedding`]
//! is the classic time-major variant, one token per time step.

use burn::nn::attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;

use super::smoothing::{bidirectional_ewma, first_difference};

/// Default EWMA smoothing factor.
pub const DEFAULT_EWMA_ALPHA: f64 = 0.1;

/// Append covariate marks `(B, M, L)` to the series axis of `x` `(B, V, L)`.
fn with_marks<B: Backend>(x: Tensor<B, 3>, x_mark: Option<Tensor<B, 3>>) -> Tensor<B, 3> {
    match x_mark {
        Some(marks) => Tensor::cat(vec![x, marks], 1),
        None => x,
    }
}

/// Linear projection of each series' look-back window.
#[derive(Module, Debug)]
pub struct DataEmbeddingInverted<B: Backend> {
    value_embedding: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DataEmbeddingInverted<B> {
    /// Embed windows of length `c_in` into `d_model`.
    pub fn new(c_in: usize, d_model: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            value_embedding: LinearConfig::new(c_in, d_model).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// `(B, V, L)` plus optional `(B, M, L)` marks to `(B, V + M, d_model)`.
    pub fn forward(&self, x: Tensor<B, 3>, x_mark: Option<Tensor<B, 3>>) -> Tensor<B, 3> {
        let tokens = self.value_embedding.forward(with_marks(x, x_mark));
        self.dropout.forward(tokens)
    }
}

/// First-difference embedding with batch-normalized single-head
/// self-attention across series and a residual to the value embedding.
#[derive(Module, Debug)]
pub struct DiffEmbedding<B: Backend> {
    value_embedding: Linear<B>,
    linear_layer: Linear<B>,
    batch_norm: BatchNorm<B, 1>,
    attention: MultiHeadAttention<B>,
}

impl<B: Backend> DiffEmbedding<B> {
    /// Embed windows of length `c_in` into `d_model`.
    pub fn new(c_in: usize, d_model: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            value_embedding: LinearConfig::new(c_in, d_model).init(device),
            linear_layer: LinearConfig::new(d_model, d_model).init(device),
            batch_norm: BatchNormConfig::new(d_model).init(device),
            attention: MultiHeadAttentionConfig::new(d_model, 1)
                .with_dropout(dropout)
                .init(device),
        }
    }

    /// `(B, V, L)` plus optional `(B, M, L)` marks to `(B, V + M, d_model)`.
    pub fn forward(&self, x: Tensor<B, 3>, x_mark: Option<Tensor<B, 3>>) -> Tensor<B, 3> {
        let diffs = with_marks(first_difference(x), x_mark);
        let x_emb = self.value_embedding.forward(diffs);

        let x = self.linear_layer.forward(x_emb.clone());
        // BatchNorm normalizes channels on axis 1.
        let x = self.batch_norm.forward(x.swap_dims(1, 2)).swap_dims(1, 2);
        let x = self.attention.forward(MhaInput::self_attn(x)).context;

        x + x_emb
    }
}

/// Bidirectional-EWMA smoothed window, projected and dropped out.
#[derive(Module, Debug)]
pub struct EwmaEmbedding<B: Backend> {
    value_embedding: Linear<B>,
    dropout: Dropout,
    alpha: f64,
}

impl<B: Backend> EwmaEmbedding<B> {
    /// Embed windows of length `c_in` into `d_model`, smoothing with `alpha`.
    pub fn new(c_in: usize, d_model: usize, alpha: f64, dropout: f64, device: &B::Device) -> Self {
        Self {
            value_embedding: LinearConfig::new(c_in, d_model).init(device),
            dropout: DropoutConfig::new(dropout).init(),
            alpha,
        }
    }

    /// `(B, V, L)` plus optional `(B, M, L)` marks to `(B, V + M, d_model)`.
    pub fn forward(&self, x: Tensor<B, 3>, x_mark: Option<Tensor<B, 3>>) -> Tensor<B, 3> {
        let smoothed = with_marks(bidirectional_ewma(x, self.alpha), x_mark);
        self.dropout.forward(self.value_embedding.forward(smoothed))
    }
}

/// Fixed sinusoidal position table `(len, d_model)`.
///
/// Even channels use `sin`, odd channels `cos`, with angle
/// `pos / 10000^(2i / d_model)`.
pub fn positional_encoding<B: Backend>(len: usize, d_model: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut pe = vec![0.0f32; len * d_model];
    for pos in 0..len {
        for i in 0..d_model {
            let angle = pos as f32 / 10000.0f32.powf((2 * (i / 2)) as f32 / d_model as f32);
            pe[pos * d_model + i] = if i % 2 == 0 { angle.sin() } else { angle.cos() };
        }
    }
    Tensor::<B, 1>::from_floats(pe.as_slice(), device).reshape([len, d_model])
}

/// Linear projection of calendar features.
#[derive(Module, Debug)]
pub struct TimeFeatureEmbedding<B: Backend> {
    embed: Linear<B>,
}

impl<B: Backend> TimeFeatureEmbedding<B> {
    /// Project `n_marks` features into `d_model`, without bias.
    pub fn new(n_marks: usize, d_model: usize, device: &B::Device) -> Self {
        Self {
            embed: LinearConfig::new(n_marks, d_model)
                .with_bias(false)
                .init(device),
        }
    }

    /// `(B, L, M)` to `(B, L, d_model)`.
    pub fn forward(&self, x_mark: Tensor<B, 3>) -> Tensor<B, 3> {
        self.embed.forward(x_mark)
    }
}

/// Time-major embedding: one token per step, with positional and optional
/// calendar terms.
#[derive(Module, Debug)]
pub struct DataEmbedding<B: Backend> {
    value_embedding: Linear<B>,
    temporal_embedding: Option<TimeFeatureEmbedding<B>>,
    dropout: Dropout,
    d_model: usize,
}

impl<B: Backend> DataEmbedding<B> {
    /// `c_in` series per step; `n_marks = 0` disables the calendar term.
    pub fn new(c_in: usize, d_model: usize, n_marks: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            value_embedding: LinearConfig::new(c_in, d_model).init(device),
            temporal_embedding: (n_marks > 0).then(|| TimeFeatureEmbedding::new(n_marks, d_model, device)),
            dropout: DropoutConfig::new(dropout).init(),
            d_model,
        }
    }

    /// `(B, V, L)` plus optional `(B, M, L)` marks to `(B, L, d_model)`.
    pub fn forward(&self, x: Tensor<B, 3>, x_mark: Option<Tensor<B, 3>>) -> Tensor<B, 3> {
        let len = x.dims()[2];
        let device = x.device();

        let mut tokens = self.value_embedding.forward(x.swap_dims(1, 2));
        tokens = tokens + positional_encoding::<B>(len, self.d_model, &device).unsqueeze::<3>();
        if let (Some(temporal), Some(marks)) = (&self.temporal_embedding, x_mark) {
            tokens = tokens + temporal.forward(marks.swap_dims(1, 2));
        }
        self.dropout.forward(tokens)
    }
}
