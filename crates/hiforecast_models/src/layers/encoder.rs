//! Post-norm encoder stacks over series tokens.

use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::gelu;
use serde::{Deserialize, Serialize};

use super::attention::{AttentionLayer, AttentionLayerConfig, FullAttentionConfig};
use super::stad::Stad;

/// Residual add, norm, position-wise feed-forward, residual add, norm.
///
/// Shared by every encoder layer; only the token mixer differs.
#[derive(Module, Debug)]
pub struct FeedForwardBlock<B: Backend> {
    ff1: Linear<B>,
    ff2: Linear<B>,
    norm1: LayerNorm<B>,
    norm2: LayerNorm<B>,
    dropout: Dropout,
}

impl<B: Backend> FeedForwardBlock<B> {
    fn new(d_model: usize, d_ff: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            ff1: LinearConfig::new(d_model, d_ff).init(device),
            ff2: LinearConfig::new(d_ff, d_model).init(device),
            norm1: LayerNormConfig::new(d_model).init(device),
            norm2: LayerNormConfig::new(d_model).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// Combine the layer input `x` with the mixer output `mixed`.
    fn forward(&self, x: Tensor<B, 3>, mixed: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.norm1.forward(x + self.dropout.forward(mixed));

        let y = gelu(self.ff1.forward(x.clone()));
        let y = self.dropout.forward(y);
        let y = self.dropout.forward(self.ff2.forward(y));

        self.norm2.forward(x + y)
    }
}

/// Hyper-parameters shared by both encoder flavours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Token width.
    pub d_model: usize,
    /// Feed-forward width; `4 * d_model` when unset.
    pub d_ff: Option<usize>,
    /// Number of layers.
    pub n_layers: usize,
    /// Dropout inside the layers.
    pub dropout: f64,
    /// Apply a final LayerNorm after the last layer.
    pub final_norm: bool,
}

impl EncoderConfig {
    /// Create a config with a final norm.
    pub fn new(d_model: usize, n_layers: usize) -> Self {
        Self {
            d_model,
            d_ff: None,
            n_layers,
            dropout: 0.1,
            final_norm: true,
        }
    }

    /// Set the feed-forward width.
    #[must_use]
    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = Some(d_ff);
        self
    }

    /// Set the dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Enable or disable the final LayerNorm.
    #[must_use]
    pub fn with_final_norm(mut self, final_norm: bool) -> Self {
        self.final_norm = final_norm;
        self
    }

    fn block<B: Backend>(&self, device: &B::Device) -> FeedForwardBlock<B> {
        FeedForwardBlock::new(
            self.d_model,
            self.d_ff.unwrap_or(4 * self.d_model),
            self.dropout,
            device,
        )
    }

    fn norm<B: Backend>(&self, device: &B::Device) -> Option<LayerNorm<B>> {
        self.final_norm
            .then(|| LayerNormConfig::new(self.d_model).init(device))
    }

    /// Build an attention encoder with `n_heads` heads.
    pub fn init_attention<B: Backend>(
        &self,
        n_heads: usize,
        attention: FullAttentionConfig,
        device: &B::Device,
    ) -> AttentionEncoder<B> {
        let layers = (0..self.n_layers)
            .map(|_| AttentionEncoderLayer {
                attention: AttentionLayerConfig::new(self.d_model, n_heads, attention.clone())
                    .init(device),
                block: self.block(device),
            })
            .collect();
        AttentionEncoder {
            layers,
            norm: self.norm(device),
        }
    }

    /// Build a STAD encoder with a core of width `d_core`.
    pub fn init_stad<B: Backend>(&self, d_core: usize, device: &B::Device) -> StadEncoder<B> {
        let layers = (0..self.n_layers)
            .map(|_| StadEncoderLayer {
                stad: Stad::new(self.d_model, d_core, device),
                block: self.block(device),
            })
            .collect();
        StadEncoder {
            layers,
            norm: self.norm(device),
        }
    }
}

/// Encoder layer mixing tokens with self-attention.
#[derive(Module, Debug)]
pub struct AttentionEncoderLayer<B: Backend> {
    attention: AttentionLayer<B>,
    block: FeedForwardBlock<B>,
}

impl<B: Backend> AttentionEncoderLayer<B> {
    /// `(B, N, D)` to `(B, N, D)` plus the optional attention map.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        attn_mask: Option<Tensor<B, 4, Bool>>,
    ) -> (Tensor<B, 3>, Option<Tensor<B, 4>>) {
        let (mixed, attn) = self
            .attention
            .forward(x.clone(), x.clone(), x.clone(), attn_mask);
        (self.block.forward(x, mixed), attn)
    }
}

/// Encoder layer mixing tokens with [`Stad`].
#[derive(Module, Debug)]
pub struct StadEncoderLayer<B: Backend> {
    stad: Stad<B>,
    block: FeedForwardBlock<B>,
}

impl<B: Backend> StadEncoderLayer<B> {
    /// `(B, N, D)` to `(B, N, D)`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mixed = self.stad.forward(x.clone());
        self.block.forward(x, mixed)
    }
}

/// Stack of [`AttentionEncoderLayer`]s with an optional final norm.
#[derive(Module, Debug)]
pub struct AttentionEncoder<B: Backend> {
    layers: Vec<AttentionEncoderLayer<B>>,
    norm: Option<LayerNorm<B>>,
}

impl<B: Backend> AttentionEncoder<B> {
    /// Encode tokens, collecting one attention map per layer when the
    /// attention kernel returns them.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        attn_mask: Option<Tensor<B, 4, Bool>>,
    ) -> (Tensor<B, 3>, Vec<Tensor<B, 4>>) {
        let mut x = x;
        let mut attns = Vec::new();
        for layer in &self.layers {
            let (out, attn) = layer.forward(x, attn_mask.clone());
            x = out;
            attns.extend(attn);
        }
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        (x, attns)
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// Stack of [`StadEncoderLayer`]s with an optional final norm.
#[derive(Module, Debug)]
pub struct StadEncoder<B: Backend> {
    layers: Vec<StadEncoderLayer<B>>,
    norm: Option<LayerNorm<B>>,
}

impl<B: Backend> StadEncoder<B> {
    /// Encode tokens. STAD produces no attention maps.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = x;
        for layer in &self.layers {
            x = layer.forward(x);
        }
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}
