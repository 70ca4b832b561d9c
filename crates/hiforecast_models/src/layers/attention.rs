//! Scaled dot-product attention over token sequences.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

/// Boolean `(B, 1, L, L)` mask, `true` strictly above the diagonal.
///
/// Masked positions are filled with `-inf` before the softmax, so token `i`
/// only attends to tokens `0..=i`.
#[derive(Debug, Clone)]
pub struct TriangularCausalMask<B: Backend> {
    mask: Tensor<B, 4, Bool>,
}

impl<B: Backend> TriangularCausalMask<B> {
    /// Build the mask for `batch` sequences of length `len`.
    pub fn new(batch: usize, len: usize, device: &B::Device) -> Self {
        let upper: Vec<bool> = (0..len)
            .flat_map(|i| (0..len).map(move |j| j > i))
            .collect();
        let mask = Tensor::<B, 2, Bool>::from_data(TensorData::new(upper, [len, len]), device)
            .reshape([1, 1, len, len])
            .expand([batch, 1, len, len]);
        Self { mask }
    }

    /// The `(B, 1, L, L)` mask.
    pub fn mask(&self) -> Tensor<B, 4, Bool> {
        self.mask.clone()
    }
}

/// Configuration for [`FullAttention`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullAttentionConfig {
    /// Apply a causal mask when none is given.
    pub mask_flag: bool,
    /// Score scale; `1/sqrt(E)` when unset.
    pub scale: Option<f64>,
    /// Dropout on the attention weights.
    pub attention_dropout: f64,
    /// Return the attention map with the output.
    pub output_attention: bool,
}

impl Default for FullAttentionConfig {
    fn default() -> Self {
        Self {
            mask_flag: true,
            scale: None,
            attention_dropout: 0.1,
            output_attention: false,
        }
    }
}

impl FullAttentionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable causal masking.
    #[must_use]
    pub fn with_mask_flag(mut self, mask_flag: bool) -> Self {
        self.mask_flag = mask_flag;
        self
    }

    /// Set an explicit score scale.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set the attention dropout.
    #[must_use]
    pub fn with_attention_dropout(mut self, attention_dropout: f64) -> Self {
        self.attention_dropout = attention_dropout;
        self
    }

    /// Return attention maps from `forward`.
    #[must_use]
    pub fn with_output_attention(mut self, output_attention: bool) -> Self {
        self.output_attention = output_attention;
        self
    }

    /// Initialize the attention kernel.
    pub fn init(&self) -> FullAttention {
        FullAttention {
            mask_flag: self.mask_flag,
            scale: self.scale.unwrap_or(0.0),
            output_attention: self.output_attention,
            dropout: DropoutConfig::new(self.attention_dropout).init(),
        }
    }
}

/// Multi-head scaled dot-product attention over `(B, L, H, E)` inputs.
#[derive(Module, Clone, Debug)]
pub struct FullAttention {
    mask_flag: bool,
    /// Zero means `1/sqrt(E)`.
    scale: f64,
    output_attention: bool,
    dropout: Dropout,
}

impl FullAttention {
    /// Attend `queries` `(B, L, H, E)` over `keys` `(B, S, H, E)` and
    /// `values` `(B, S, H, D)`.
    ///
    /// Returns `(B, L, H, D)` and, when configured, the `(B, H, L, S)`
    /// attention weights.
    pub fn forward<B: Backend>(
        &self,
        queries: Tensor<B, 4>,
        keys: Tensor<B, 4>,
        values: Tensor<B, 4>,
        attn_mask: Option<Tensor<B, 4, Bool>>,
    ) -> (Tensor<B, 4>, Option<Tensor<B, 4>>) {
        let [batch, len, n_heads, e] = queries.dims();
        let s = keys.dims()[1];
        let scale = if self.scale > 0.0 {
            self.scale
        } else {
            1.0 / (e as f64).sqrt()
        };

        let q = queries.swap_dims(1, 2);
        let k = keys.swap_dims(1, 2).swap_dims(2, 3);
        let mut scores = q.matmul(k);

        if self.mask_flag {
            let mask = attn_mask.unwrap_or_else(|| {
                TriangularCausalMask::new(batch, len, &scores.device()).mask()
            });
            scores = scores.mask_fill(mask.expand([batch, n_heads, len, s]), f32::NEG_INFINITY);
        }

        let attn = self.dropout.forward(softmax(scores.mul_scalar(scale), 3));
        let out = attn.clone().matmul(values.swap_dims(1, 2)).swap_dims(1, 2);

        if self.output_attention {
            (out, Some(attn))
        } else {
            (out, None)
        }
    }
}

/// Configuration for [`AttentionLayer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionLayerConfig {
    /// Token width.
    pub d_model: usize,
    /// Number of heads.
    pub n_heads: usize,
    /// Inner attention kernel.
    pub attention: FullAttentionConfig,
}

impl AttentionLayerConfig {
    /// Create a new config.
    pub fn new(d_model: usize, n_heads: usize, attention: FullAttentionConfig) -> Self {
        Self {
            d_model,
            n_heads,
            attention,
        }
    }

    /// Initialize the layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionLayer<B> {
        let d_keys = self.d_model / self.n_heads;
        let inner = self.n_heads * d_keys;
        AttentionLayer {
            inner_attention: self.attention.init(),
            query_projection: LinearConfig::new(self.d_model, inner).init(device),
            key_projection: LinearConfig::new(self.d_model, inner).init(device),
            value_projection: LinearConfig::new(self.d_model, inner).init(device),
            out_projection: LinearConfig::new(inner, self.d_model).init(device),
            n_heads: self.n_heads,
        }
    }
}

/// Projects tokens into heads, runs [`FullAttention`] and projects back.
#[derive(Module, Debug)]
pub struct AttentionLayer<B: Backend> {
    inner_attention: FullAttention,
    query_projection: Linear<B>,
    key_projection: Linear<B>,
    value_projection: Linear<B>,
    out_projection: Linear<B>,
    n_heads: usize,
}

impl<B: Backend> AttentionLayer<B> {
    /// `queries` `(B, L, D)`, `keys`/`values` `(B, S, D)` to `(B, L, D)`.
    pub fn forward(
        &self,
        queries: Tensor<B, 3>,
        keys: Tensor<B, 3>,
        values: Tensor<B, 3>,
        attn_mask: Option<Tensor<B, 4, Bool>>,
    ) -> (Tensor<B, 3>, Option<Tensor<B, 4>>) {
        let [batch, len, _] = queries.dims();
        let s = keys.dims()[1];
        let h = self.n_heads;

        let q = self.query_projection.forward(queries);
        let inner = q.dims()[2];
        let d_keys = inner / h;
        let q = q.reshape([batch, len, h, d_keys]);
        let k = self.key_projection.forward(keys).reshape([batch, s, h, d_keys]);
        let v = self.value_projection.forward(values).reshape([batch, s, h, d_keys]);

        let (out, attn) = self.inner_attention.forward(q, k, v, attn_mask);
        let out = out.reshape([batch, len, inner]);
        (self.out_projection.forward(out), attn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_causal_mask() {
        let device = Default::default();
        let mask = TriangularCausalMask::<TestBackend>::new(2, 3, &device).mask();
        assert_eq!(mask.dims(), [2, 1, 3, 3]);
        let values: Vec<bool> = mask.into_data().iter::<bool>().collect();
        assert_eq!(
            &values[..9],
            &[false, true, true, false, false, true, false, false, false]
        );
    }

    #[test]
    fn test_full_attention_causal_weights() {
        let device = Default::default();
        let attention = FullAttentionConfig::new()
            .with_attention_dropout(0.0)
            .with_output_attention(true)
            .init();
        let q = Tensor::<TestBackend, 4>::random([2, 4, 2, 8], Distribution::Default, &device);
        let v = Tensor::<TestBackend, 4>::random([2, 4, 2, 6], Distribution::Default, &device);

        let (out, attn) = attention.forward(q.clone(), q, v, None);
        assert_eq!(out.dims(), [2, 4, 2, 6]);

        let attn = attn.unwrap();
        assert_eq!(attn.dims(), [2, 2, 4, 4]);
        let row_sums: Vec<f32> = attn.clone().sum_dim(3).into_data().iter::<f32>().collect();
        assert!(row_sums.iter().all(|s| (s - 1.0).abs() < 1e-5));

        let above: f32 = attn.slice([0..2, 0..2, 0..1, 1..4]).sum().into_scalar();
        assert_eq!(above, 0.0);
    }

    #[test]
    fn test_attention_layer_shapes() {
        let device = Default::default();
        let layer = AttentionLayerConfig::new(
            16,
            4,
            FullAttentionConfig::new().with_mask_flag(false),
        )
        .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([3, 5, 16], Distribution::Default, &device);
        let (out, attn) = layer.forward(x.clone(), x.clone(), x, None);
        assert_eq!(out.dims(), [3, 5, 16]);
        assert!(attn.is_none());
    }
}
