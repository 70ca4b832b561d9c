//! STar Aggregate Dispatch (STAD) series mixing.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{gelu, softmax};
use burn::tensor::Distribution;

/// Mixes information across series through a shared "core" representation.
///
/// The core is computed per series, pooled over series (stochastically
/// while training, softmax-weighted at inference), dispatched back to every
/// series and fused with the input.
#[derive(Module, Debug)]
pub struct Stad<B: Backend> {
    gen1: Linear<B>,
    gen2: Linear<B>,
    gen3: Linear<B>,
    gen4: Linear<B>,
}

impl<B: Backend> Stad<B> {
    /// Build a STAD block for tokens of width `d_series` and a core of
    /// width `d_core`.
    pub fn new(d_series: usize, d_core: usize, device: &B::Device) -> Self {
        Self {
            gen1: LinearConfig::new(d_series, d_series).init(device),
            gen2: LinearConfig::new(d_series, d_core).init(device),
            gen3: LinearConfig::new(d_series + d_core, d_series).init(device),
            gen4: LinearConfig::new(d_series, d_series).init(device),
        }
    }

    /// `(B, C, d_series)` tokens to `(B, C, d_series)` mixed tokens.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, _] = input.dims();

        let core = self.gen2.forward(gelu(self.gen1.forward(input.clone())));
        let d_core = core.dims()[2];

        let pooled = if B::ad_enabled() {
            Self::sample_pool(core)
        } else {
            let weight = softmax(core.clone(), 1);
            (core * weight).sum_dim(1)
        };
        let dispatched = pooled.expand([batch, channels, d_core]);

        let fused = Tensor::cat(vec![input, dispatched], 2);
        self.gen4.forward(gelu(self.gen3.forward(fused)))
    }

    /// Draw one series per batch element and core channel with probability
    /// `softmax(core)` over series, via the Gumbel-max trick, and gather its
    /// value. Returns `(B, 1, d_core)`.
    fn sample_pool(core: Tensor<B, 3>) -> Tensor<B, 3> {
        let uniform = Tensor::<B, 3>::random(
            core.dims(),
            Distribution::Uniform(1e-10, 1.0),
            &core.device(),
        );
        let gumbel = uniform.log().neg().log().neg();
        let indices = (core.clone().detach() + gumbel).argmax(1);
        core.gather(1, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_stad_inference_shape_and_determinism() {
        let device = Default::default();
        let stad = Stad::<TestBackend>::new(16, 8, &device);
        let x = Tensor::<TestBackend, 3>::random([2, 5, 16], Distribution::Default, &device);

        let a = stad.forward(x.clone());
        let b = stad.forward(x);
        assert_eq!(a.dims(), [2, 5, 16]);
        let diff: f32 = (a - b).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_stochastic_pool_picks_existing_series() {
        let device = Default::default();
        let core = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]],
            &device,
        );
        let pooled = Stad::<TestBackend>::sample_pool(core);
        assert_eq!(pooled.dims(), [1, 1, 2]);
        let values: Vec<f32> = pooled.into_data().iter::<f32>().collect();
        assert!([1.0, 2.0, 3.0].contains(&values[0]));
        assert!([10.0, 20.0, 30.0].contains(&values[1]));
    }

    #[test]
    fn test_stad_training_path_backpropagates() {
        let device = Default::default();
        let stad = Stad::<TestAutodiffBackend>::new(8, 4, &device);
        let x = Tensor::<TestAutodiffBackend, 3>::random([2, 3, 8], Distribution::Default, &device);

        let out = stad.forward(x);
        assert_eq!(out.dims(), [2, 3, 8]);
        let grads = out.sum().backward();
        assert!(stad.gen2.weight.grad(&grads).is_some());
    }
}
