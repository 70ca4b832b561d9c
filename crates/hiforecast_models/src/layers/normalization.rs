//! Per-window instance normalization (non-stationary normalization).

use burn::prelude::*;

/// Variance floor added before the square root.
pub const INSTANCE_NORM_EPS: f64 = 1e-5;

/// Statistics of one normalized batch, used to map forecasts back.
#[derive(Debug, Clone)]
pub struct InstanceNormStats<B: Backend> {
    /// `(B, V, 1)` means, detached from the graph.
    pub mean: Tensor<B, 3>,
    /// `(B, V, 1)` standard deviations.
    pub stdev: Tensor<B, 3>,
}

/// Standardize each series of each window over time.
///
/// `stdev = sqrt(var_biased + 1e-5)`; the mean is treated as a constant.
pub fn instance_normalize<B: Backend>(x: Tensor<B, 3>) -> (Tensor<B, 3>, InstanceNormStats<B>) {
    let mean = x.clone().mean_dim(2).detach();
    let centered = x - mean.clone();
    let var = centered.clone().powf_scalar(2.0).mean_dim(2);
    let stdev = var.add_scalar(INSTANCE_NORM_EPS).sqrt();
    let normalized = centered / stdev.clone();
    (normalized, InstanceNormStats { mean, stdev })
}

impl<B: Backend> InstanceNormStats<B> {
    /// Map a `(B, V, H)` forecast back to the original scale.
    pub fn denormalize(&self, y: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, n_series, horizon] = y.dims();
        let shape = [batch, n_series, horizon];
        y * self.stdev.clone().expand(shape) + self.mean.clone().expand(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_normalized_moments() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([3, 4, 50], Distribution::Normal(5.0, 2.0), &device);
        let (z, stats) = instance_normalize(x);
        assert_eq!(stats.mean.dims(), [3, 4, 1]);

        let means: Vec<f32> = z.clone().mean_dim(2).into_data().iter::<f32>().collect();
        let vars: Vec<f32> = z.powf_scalar(2.0).mean_dim(2).into_data().iter::<f32>().collect();
        for (m, v) in means.iter().zip(&vars) {
            assert_abs_diff_eq!(*m, 0.0, epsilon = 1e-4);
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_constant_series_is_finite() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::ones([1, 2, 10], &device).mul_scalar(7.0);
        let (z, stats) = instance_normalize(x);
        let zs: Vec<f32> = z.into_data().iter::<f32>().collect();
        assert!(zs.iter().all(|v| *v == 0.0));

        let y = stats.denormalize(Tensor::zeros([1, 2, 3], &device));
        let ys: Vec<f32> = y.into_data().iter::<f32>().collect();
        assert!(ys.iter().all(|v| (*v - 7.0).abs() < 1e-5));
    }

    #[test]
    fn test_denormalize_inverts_normalize() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([2, 3, 12], Distribution::Normal(-3.0, 4.0), &device);
        let (z, stats) = instance_normalize(x.clone());
        let back = stats.denormalize(z);
        let err: f32 = (back - x).abs().max().into_scalar();
        assert!(err < 1e-4);
    }
}
