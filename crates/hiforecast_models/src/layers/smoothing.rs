//! Signal smoothing used by the embeddings and by frequency normalization.
//!
//! Tensor functions operate on `(B, V, L)` along the time axis. The
//! frequency heuristics run on the host: they are applied to the
//! normalized input, upstream of every learnable parameter.

use burn::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Default Gaussian kernel width.
pub const DEFAULT_KERNEL_SIZE: usize = 5;

/// Forward exponentially weighted moving average along time.
///
/// `s_0 = x_0`, `s_t = alpha * x_t + (1 - alpha) * s_{t-1}`.
pub fn ewma<B: Backend>(x: Tensor<B, 3>, alpha: f64) -> Tensor<B, 3> {
    let [batch, n_series, len] = x.dims();
    let mut steps = Vec::with_capacity(len);
    let mut state = x.clone().slice([0..batch, 0..n_series, 0..1]);
    steps.push(state.clone());
    for t in 1..len {
        let xt = x.clone().slice([0..batch, 0..n_series, t..t + 1]);
        state = xt.mul_scalar(alpha) + state.mul_scalar(1.0 - alpha);
        steps.push(state.clone());
    }
    Tensor::cat(steps, 2)
}

/// EWMA run from the last step back to the first.
pub fn reverse_ewma<B: Backend>(x: Tensor<B, 3>, alpha: f64) -> Tensor<B, 3> {
    let [batch, n_series, len] = x.dims();
    let mut steps = Vec::with_capacity(len);
    let mut state = x.clone().slice([0..batch, 0..n_series, len - 1..len]);
    steps.push(state.clone());
    for t in (0..len - 1).rev() {
        let xt = x.clone().slice([0..batch, 0..n_series, t..t + 1]);
        state = xt.mul_scalar(alpha) + state.mul_scalar(1.0 - alpha);
        steps.push(state.clone());
    }
    steps.reverse();
    Tensor::cat(steps, 2)
}

/// Mean of the forward and backward EWMA.
pub fn bidirectional_ewma<B: Backend>(x: Tensor<B, 3>, alpha: f64) -> Tensor<B, 3> {
    (ewma(x.clone(), alpha) + reverse_ewma(x, alpha)).div_scalar(2.0)
}

/// First differences along time with a leading zero, so the length is kept.
pub fn first_difference<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, n_series, len] = x.dims();
    let zero = Tensor::zeros([batch, n_series, 1], &x.device());
    if len == 1 {
        return zero;
    }
    let next = x.clone().slice([0..batch, 0..n_series, 1..len]);
    let prev = x.slice([0..batch, 0..n_series, 0..len - 1]);
    Tensor::cat(vec![zero, next - prev], 2)
}

/// Normalized Gaussian weights over offsets `-(k-1)/2 ..= (k-1)/2`.
///
/// A non-finite or non-positive `sigma` gives a flat moving-average kernel.
#[must_use]
pub fn gaussian_kernel(kernel_size: usize, sigma: f32) -> Vec<f32> {
    if kernel_size == 0 {
        return Vec::new();
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return vec![1.0 / kernel_size as f32; kernel_size];
    }
    let center = (kernel_size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..kernel_size)
        .map(|i| {
            let z = (i as f32 - center) / sigma;
            (-0.5 * z * z).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        weights.into_iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / kernel_size as f32; kernel_size]
    }
}

/// Convolve one series with `kernel`, zero-padding `kernel.len() / 2` steps
/// on both sides. The output has the input's length.
#[must_use]
pub fn gaussian_filter(series: &[f32], kernel: &[f32]) -> Vec<f32> {
    let pad = kernel.len() / 2;
    (0..series.len())
        .map(|t| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, w)| {
                    (t + j)
                        .checked_sub(pad)
                        .and_then(|idx| series.get(idx))
                        .map(|x| x * w)
                })
                .sum()
        })
        .collect()
}

/// Mean magnitude of the real FFT of one series.
#[must_use]
pub fn spectral_magnitude(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(series.len());
    let mut buffer: Vec<Complex<f32>> = series.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft.process(&mut buffer);

    let n_bins = series.len() / 2 + 1;
    buffer[..n_bins].iter().map(|c| c.norm()).sum::<f32>() / n_bins as f32
}

/// Mean real-FFT magnitude per window and series: `(B, V, L) -> (B, V)`.
pub fn estimate_frequency<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, n_series, len] = x.dims();
    let device = x.device();
    let values: Vec<f32> = x.into_data().iter::<f32>().collect();
    let magnitudes: Vec<f32> = values.chunks(len.max(1)).map(spectral_magnitude).collect();
    Tensor::from_data(TensorData::new(magnitudes, [batch, n_series]), &device)
}

/// Smooth every window with a Gaussian of width `sigma = target / frequency`,
/// where `frequency` is the spectral magnitude of the window's first series.
///
/// All series of a window share that kernel. A zero-magnitude first series
/// gives the flat kernel.
pub fn normalize_frequencies<B: Backend>(x: Tensor<B, 3>, target_frequency: f64) -> Tensor<B, 3> {
    let [batch, n_series, len] = x.dims();
    let device = x.device();
    let values: Vec<f32> = x.into_data().iter::<f32>().collect();

    let mut smoothed = Vec::with_capacity(values.len());
    for window in values.chunks((n_series * len).max(1)) {
        let frequency = spectral_magnitude(&window[..len.min(window.len())]);
        let sigma = if frequency > f32::EPSILON {
            target_frequency as f32 / frequency
        } else {
            f32::INFINITY
        };
        let kernel = gaussian_kernel(DEFAULT_KERNEL_SIZE, sigma);
        for series in window.chunks(len.max(1)) {
            smoothed.extend(gaussian_filter(series, &kernel));
        }
    }

    Tensor::from_data(TensorData::new(smoothed, [batch, n_series, len]), &device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn series(values: &[f32]) -> Tensor<TestBackend, 3> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([1, 1, values.len()])
    }

    fn to_vec(x: Tensor<TestBackend, 3>) -> Vec<f32> {
        x.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_ewma_recursion() {
        let out = to_vec(ewma(series(&[1.0, 2.0, 3.0]), 0.5));
        assert_abs_diff_eq!(out[0], 1.0);
        assert_abs_diff_eq!(out[1], 1.5);
        assert_abs_diff_eq!(out[2], 2.25);
    }

    #[test]
    fn test_bidirectional_ewma() {
        let out = to_vec(bidirectional_ewma(series(&[1.0, 2.0, 3.0]), 0.5));
        // backward: [1.75, 2.5, 3.0]
        assert_abs_diff_eq!(out[0], (1.0 + 1.75) / 2.0);
        assert_abs_diff_eq!(out[1], (1.5 + 2.5) / 2.0);
        assert_abs_diff_eq!(out[2], (2.25 + 3.0) / 2.0);
    }

    #[test]
    fn test_first_difference() {
        let out = to_vec(first_difference(series(&[3.0, 5.0, 4.0, 4.0])));
        assert_eq!(out, vec![0.0, 2.0, -1.0, 0.0]);

        let single = to_vec(first_difference(series(&[7.0])));
        assert_eq!(single, vec![0.0]);
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(5, 1.0);
        assert_eq!(kernel.len(), 5);
        assert_abs_diff_eq!(kernel.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(kernel[0], kernel[4]);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);

        let flat = gaussian_kernel(5, f32::INFINITY);
        assert!(flat.iter().all(|w| (w - 0.2).abs() < 1e-6));
        assert_eq!(gaussian_kernel(4, 0.0), vec![0.25; 4]);
    }

    #[test]
    fn test_gaussian_filter_keeps_length_and_pads_with_zeros() {
        let out = gaussian_filter(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], &[0.2; 5]);
        assert_eq!(out.len(), 6);
        assert_abs_diff_eq!(out[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[5], 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_spectral_magnitude_of_constant() {
        // rfft of [2, 2, 2, 2] is [8, 0, 0]
        assert_abs_diff_eq!(spectral_magnitude(&[2.0; 4]), 8.0 / 3.0, epsilon = 1e-5);
        assert_eq!(spectral_magnitude(&[]), 0.0);
    }

    #[test]
    fn test_estimate_frequency_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::ones([2, 3, 8], &device);
        let freq = estimate_frequency(x);
        assert_eq!(freq.dims(), [2, 3]);
        let values: Vec<f32> = freq.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| (v - 8.0 / 5.0).abs() < 1e-5));
    }

    #[test]
    fn test_normalize_frequencies_preserves_shape_and_zero_series() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::zeros([2, 2, 10], &device);
        let out = normalize_frequencies(x, 0.75);
        assert_eq!(out.dims(), [2, 2, 10]);
        assert!(to_vec(out).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalize_frequencies_uses_first_series_width() {
        let alternating: Vec<f32> = (0..8).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let ramp: Vec<f32> = (0..8).map(|t| t as f32 * 0.1).collect();
        let values: Vec<f32> = alternating.iter().chain(ramp.iter()).copied().collect();

        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([1, 2, 8]);
        let out = to_vec(normalize_frequencies(x, 0.75));

        let frequency = spectral_magnitude(&alternating);
        assert!(frequency > 0.0);
        assert!((spectral_magnitude(&ramp) - frequency).abs() > 0.1);
        let kernel = gaussian_kernel(DEFAULT_KERNEL_SIZE, 0.75 / frequency);
        let expected: Vec<f32> = [&alternating, &ramp]
            .into_iter()
            .flat_map(|series| gaussian_filter(series, &kernel))
            .collect();

        assert_eq!(out.len(), expected.len());
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_normalize_frequencies_sigma_is_per_window() {
        let alternating: Vec<f32> = (0..8).map(|t| if t % 2 == 0 { 2.0 } else { -2.0 }).collect();
        let ramp: Vec<f32> = (0..8).map(|t| t as f32 * 0.1).collect();
        let values: Vec<f32> = alternating.iter().chain(ramp.iter()).copied().collect();

        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([2, 1, 8]);
        let out = to_vec(normalize_frequencies(x, 0.75));

        let expected: Vec<f32> = [&alternating, &ramp]
            .into_iter()
            .flat_map(|series| {
                let kernel = gaussian_kernel(DEFAULT_KERNEL_SIZE, 0.75 / spectral_magnitude(series));
                gaussian_filter(series, &kernel)
            })
            .collect();
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}
