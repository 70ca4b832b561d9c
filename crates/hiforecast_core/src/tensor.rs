//! Window tensor types.

use burn::prelude::*;

use crate::error::{CoreError, Result};
use crate::shape::TSShape;

/// A `(B, V, L)` tensor carrying its shape metadata.
///
/// ```rust,ignore
/// use hiforecast_core::TSTensor;
/// use burn_ndarray::NdArray;
///
/// let x = Tensor::<NdArray, 3>::zeros([32, 7, 96], &device);
/// let x = TSTensor::new(x);
/// assert_eq!(x.vars(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct TSTensor<B: Backend> {
    inner: Tensor<B, 3>,
    shape: TSShape,
}

impl<B: Backend> TSTensor<B> {
    /// Wrap a rank-3 Burn tensor.
    pub fn new(tensor: Tensor<B, 3>) -> Self {
        let shape = TSShape::from(tensor.dims());
        Self {
            inner: tensor,
            shape,
        }
    }

    /// Build a tensor from row-major `(B, V, L)` values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] when `values.len()` does not match
    /// the shape.
    pub fn from_values(values: Vec<f32>, shape: TSShape, device: &B::Device) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(CoreError::InvalidShape {
                expected: format!("{} values for {}", shape.numel(), shape),
                got: format!("{} values", values.len()),
            });
        }
        let data = TensorData::new(values, shape.as_array());
        Ok(Self {
            inner: Tensor::from_data(data, device),
            shape,
        })
    }

    /// A zero tensor of the given shape.
    pub fn zeros(shape: TSShape, device: &B::Device) -> Self {
        Self {
            inner: Tensor::zeros(shape.as_array(), device),
            shape,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> TSShape {
        self.shape
    }

    /// Number of windows.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.shape.batch()
    }

    /// Number of series.
    #[must_use]
    pub const fn vars(&self) -> usize {
        self.shape.vars()
    }

    /// Number of time steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 3> {
        &self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 3> {
        self.inner
    }

    pub fn device(&self) -> B::Device {
        self.inner.device()
    }

    /// Move the tensor to another device.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            inner: self.inner.to_device(device),
            shape: self.shape,
        }
    }
}

/// A batch of input windows with their forecast targets.
///
/// `x` is `(B, V, L)` and `y`, when present, is `(B, V, H)`. Prediction
/// batches carry no target.
#[derive(Debug, Clone)]
pub struct TSBatch<B: Backend> {
    /// Look-back windows.
    pub x: TSTensor<B>,
    /// Future values for each window.
    pub y: Option<Tensor<B, 3>>,
}

impl<B: Backend> TSBatch<B> {
    /// A batch without targets.
    pub fn new(x: TSTensor<B>) -> Self {
        Self { x, y: None }
    }

    /// A batch with targets.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShapeMismatch`] when `y` does not have the same
    /// number of windows and series as `x`.
    pub fn with_target(x: TSTensor<B>, y: Tensor<B, 3>) -> Result<Self> {
        let [yb, yv, _] = y.dims();
        if yb != x.batch() || yv != x.vars() {
            return Err(CoreError::ShapeMismatch(format!(
                "target {:?} does not match input {}",
                y.dims(),
                x.shape()
            )));
        }
        Ok(Self { x, y: Some(y) })
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.x.batch()
    }

    /// Forecast horizon of the target, if any.
    #[must_use]
    pub fn horizon(&self) -> Option<usize> {
        self.y.as_ref().map(|y| y.dims()[2])
    }

    pub fn device(&self) -> B::Device {
        self.x.device()
    }

    /// Move the batch to a device.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            x: self.x.to_device(device),
            y: self.y.map(|y| y.to_device(device)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_from_values_checks_length() {
        let device = Default::default();
        let shape = TSShape::new(1, 2, 3);
        let ok = TSTensor::<TestBackend>::from_values(vec![0.0; 6], shape, &device).unwrap();
        assert_eq!(ok.shape(), shape);

        let err = TSTensor::<TestBackend>::from_values(vec![0.0; 5], shape, &device);
        assert!(err.is_err());
    }

    #[test]
    fn test_batch_target_shape() {
        let device = Default::default();
        let x = TSTensor::<TestBackend>::zeros(TSShape::new(4, 3, 10), &device);
        let y = Tensor::<TestBackend, 3>::zeros([4, 3, 2], &device);
        let batch = TSBatch::with_target(x.clone(), y).unwrap();
        assert_eq!(batch.batch_size(), 4);
        assert_eq!(batch.horizon(), Some(2));

        let bad = Tensor::<TestBackend, 3>::zeros([4, 2, 2], &device);
        assert!(TSBatch::with_target(x, bad).is_err());
    }
}
