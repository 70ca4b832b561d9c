//! Forecast window datasets.

use ndarray::{Array2, Array3, Axis};

use crate::error::{DataError, Result};

/// A set of `(input, target)` window pairs.
///
/// - `x`: `(N, V, input_size)` look-back windows
/// - `y`: `(N, V, h)` the values that follow each window
#[derive(Debug, Clone)]
pub struct WindowDataset {
    x: Array3<f32>,
    y: Array3<f32>,
}

impl WindowDataset {
    /// Pair input and target windows.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] when `x` and `y` disagree on the
    /// number of windows or series.
    pub fn from_arrays(x: Array3<f32>, y: Array3<f32>) -> Result<Self> {
        let (xn, xv, _) = x.dim();
        let (yn, yv, _) = y.dim();
        if xn != yn || xv != yv {
            return Err(DataError::InvalidShape(format!(
                "x is {:?} but y is {:?}",
                x.dim(),
                y.dim()
            )));
        }
        Ok(Self { x, y })
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of series.
    #[must_use]
    pub fn n_series(&self) -> usize {
        self.x.len_of(Axis(1))
    }

    /// Look-back length.
    #[must_use]
    pub fn input_size(&self) -> usize {
        self.x.len_of(Axis(2))
    }

    /// Forecast horizon.
    #[must_use]
    pub fn horizon(&self) -> usize {
        self.y.len_of(Axis(2))
    }

    #[must_use]
    pub fn x(&self) -> &Array3<f32> {
        &self.x
    }

    #[must_use]
    pub fn y(&self) -> &Array3<f32> {
        &self.y
    }

    /// The `(V, input_size)` and `(V, h)` slices of window `idx`.
    pub fn get(&self, idx: usize) -> Result<(Array2<f32>, Array2<f32>)> {
        if idx >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index: idx,
                length: self.len(),
            });
        }
        Ok((
            self.x.index_axis(Axis(0), idx).to_owned(),
            self.y.index_axis(Axis(0), idx).to_owned(),
        ))
    }

    /// A new dataset holding the windows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index: bad,
                length: self.len(),
            });
        }
        Ok(Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_validation() {
        let ok = WindowDataset::from_arrays(Array3::zeros((4, 3, 8)), Array3::zeros((4, 3, 2)));
        assert!(ok.is_ok());
        let bad = WindowDataset::from_arrays(Array3::zeros((4, 3, 8)), Array3::zeros((4, 2, 2)));
        assert!(bad.is_err());
    }

    #[test]
    fn test_subset_and_get() {
        let x = Array3::from_shape_fn((5, 2, 3), |(n, _, _)| n as f32);
        let y = Array3::from_shape_fn((5, 2, 1), |(n, _, _)| n as f32 * 10.0);
        let ds = WindowDataset::from_arrays(x, y).unwrap();

        let sub = ds.subset(&[4, 1]).unwrap();
        assert_eq!(sub.len(), 2);
        let (x0, y0) = sub.get(0).unwrap();
        assert_eq!(x0[[0, 0]], 4.0);
        assert_eq!(y0[[1, 0]], 40.0);

        assert!(ds.subset(&[5]).is_err());
        assert!(ds.get(5).is_err());
    }
}
