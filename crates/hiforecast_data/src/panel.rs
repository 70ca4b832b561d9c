//! Aligned multivariate panels.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::dataset::WindowDataset;
use crate::error::{DataError, Result};

/// `n_series` aligned series of equal length `T`, stored as `(V, T)`.
///
/// Every series shares the same timestamps; row `v` holds the observations
/// of the series named `ids[v]`.
///
/// # Example
///
/// ```rust
/// use hiforecast_data::MultivariatePanel;
/// use ndarray::Array2;
///
/// let values = Array2::from_shape_fn((3, 20), |(v, t)| (v * 100 + t) as f32);
/// let panel = MultivariatePanel::from_array(values).unwrap();
/// let windows = panel.windows(8, 4, 1).unwrap();
/// assert_eq!(windows.len(), 20 - 8 - 4 + 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariatePanel {
    ids: Vec<String>,
    values: Array2<f32>,
}

impl MultivariatePanel {
    /// Create a panel from series ids and a `(V, T)` value matrix.
    ///
    /// # Errors
    ///
    /// Fails when the panel is empty, the number of ids differs from the
    /// number of rows, or any value is not finite.
    pub fn new(ids: Vec<String>, values: Array2<f32>) -> Result<Self> {
        let (n_series, len) = values.dim();
        if n_series == 0 || len == 0 {
            return Err(DataError::EmptyDataset);
        }
        if ids.len() != n_series {
            return Err(DataError::InvalidShape(format!(
                "{} ids for {} series",
                ids.len(),
                n_series
            )));
        }
        for (v, row) in values.axis_iter(Axis(0)).enumerate() {
            if let Some(step) = row.iter().position(|x| !x.is_finite()) {
                return Err(DataError::NonFinite {
                    series: ids[v].clone(),
                    step,
                });
            }
        }
        Ok(Self { ids, values })
    }

    /// Create a panel with generated ids `series_0 .. series_{V-1}`.
    pub fn from_array(values: Array2<f32>) -> Result<Self> {
        let ids = (0..values.nrows()).map(|v| format!("series_{v}")).collect();
        Self::new(ids, values)
    }

    /// Create a panel from one vector per series.
    ///
    /// # Errors
    ///
    /// Fails when the rows do not all have the same length.
    pub fn from_rows(ids: Vec<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let len = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != len) {
            return Err(DataError::InvalidShape(format!(
                "series {} has {} steps, expected {}",
                bad,
                rows[bad].len(),
                len
            )));
        }
        let n_series = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((n_series, len), flat)
            .map_err(|e| DataError::InvalidShape(e.to_string()))?;
        Self::new(ids, values)
    }

    /// Series ids in row order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The `(V, T)` values.
    #[must_use]
    pub fn values(&self) -> ArrayView2<'_, f32> {
        self.values.view()
    }

    /// Number of series.
    #[must_use]
    pub fn n_series(&self) -> usize {
        self.values.nrows()
    }

    /// Number of time steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.ncols()
    }

    /// Always false for a constructed panel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sub-panel covering time steps `start..end`.
    ///
    /// # Errors
    ///
    /// Fails when the range is empty or out of bounds.
    pub fn slice_time(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.len() {
            return Err(DataError::SplitError(format!(
                "invalid time range {}..{} for {} steps",
                start,
                end,
                self.len()
            )));
        }
        Ok(Self {
            ids: self.ids.clone(),
            values: self.values.slice(s![.., start..end]).to_owned(),
        })
    }

    /// The last `n` steps as a `(1, V, n)` input window.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::TooShort`] when the panel has fewer than `n` steps.
    pub fn last_window(&self, n: usize) -> Result<Array3<f32>> {
        if n == 0 || n > self.len() {
            return Err(DataError::TooShort {
                needed: n.max(1),
                available: self.len(),
            });
        }
        let tail = self.values.slice(s![.., self.len() - n..]).to_owned();
        Ok(tail.insert_axis(Axis(0)))
    }

    /// Cut the panel into `(input_size, h)` windows advancing `step_size`
    /// steps at a time.
    ///
    /// Windows are anchored at the end of the panel: the last window's
    /// target ends on the last timestamp, and earlier windows are laid out
    /// backwards from there.
    ///
    /// # Errors
    ///
    /// Fails for zero sizes or when the panel is shorter than
    /// `input_size + h`.
    pub fn windows(&self, input_size: usize, h: usize, step_size: usize) -> Result<WindowDataset> {
        if input_size == 0 || h == 0 || step_size == 0 {
            return Err(DataError::InvalidShape(format!(
                "input_size ({input_size}), h ({h}) and step_size ({step_size}) must be positive"
            )));
        }
        let span = input_size + h;
        if self.len() < span {
            return Err(DataError::TooShort {
                needed: span,
                available: self.len(),
            });
        }

        let last_start = self.len() - span;
        let mut starts: Vec<usize> = (0..=last_start).rev().step_by(step_size).collect();
        starts.reverse();

        let n_series = self.n_series();
        let mut x = Array3::<f32>::zeros((starts.len(), n_series, input_size));
        let mut y = Array3::<f32>::zeros((starts.len(), n_series, h));
        for (i, &start) in starts.iter().enumerate() {
            x.index_axis_mut(Axis(0), i)
                .assign(&self.values.slice(s![.., start..start + input_size]));
            y.index_axis_mut(Axis(0), i)
                .assign(&self.values.slice(s![.., start + input_size..start + span]));
        }

        debug!(
            n_windows = starts.len(),
            n_series, input_size, h, step_size, "built forecast windows"
        );
        WindowDataset::from_arrays(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n_series: usize, len: usize) -> MultivariatePanel {
        let values = Array2::from_shape_fn((n_series, len), |(v, t)| (v * 1000 + t) as f32);
        MultivariatePanel::from_array(values).unwrap()
    }

    #[test]
    fn test_rejects_bad_panels() {
        assert!(matches!(
            MultivariatePanel::from_array(Array2::zeros((0, 5))),
            Err(DataError::EmptyDataset)
        ));

        let mut values = Array2::<f32>::zeros((2, 5));
        values[[1, 3]] = f32::NAN;
        let err = MultivariatePanel::from_array(values).unwrap_err();
        assert!(matches!(err, DataError::NonFinite { step: 3, .. }));

        let ragged = MultivariatePanel::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![1.0]],
        );
        assert!(ragged.is_err());

        let ids = MultivariatePanel::new(vec!["a".into()], Array2::zeros((2, 3)));
        assert!(ids.is_err());
    }

    #[test]
    fn test_windows_values() {
        let panel = ramp(2, 10);
        let ds = panel.windows(4, 2, 1).unwrap();
        assert_eq!(ds.len(), 5);

        let (x, y) = ds.get(0).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(y.row(0).to_vec(), vec![4.0, 5.0]);
        assert_eq!(y.row(1).to_vec(), vec![1004.0, 1005.0]);

        let (_, y_last) = ds.get(4).unwrap();
        assert_eq!(y_last.row(0).to_vec(), vec![8.0, 9.0]);
    }

    #[test]
    fn test_windows_anchor_at_end_with_step() {
        let panel = ramp(1, 11);
        let ds = panel.windows(3, 2, 3).unwrap();
        // last start = 6, then 3, then 0
        assert_eq!(ds.len(), 3);
        let (_, y) = ds.get(ds.len() - 1).unwrap();
        assert_eq!(y.row(0).to_vec(), vec![9.0, 10.0]);
    }

    #[test]
    fn test_windows_too_short() {
        let panel = ramp(1, 5);
        assert!(matches!(
            panel.windows(4, 2, 1),
            Err(DataError::TooShort {
                needed: 6,
                available: 5
            })
        ));
        assert!(panel.windows(0, 2, 1).is_err());
    }

    #[test]
    fn test_last_window() {
        let panel = ramp(2, 10);
        let w = panel.last_window(3).unwrap();
        assert_eq!(w.dim(), (1, 2, 3));
        assert_eq!(w[[0, 1, 2]], 1009.0);
        assert!(panel.last_window(11).is_err());
    }
}
