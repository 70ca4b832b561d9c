//! Window shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of a batch of windows in the `(B, V, L)` layout.
///
/// - `B`: number of windows
/// - `V`: number of series
/// - `L`: time steps (look-back length for inputs, horizon for forecasts)
///
/// ```rust
/// use hiforecast_core::TSShape;
///
/// let input = TSShape::new(32, 7, 96);
/// let forecast = input.with_len(24);
/// assert_eq!(forecast.as_array(), [32, 7, 24]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TSShape {
    batch: usize,
    vars: usize,
    len: usize,
}

impl TSShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(batch: usize, vars: usize, len: usize) -> Self {
        Self { batch, vars, len }
    }

    /// Create a shape from exactly three dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DimensionError`] for any other rank.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [b, v, l] => Ok(Self::new(*b, *v, *l)),
            _ => Err(CoreError::DimensionError {
                expected: 3,
                got: dims.len(),
            }),
        }
    }

    /// Number of windows.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Number of series.
    #[must_use]
    pub const fn vars(&self) -> usize {
        self.vars
    }

    /// Number of time steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.vars == 0 || self.len == 0
    }

    /// Total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.batch * self.vars * self.len
    }

    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.batch, self.vars, self.len]
    }

    /// Same windows and series with a different time length.
    #[must_use]
    pub const fn with_len(&self, len: usize) -> Self {
        Self::new(self.batch, self.vars, len)
    }

    /// Same series and length with a different number of windows.
    #[must_use]
    pub const fn with_batch(&self, batch: usize) -> Self {
        Self::new(batch, self.vars, self.len)
    }

    /// Check that `other` is the forecast counterpart of this input shape:
    /// same windows and series, `horizon` steps.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] when the shapes disagree.
    pub fn check_forecast(&self, other: &TSShape, horizon: usize) -> Result<()> {
        let expected = self.with_len(horizon);
        if *other != expected {
            return Err(CoreError::InvalidShape {
                expected: expected.to_string(),
                got: other.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for TSShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(B={}, V={}, L={})", self.batch, self.vars, self.len)
    }
}

impl From<[usize; 3]> for TSShape {
    fn from(dims: [usize; 3]) -> Self {
        Self::new(dims[0], dims[1], dims[2])
    }
}
