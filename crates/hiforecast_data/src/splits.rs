//! Temporal train/validation/test splits.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::panel::MultivariatePanel;

/// Sizes of a temporal split, in time steps.
///
/// The last `test_size` steps are held out for testing, the `val_size`
/// steps before them for validation, and the rest is used for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemporalSplitConfig {
    /// Steps reserved for validation.
    pub val_size: usize,
    /// Steps reserved for testing.
    pub test_size: usize,
}

impl TemporalSplitConfig {
    /// Create a new split configuration.
    #[must_use]
    pub const fn new(val_size: usize, test_size: usize) -> Self {
        Self {
            val_size,
            test_size,
        }
    }
}

/// The panels of a temporal split.
///
/// `valid` and `test` start `input_size` steps before their own region so
/// that the first window of each has a full look-back.
#[derive(Debug, Clone)]
pub struct TemporalSplit {
    /// Training panel.
    pub train: MultivariatePanel,
    /// Validation panel with look-back context, if `val_size > 0`.
    pub valid: Option<MultivariatePanel>,
    /// Test panel with look-back context, if `test_size > 0`.
    pub test: Option<MultivariatePanel>,
}

/// Split a panel along time.
///
/// # Errors
///
/// Fails when a non-empty validation or test region is shorter than `h`,
/// or when the training region cannot hold a single window.
pub fn temporal_split(
    panel: &MultivariatePanel,
    config: TemporalSplitConfig,
    input_size: usize,
    h: usize,
) -> Result<TemporalSplit> {
    let TemporalSplitConfig {
        val_size,
        test_size,
    } = config;
    for (name, size) in [("val_size", val_size), ("test_size", test_size)] {
        if size > 0 && size < h {
            return Err(DataError::SplitError(format!(
                "{name} ({size}) is shorter than the horizon ({h})"
            )));
        }
    }

    let total = panel.len();
    let train_end = total
        .checked_sub(val_size + test_size)
        .ok_or(DataError::TooShort {
            needed: val_size + test_size,
            available: total,
        })?;
    if train_end < input_size + h {
        return Err(DataError::TooShort {
            needed: input_size + h + val_size + test_size,
            available: total,
        });
    }

    let train = panel.slice_time(0, train_end)?;
    let valid = if val_size > 0 {
        Some(panel.slice_time(train_end - input_size, train_end + val_size)?)
    } else {
        None
    };
    let test = if test_size > 0 {
        let test_start = total - test_size;
        Some(panel.slice_time(test_start - input_size, total)?)
    } else {
        None
    };

    debug!(train_end, val_size, test_size, "temporal split");
    Ok(TemporalSplit { train, valid, test })
}
