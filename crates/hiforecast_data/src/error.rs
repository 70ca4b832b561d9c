//! Error types for hiforecast_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while loading panels or building windows.
#[derive(Error, Debug)]
pub enum DataError {
    /// Arrays whose dimensions disagree.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Nothing to iterate over.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// The panel is too short for the requested windows or splits.
    #[error("Series too short: need {needed} time steps, have {available}")]
    TooShort {
        /// Minimum number of time steps required.
        needed: usize,
        /// Number of time steps in the panel.
        available: usize,
    },

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// NaN or infinite observation.
    #[error("Non-finite value in series '{series}' at step {step}")]
    NonFinite {
        /// Series id.
        series: String,
        /// Time index.
        step: usize,
    },

    /// File format error.
    #[error("File format error: {0}")]
    FormatError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] hiforecast_core::CoreError),
}
