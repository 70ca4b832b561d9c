//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Trainer hyper-parameter out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The panel cannot provide what the trainer needs.
    #[error("Not enough data: {0}")]
    InsufficientData(String),

    /// The loss became NaN or infinite.
    #[error("Loss diverged at step {step}: {value}")]
    Diverged {
        /// Optimizer step.
        step: usize,
        /// Offending loss value.
        value: f32,
    },

    /// Forecast array with unexpected dimensions.
    #[error("Shape error: {0}")]
    ShapeError(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] hiforecast_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] hiforecast_core::CoreError),

    /// Model error.
    #[error("Model error: {0}")]
    ModelError(#[from] hiforecast_models::ModelError),

    /// Checkpoint error.
    #[error("Checkpoint error: {0}")]
    CheckpointError(#[from] hiforecast_models::CheckpointError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
