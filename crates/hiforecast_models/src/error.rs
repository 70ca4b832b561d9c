//! Error types for hiforecast_models.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while configuring or building models.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A hyper-parameter is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An architecture or component name is not known.
    #[error("Unknown {kind} '{name}'")]
    Unknown {
        /// What was being looked up.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// Config (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
