//! Error types for hiforecast_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in hiforecast_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Dimension error.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_shapes() {
        let err = CoreError::InvalidShape {
            expected: "(B, V, L)".into(),
            got: "[2, 3]".into(),
        };
        assert_eq!(err.to_string(), "Invalid shape: expected (B, V, L), got [2, 3]");

        let err = CoreError::DimensionError { expected: 3, got: 2 };
        assert_eq!(err.to_string(), "Dimension error: expected 3 dimensions, got 2");
    }
}
