//! Temporal split identifiers.

use serde::{Deserialize, Serialize};

/// Which temporal segment of a panel a window belongs to.
///
/// Splits are contiguous in time: train precedes valid, valid precedes test.
/// Models switch stochastic behavior (dropout, STAD sampling) off outside
/// of [`Split::Train`].
///
/// ```rust
/// use hiforecast_core::Split;
///
/// assert!(Split::Train.is_train());
/// assert!(Split::Test.is_eval());
/// assert_eq!(Split::Valid.to_string(), "valid");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Windows used for gradient steps.
    #[default]
    Train,
    /// Windows used for early stopping and best-model selection.
    Valid,
    /// Held-out windows for final evaluation.
    Test,
}

impl Split {
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Valid or test.
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Valid | Split::Test)
    }

    /// All splits in temporal order.
    #[must_use]
    pub const fn all() -> [Split; 3] {
        [Split::Train, Split::Valid, Split::Test]
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Valid => write!(f, "valid"),
            Split::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_checks() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Valid.is_eval());
        assert!(Split::Test.is_eval());
    }

    #[test]
    fn test_split_order_and_serde() {
        assert_eq!(Split::all(), [Split::Train, Split::Valid, Split::Test]);
        let json = serde_json::to_string(&Split::Valid).unwrap();
        assert_eq!(json, "\"valid\"");
    }
}
