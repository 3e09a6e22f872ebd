//! Error types for the contact model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A birthday string could not be parsed.
    #[error("invalid birthday '{input}': {reason}")]
    InvalidBirthday {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A pipeline stage name was empty.
    #[error("pipeline stage name must not be empty")]
    EmptyStage,
}

impl ModelError {
    pub(crate) fn birthday(input: &str, reason: &'static str) -> Self {
        Self::InvalidBirthday {
            input: input.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::birthday("1990-13-01", "month out of range");
        assert_eq!(
            err.to_string(),
            "invalid birthday '1990-13-01': month out of range"
        );
    }
}
