//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while encoding or decoding canonical keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not follow the `field=value&...` or comma layout
    #[error("Malformed key {key:?}: {reason}")]
    Malformed { key: String, reason: String },

    /// A field required to rebuild the identity is absent
    #[error("Key {key:?} is missing required field {field}")]
    MissingField { key: String, field: &'static str },

    /// A raw value would break the key or the space-delimited wire line
    #[error("Value {value:?} of {field} must not contain whitespace, '&' or '='")]
    InvalidValue { field: &'static str, value: String },
}

impl KeyError {
    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
