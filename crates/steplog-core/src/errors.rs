//! Error type shared by every record operation.
//!
//! All failures are local to the operation that detected them and propagate
//! to the caller unmodified. A conflict always means two quantities were
//! given the same name, so nothing here is retried or recovered.

use serde::{Deserialize, Serialize};

/// Errors raised while building, merging or reading records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RecordError {
    /// A key was written twice at the same level and the two values could not
    /// be merged (at least one of them is a leaf).
    #[error("duplicate record key `{path}`")]
    DuplicateKey {
        /// Dotted path of the offending key, relative to the record that
        /// detected the conflict.
        path: String,
    },

    /// A key or path segment is not usable as a record key.
    #[error("invalid record key `{key}`: {reason}")]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A trajectory column was requested but one sample does not carry it.
    #[error("sample {index} has no value at `{path}`")]
    MissingSeries {
        /// Dotted path that was looked up
        path: String,
        /// Position of the first sample missing the path
        index: usize,
    },

    /// A trajectory column was requested as numbers but holds something else.
    #[error("sample {index} holds a non-numeric value at `{path}`")]
    NonNumericSeries {
        /// Dotted path that was looked up
        path: String,
        /// Position of the first non-numeric sample
        index: usize,
    },

    /// Converting a record into another representation failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message from the serializer
        message: String,
    },

    /// The sampling configuration could not be read or is inconsistent.
    #[error("invalid sampling configuration: {message}")]
    Config {
        /// Error message describing the problem
        message: String,
    },
}

impl RecordError {
    /// Create a duplicate key error for the given dotted path
    pub fn duplicate_key(path: impl Into<String>) -> Self {
        Self::DuplicateKey { path: path.into() }
    }

    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error reports a key conflict
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Standard result type for record operations
pub type Result<T> = std::result::Result<T, RecordError>;

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RecordError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_names_the_path() {
        let err = RecordError::duplicate_key("controller.torque");
        assert!(err.is_duplicate_key());
        assert_eq!(err.to_string(), "duplicate record key `controller.torque`");
    }

    #[test]
    fn config_errors_are_not_conflicts() {
        let err = RecordError::config("count must be at least 1");
        assert!(!err.is_duplicate_key());
        assert!(err.to_string().contains("count must be at least 1"));
    }
}
