//! Errors raised by keyed store backends.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by keyed store backends regardless of the underlying engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was attempted.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The key exists but holds a value of another kind (e.g. a set read as a hash).
    #[error("wrong value type at key `{key}` (expected {expected})")]
    WrongType {
        /// Offending key.
        key: String,
        /// Kind the operation needed.
        expected: &'static str,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    pub(crate) fn wrong_type(key: &str, expected: &'static str) -> Self {
        StorageError::WrongType {
            key: key.to_string(),
            expected,
        }
    }
}
