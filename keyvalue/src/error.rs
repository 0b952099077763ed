//! Error types for KeyValue operations.

use common::StorageError;

/// Error type for KeyValue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An empty key, a reserved key, or an explicitly empty range bound.
    InvalidKey(String),

    /// An absent value passed to a write.
    InvalidValue(String),

    /// Invalid configuration or parameter errors.
    InvalidInput(String),

    /// The batch was already written or closed.
    BatchClosed,

    /// A request to the backing store failed. Carries the store's message.
    Storage(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::BatchClosed => write!(f, "Batch has been written or closed"),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Result type alias for KeyValue operations.
pub type Result<T> = std::result::Result<T, Error>;
