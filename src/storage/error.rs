//! Storage error types
//!
//! Defines all errors that can occur while reading or writing a recording
//! container.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Container could not be created or opened, or an I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Version mismatch or structurally inconsistent container
    #[error("Invalid container format: {0}")]
    Format(String),

    /// URI is already registered in the container
    #[error("URI already registered: {0}")]
    DuplicateUri(String),

    /// URI is not registered, or refers to an object of another kind
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parallel arrays, or a payload and its row count, disagree in length
    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    /// An extend would outrun the samples available in its clock
    #[error("Timing error: {0}")]
    Timing(String),

    /// Missing or ambiguous rate/clock specification
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Mutation attempted through a readonly handle
    #[error("Container is read-only")]
    ReadOnly,

    /// Operation on a closed container or dataset
    #[error("Container is closed")]
    Closed,

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::DuplicateUri("http://ex.org/signal".to_string());
        assert_eq!(err.to_string(), "URI already registered: http://ex.org/signal");

        let err = StoreError::ReadOnly;
        assert_eq!(err.to_string(), "Container is read-only");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
    }
}
