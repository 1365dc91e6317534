//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror. Absence of an entry is
//! never an error: lookups return `Ok(None)` instead.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Malformed key, unknown namespace or invalid argument, rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Compression failed; the payload is stored uncompressed instead
    #[error("Compression error: {0}")]
    Compression(String),

    /// The persistent tier could not be reached or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored payload could not be decoded
    #[error("Corrupted entry: {0}")]
    Corrupted(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StorageUnavailable(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_error_maps_to_storage_unavailable() {
        let err: CacheError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, CacheError::StorageUnavailable(_)));
    }

    #[test]
    fn test_io_error_maps_to_storage_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: CacheError = io.into();
        assert!(err.to_string().contains("read-only"));
    }
}
