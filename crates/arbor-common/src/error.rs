//! Error types for Arbor
//!
//! Store errors are authoritative and always reach the caller. Cache errors
//! exist so backends can report failures, but the folder-size layer logs and
//! drops them instead of propagating.

use crate::mpath::MPathError;
use thiserror::Error;

/// Common result type for Arbor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Arbor
#[derive(Debug, Error)]
pub enum Error {
    // Tree store errors
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid mpath: {0}")]
    InvalidMPath(#[from] MPathError),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("storage error: {0}")]
    Storage(String),

    // Cache errors
    #[error("cache error: {0}")]
    Cache(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a node not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NodeNotFound(what.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_))
    }

    /// Check if this error came from the cache layer
    #[must_use]
    pub const fn is_cache_error(&self) -> bool {
        matches!(self, Self::Cache(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::not_found("1,2").is_not_found());
        assert!(!Error::storage("disk").is_not_found());
        assert!(Error::cache("boom").is_cache_error());
        assert!(!Error::storage("disk").is_cache_error());
    }

    #[test]
    fn test_mpath_error_conversion() {
        let err: Error = "1,0".parse::<crate::MPath>().unwrap_err().into();
        assert!(matches!(err, Error::InvalidMPath(_)));
        assert_eq!(err.to_string(), "invalid mpath: mpath segment at position 1 is zero");
    }
}
