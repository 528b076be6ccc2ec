//! Error types for SPYGLASS operations

use thiserror::Error;

/// Errors surfaced through the cache result envelope.
///
/// Only `Miss` ever reaches a caller, and only on `get`; every other
/// failure mode (closed event source, cancellation) manifests as channel
/// closure rather than as a value.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
}

/// Errors from the delegated (non-streaming) service operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {id}")]
    NotFound { id: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CacheError::Miss.to_string(), "cache miss");

        let err = ServiceError::NotFound {
            id: "s1".to_string(),
        };
        assert_eq!(err.to_string(), "not found: s1");
    }
}
