//! Error types for store operations.

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for store operations.
///
/// Groups failures so callers can decide between degrading to a miss and
/// surfacing the error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// Network interaction error.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    /// A stored value could not be encoded or decoded.
    #[error("format error: {0}")]
    Format(String),
}

impl StoreError {
    /// Wraps any error as [`StoreError::Internal`].
    pub fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Internal(Box::new(error))
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Internal(_) => "internal",
            StoreError::Connection(_) => "connection",
            StoreError::Format(_) => "format",
        }
    }
}
