use heifer_backend::StoreError;
use thiserror::Error;

/// Contradictory conditional request headers.
///
/// Answered with `400 Bad Request` before any store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolConflict {
    /// Both `If-Match` and `If-None-Match` were sent.
    #[error("If-Match and If-None-Match are mutually exclusive")]
    MatchAndNoneMatch,
    /// Both `If-Modified-Since` and `If-Unmodified-Since` were sent.
    #[error("If-Modified-Since and If-Unmodified-Since are mutually exclusive")]
    ModifiedAndUnmodifiedSince,
}

/// Error type surfaced by the client and server pipelines.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A store operation failed and the policy asked to propagate it.
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    /// The request carried contradictory conditional headers.
    #[error(transparent)]
    Protocol(#[from] ProtocolConflict),

    /// A policy could not be loaded.
    #[error("invalid cache configuration: {0}")]
    Config(String),
}
