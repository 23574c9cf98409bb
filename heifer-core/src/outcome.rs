//! Decision enums produced by the freshness evaluator and the conditional
//! request classifier.

use std::fmt;

/// Classification of a stored response on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FreshnessOutcome {
    /// Not evaluated yet.
    #[default]
    None,
    /// Nothing stored for the identity.
    NotExist,
    /// Fresh; can be served as-is.
    Ok,
    /// Expired but may be served if the request tolerates staleness.
    Stale,
    /// Must be revalidated with the origin before use.
    MustRevalidate,
    /// Must not be stored or served from the cache.
    NotCacheable,
}

impl FreshnessOutcome {
    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NotExist => "not-exist",
            Self::Ok => "ok",
            Self::Stale => "stale",
            Self::MustRevalidate => "must-revalidate",
            Self::NotCacheable => "not-cacheable",
        }
    }

    /// Whether a response with this outcome may be written to the store.
    pub fn is_storable(&self) -> bool {
        matches!(self, Self::Ok | Self::MustRevalidate)
    }
}

impl fmt::Display for FreshnessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of conditional request seen by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionalKind {
    /// No `If-*` header.
    #[default]
    None,
    /// `GET`/`HEAD` with `If-Modified-Since`.
    GetIfModifiedSince,
    /// `GET`/`HEAD` with `If-None-Match`.
    GetIfNoneMatch,
    /// Mutating method with `If-Match`.
    MutateIfMatch,
    /// Mutating method with `If-Unmodified-Since`.
    MutateIfUnmodifiedSince,
}

impl ConditionalKind {
    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::GetIfModifiedSince => "get-if-modified-since",
            Self::GetIfNoneMatch => "get-if-none-match",
            Self::MutateIfMatch => "mutate-if-match",
            Self::MutateIfUnmodifiedSince => "mutate-if-unmodified-since",
        }
    }

    /// True for the read-side kinds answered with `304`.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::GetIfModifiedSince | Self::GetIfNoneMatch)
    }

    /// True for the write-side kinds answered with `412`.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::MutateIfMatch | Self::MutateIfUnmodifiedSince)
    }
}

impl fmt::Display for ConditionalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
