//! Route patterns used as invalidation keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Marker terminating a collection pattern (`/api/cars/*`).
pub const COLLECTION_MARKER: char = '*';
/// Marker terminating an instance pattern (`/api/cars/+`).
pub const INSTANCE_MARKER: char = '+';

/// A string classifying a family of URIs.
///
/// Either a literal path or a path whose last segment is one of the
/// [`COLLECTION_MARKER`] / [`INSTANCE_MARKER`] markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutePattern(SmolStr);

impl RoutePattern {
    /// Wraps a pattern string.
    pub fn new(pattern: impl Into<SmolStr>) -> Self {
        Self(pattern.into())
    }

    /// Builds `{prefix}/*`.
    pub fn collection(prefix: &str) -> Self {
        Self::with_marker(prefix, COLLECTION_MARKER)
    }

    /// Builds `{prefix}/+`.
    pub fn instance(prefix: &str) -> Self {
        Self::with_marker(prefix, INSTANCE_MARKER)
    }

    fn with_marker(prefix: &str, marker: char) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self(SmolStr::new(format!("{prefix}/{marker}")))
    }

    /// Pattern string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ends in the collection marker.
    pub fn is_collection(&self) -> bool {
        self.0.ends_with(COLLECTION_MARKER)
    }

    /// Ends in the instance marker.
    pub fn is_instance(&self) -> bool {
        self.0.ends_with(INSTANCE_MARKER)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutePattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoutePattern {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
