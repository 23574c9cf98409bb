//! Quota bookkeeping for stored entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Size and access information of a stored entry.
///
/// Only quota accounting and housekeeping look at this; it never participates
/// in freshness decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Storage key (identity hash).
    pub key: SmolStr,
    /// Domain the entry is accounted against. Empty for relative URIs.
    pub domain: SmolStr,
    /// Stored size in bytes.
    pub size: u64,
    /// Last time the entry was read or written.
    pub last_accessed: DateTime<Utc>,
}

impl EntryMeta {
    /// Creates metadata stamped with the current time.
    pub fn new(key: impl Into<SmolStr>, domain: impl Into<SmolStr>, size: u64) -> Self {
        Self {
            key: key.into(),
            domain: domain.into(),
            size,
            last_accessed: Utc::now(),
        }
    }

    /// Returns a copy with an explicit access time.
    pub fn accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed = at;
        self
    }
}
