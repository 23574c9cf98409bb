use async_trait::async_trait;
use heifer_core::EntryMeta;
use smol_str::SmolStr;

use crate::StoreResult;

/// Receives size accounting events from a response store.
///
/// Called inline on the store's write and eviction paths; implementations must
/// not block.
pub trait UsageListener: Send + Sync {
    fn item_added(&self, meta: &EntryMeta);

    fn item_removed(&self, meta: &EntryMeta);
}

/// Per-domain listing of stored entries.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Every domain with at least one stored entry.
    async fn domains(&self) -> StoreResult<Vec<SmolStr>>;

    /// Entries accounted against `domain`.
    async fn items(&self, domain: &str) -> StoreResult<Vec<EntryMeta>>;
}
