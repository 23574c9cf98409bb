//! Least-recently-accessed eviction for [`MokaResponseStore`].

use async_trait::async_trait;
use heifer::quota::{Housekeeper, HousekeepingError, HousekeepingRequest, QuotaScope};
use heifer_backend::MetadataProvider;
use heifer_core::EntryMeta;
use tracing::debug;

use crate::MokaResponseStore;

/// Evicts the least recently accessed responses of the crossed scope until
/// the excess is freed.
///
/// Removals go through the store, so the quota manager sees them as ordinary
/// `item_removed` events.
#[derive(Debug, Clone)]
pub struct LruHousekeeper {
    store: MokaResponseStore,
}

impl LruHousekeeper {
    /// Creates a housekeeper evicting from `store`.
    pub fn new(store: MokaResponseStore) -> Self {
        Self { store }
    }

    async fn candidates(&self, scope: &QuotaScope) -> Result<Vec<EntryMeta>, HousekeepingError> {
        let mut items = match scope {
            QuotaScope::Domain(domain) => self.store.items(domain).await?,
            QuotaScope::Global => {
                let mut items = Vec::new();
                for domain in self.store.domains().await? {
                    items.extend(self.store.items(&domain).await?);
                }
                items
            }
        };
        items.sort_by_key(|meta| meta.last_accessed);
        Ok(items)
    }
}

#[async_trait]
impl Housekeeper for LruHousekeeper {
    async fn housekeep(&self, request: HousekeepingRequest) -> Result<(), HousekeepingError> {
        let excess = request.excess();
        let mut freed = 0u64;
        let mut evicted = 0usize;
        for meta in self.candidates(&request.scope).await? {
            if freed >= excess {
                break;
            }
            if self.store.remove_key(&meta.key).await {
                freed += meta.size;
                evicted += 1;
            }
        }
        debug!(scope = %request.scope, excess, freed, evicted, "housekeeping finished");
        Ok(())
    }
}
