//! Moka-backed response store.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use heifer_backend::{MetadataProvider, ResponseStore, StoreResult, UsageListener};
use heifer_core::{CacheIdentity, EntryMeta};
use moka::future::Cache;
use smol_str::SmolStr;

use crate::builder::MokaResponseStoreBuilder;

/// Stored blob with the domain it is accounted against.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) domain: SmolStr,
    pub(crate) body: Bytes,
}

impl Entry {
    pub(crate) fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

pub(crate) type ListenerSlot = Arc<OnceLock<Arc<dyn UsageListener>>>;

/// In-memory [`ResponseStore`] keyed by identity hash.
///
/// Every write is reported to the usage listener as `item_added`; every
/// removal, replacement, expiry or capacity eviction as `item_removed`, so a
/// [`QuotaManager`](heifer::QuotaManager) listening on the store always sees
/// the bytes actually held.
///
/// Cloning is cheap and clones share the same entries.
#[derive(Clone)]
pub struct MokaResponseStore {
    pub(crate) cache: Cache<SmolStr, Entry>,
    pub(crate) meta: Arc<DashMap<SmolStr, EntryMeta>>,
    pub(crate) usage: ListenerSlot,
}

impl MokaResponseStore {
    /// Creates a builder. Without capacity the store is unbounded.
    pub fn builder() -> MokaResponseStoreBuilder {
        MokaResponseStoreBuilder::new()
    }

    /// Installs the usage listener. Returns `false` if one was already set.
    pub fn set_listener(&self, listener: Arc<dyn UsageListener>) -> bool {
        self.usage.set(listener).is_ok()
    }

    /// Removes an entry by storage key (identity hash).
    pub async fn remove_key(&self, key: &str) -> bool {
        let removed = self.cache.remove(key).await.is_some();
        if removed {
            self.meta.remove(key);
        }
        removed
    }

    /// Number of stored entries, after pending maintenance.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs Moka's pending maintenance, delivering queued eviction
    /// notifications.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for MokaResponseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaResponseStore")
            .field("cache", &self.cache)
            .field("listener", &self.usage.get().is_some())
            .finish()
    }
}

#[async_trait]
impl ResponseStore for MokaResponseStore {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Bytes>> {
        let entry = self.cache.get(identity.hash()).await;
        if entry.is_some()
            && let Some(mut meta) = self.meta.get_mut(identity.hash())
        {
            meta.last_accessed = Utc::now();
        }
        Ok(entry.map(|entry| entry.body))
    }

    async fn put(&self, identity: &CacheIdentity, value: Bytes) -> StoreResult<()> {
        let key = SmolStr::new(identity.hash());
        let entry = Entry {
            domain: SmolStr::new(identity.domain().unwrap_or_default()),
            body: value,
        };
        let meta = EntryMeta::new(key.clone(), entry.domain.clone(), entry.size());
        self.meta.insert(key.clone(), meta.clone());
        self.cache.insert(key, entry).await;
        if let Some(usage) = self.usage.get() {
            usage.item_added(&meta);
        }
        Ok(())
    }

    async fn remove(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        Ok(self.remove_key(identity.hash()).await)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.meta.clear();
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for MokaResponseStore {
    async fn domains(&self) -> StoreResult<Vec<SmolStr>> {
        let domains: BTreeSet<SmolStr> = self
            .meta
            .iter()
            .map(|meta| meta.domain.clone())
            .collect();
        Ok(domains.into_iter().collect())
    }

    async fn items(&self, domain: &str) -> StoreResult<Vec<EntryMeta>> {
        Ok(self
            .meta
            .iter()
            .filter(|meta| meta.domain.as_str() == domain)
            .map(|meta| meta.clone())
            .collect())
    }
}
