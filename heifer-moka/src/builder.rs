//! Builder for configuring [`MokaResponseStore`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use heifer_backend::UsageListener;
use heifer_core::EntryMeta;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use smol_str::SmolStr;
use tracing::debug;

use crate::response::{Entry, ListenerSlot, MokaResponseStore};

#[derive(Debug, Clone, Copy)]
enum Capacity {
    Unbounded,
    Entries(u64),
    Bytes(u64),
}

/// Builder for creating and configuring a [`MokaResponseStore`].
///
/// Use [`MokaResponseStore::builder`] to create a new builder instance.
///
/// ```
/// use std::time::Duration;
/// use heifer_moka::MokaResponseStore;
///
/// // 64 MB of response bodies, dropped after an hour without reads
/// let store = MokaResponseStore::builder()
///     .max_bytes(64 * 1024 * 1024)
///     .time_to_idle(Duration::from_secs(3600))
///     .build();
/// ```
pub struct MokaResponseStoreBuilder {
    capacity: Capacity,
    time_to_idle: Option<Duration>,
    eviction_policy: Option<EvictionPolicy>,
    listener: Option<Arc<dyn UsageListener>>,
}

impl MokaResponseStoreBuilder {
    /// Creates a new builder with no capacity limit.
    pub fn new() -> Self {
        Self {
            capacity: Capacity::Unbounded,
            time_to_idle: None,
            eviction_policy: None,
            listener: None,
        }
    }

    /// Limits the number of stored responses.
    pub fn max_entries(self, capacity: u64) -> Self {
        Self {
            capacity: Capacity::Entries(capacity),
            ..self
        }
    }

    /// Limits the total size of stored response blobs.
    ///
    /// Defaults the eviction policy to LRU, since TinyLFU admission can
    /// reject new entries even when eviction could make room.
    pub fn max_bytes(self, bytes: u64) -> Self {
        Self {
            capacity: Capacity::Bytes(bytes),
            ..self
        }
    }

    /// Drops entries not read or written for `duration`.
    pub fn time_to_idle(self, duration: Duration) -> Self {
        Self {
            time_to_idle: Some(duration),
            ..self
        }
    }

    /// Sets the eviction policy used when capacity is reached.
    pub fn eviction_policy(self, policy: EvictionPolicy) -> Self {
        Self {
            eviction_policy: Some(policy),
            ..self
        }
    }

    /// Installs the usage listener at construction time.
    ///
    /// Can also be set later with
    /// [`MokaResponseStore::set_listener`](crate::MokaResponseStore::set_listener),
    /// which is needed when the listener itself refers to the store.
    pub fn listener(self, listener: Arc<dyn UsageListener>) -> Self {
        Self {
            listener: Some(listener),
            ..self
        }
    }

    /// Builds the store.
    pub fn build(self) -> MokaResponseStore {
        let meta: Arc<DashMap<SmolStr, EntryMeta>> = Arc::new(DashMap::new());
        let usage: ListenerSlot = Arc::new(OnceLock::new());
        if let Some(listener) = self.listener {
            let _ = usage.set(listener);
        }

        let on_removal = {
            let meta = meta.clone();
            let usage = usage.clone();
            move |key: Arc<SmolStr>, entry: Entry, cause: RemovalCause| {
                if cause != RemovalCause::Replaced {
                    meta.remove(key.as_str());
                }
                if cause.was_evicted() {
                    debug!(key = key.as_str(), ?cause, size = entry.size(), "response evicted");
                }
                if let Some(usage) = usage.get() {
                    let size = entry.size();
                    usage.item_removed(&EntryMeta::new((*key).clone(), entry.domain, size));
                }
            }
        };

        let mut builder = Cache::builder().eviction_listener(on_removal);
        builder = match self.capacity {
            Capacity::Unbounded => builder,
            Capacity::Entries(entries) => builder
                .max_capacity(entries)
                .eviction_policy(self.eviction_policy.unwrap_or_else(EvictionPolicy::tiny_lfu)),
            Capacity::Bytes(bytes) => builder
                .max_capacity(bytes)
                .weigher(byte_weigher)
                .eviction_policy(self.eviction_policy.unwrap_or_else(EvictionPolicy::lru)),
        };
        if let Some(time_to_idle) = self.time_to_idle {
            builder = builder.time_to_idle(time_to_idle);
        }

        MokaResponseStore {
            cache: builder.build(),
            meta,
            usage,
        }
    }
}

impl Default for MokaResponseStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn byte_weigher(_key: &SmolStr, entry: &Entry) -> u32 {
    u32::try_from(entry.body.len()).unwrap_or(u32::MAX)
}
