//! Moka-backed validator store.

use std::sync::Arc;

use async_trait::async_trait;
use heifer_backend::{InvalidationIndex, StoreResult, ValidatorStore};
use heifer_core::{CacheIdentity, RoutePattern, Validator};
use moka::future::Cache;
use moka::notification::RemovalCause;
use smol_str::SmolStr;
use tracing::warn;

#[derive(Debug, Clone)]
struct Stored {
    identity: CacheIdentity,
    validator: SmolStr,
}

/// In-memory [`ValidatorStore`].
///
/// Validators are kept in their header form and parsed on read; an entry that
/// fails to parse is treated as absent. Entries dropped by capacity eviction
/// are also dropped from the invalidation index.
#[derive(Clone)]
pub struct MokaValidatorStore {
    cache: Cache<SmolStr, Stored>,
    index: Arc<InvalidationIndex>,
}

impl MokaValidatorStore {
    /// Creates a store holding at most `max_entries` validators.
    pub fn new(max_entries: u64) -> Self {
        let index = Arc::new(InvalidationIndex::new());
        let on_eviction = {
            let index = index.clone();
            move |_key: Arc<SmolStr>, stored: Stored, cause: RemovalCause| {
                if cause.was_evicted() {
                    index.forget(&stored.identity);
                }
            }
        };
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_listener(on_eviction)
            .build();
        Self { cache, index }
    }

    /// The resource URI / route pattern index.
    pub fn index(&self) -> &InvalidationIndex {
        &self.index
    }

    /// Number of stored validators, after pending maintenance.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs Moka's pending maintenance.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn drop_all(&self, identities: Vec<CacheIdentity>) -> usize {
        let mut removed = 0;
        for identity in identities {
            if self.cache.remove(identity.hash()).await.is_some() {
                removed += 1;
            }
        }
        removed
    }
}

impl std::fmt::Debug for MokaValidatorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaValidatorStore")
            .field("entries", &self.cache.entry_count())
            .field("index", &self.index)
            .finish()
    }
}

#[async_trait]
impl ValidatorStore for MokaValidatorStore {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Validator>> {
        let Some(stored) = self.cache.get(identity.hash()).await else {
            return Ok(None);
        };
        match stored.validator.parse::<Validator>() {
            Ok(validator) => Ok(Some(validator)),
            Err(error) => {
                warn!(identity = %identity, raw = stored.validator.as_str(), %error, "malformed stored validator, treating as absent");
                Ok(None)
            }
        }
    }

    async fn put(&self, identity: &CacheIdentity, validator: Validator) -> StoreResult<()> {
        let stored = Stored {
            identity: identity.clone(),
            validator: SmolStr::new(validator.to_string()),
        };
        self.cache
            .insert(SmolStr::new(identity.hash()), stored)
            .await;
        self.index.register(identity);
        Ok(())
    }

    async fn remove_by_identity(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        self.index.forget(identity);
        Ok(self.cache.remove(identity.hash()).await.is_some())
    }

    async fn remove_by_resource_uri(&self, resource_uri: &str) -> StoreResult<usize> {
        Ok(self.drop_all(self.index.take_resource(resource_uri)).await)
    }

    async fn remove_by_route_pattern(&self, pattern: &RoutePattern) -> StoreResult<usize> {
        Ok(self.drop_all(self.index.take_pattern(pattern)).await)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.cache.invalidate_all();
        self.index.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use heifer_core::EntityTag;

    #[tokio::test]
    async fn test_malformed_validator_is_absent() {
        let store = MokaValidatorStore::new(100);
        let identity = CacheIdentity::new("/api/cars/1", vec![], "test");
        store
            .cache
            .insert(
                SmolStr::new(identity.hash()),
                Stored {
                    identity: identity.clone(),
                    validator: SmolStr::new("W/\"unterminated"),
                },
            )
            .await;
        assert_eq!(store.get(&identity).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_both_validator_kinds_survive_storage() {
        let store = MokaValidatorStore::new(100);
        let tag = CacheIdentity::new("/api/cars/1", vec![], "test");
        let date = CacheIdentity::new("/api/cars/2", vec![], "test");
        let modified = chrono::Utc.with_ymd_and_hms(2018, 4, 1, 0, 0, 0).unwrap();

        store.put(&tag, Validator::etag(EntityTag::weak("v1"))).await.unwrap();
        store.put(&date, Validator::last_modified(modified)).await.unwrap();

        assert_eq!(
            store.get(&tag).await.unwrap(),
            Some(Validator::etag(EntityTag::weak("v1")))
        );
        assert_eq!(
            store.get(&date).await.unwrap(),
            Some(Validator::last_modified(modified))
        );
    }
}
