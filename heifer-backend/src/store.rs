use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use heifer_core::{CacheIdentity, RoutePattern, Validator};

use crate::StoreResult;

/// Opaque response blobs keyed by identity.
///
/// `put` replaces atomically, so a concurrent `get` observes either the old or
/// the new value.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Bytes>>;

    async fn put(&self, identity: &CacheIdentity, value: Bytes) -> StoreResult<()>;

    /// Returns whether an entry was removed.
    async fn remove(&self, identity: &CacheIdentity) -> StoreResult<bool>;

    async fn clear(&self) -> StoreResult<()>;
}

/// Validators keyed by identity, with bulk removal.
#[async_trait]
pub trait ValidatorStore: Send + Sync {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Validator>>;

    /// Stores the validator and indexes the identity under its resource URI
    /// and linked route patterns.
    async fn put(&self, identity: &CacheIdentity, validator: Validator) -> StoreResult<()>;

    async fn remove_by_identity(&self, identity: &CacheIdentity) -> StoreResult<bool>;

    /// Removes every variant stored for the resource URI. Returns the count.
    async fn remove_by_resource_uri(&self, resource_uri: &str) -> StoreResult<usize>;

    /// Removes every identity linked to the pattern. Returns the count.
    async fn remove_by_route_pattern(&self, pattern: &RoutePattern) -> StoreResult<usize>;

    async fn clear(&self) -> StoreResult<()>;
}

#[async_trait]
impl ResponseStore for Arc<dyn ResponseStore> {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Bytes>> {
        (**self).get(identity).await
    }

    async fn put(&self, identity: &CacheIdentity, value: Bytes) -> StoreResult<()> {
        (**self).put(identity, value).await
    }

    async fn remove(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        (**self).remove(identity).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }
}

#[async_trait]
impl ResponseStore for Box<dyn ResponseStore> {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Bytes>> {
        (**self).get(identity).await
    }

    async fn put(&self, identity: &CacheIdentity, value: Bytes) -> StoreResult<()> {
        (**self).put(identity, value).await
    }

    async fn remove(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        (**self).remove(identity).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }
}

#[async_trait]
impl ValidatorStore for Arc<dyn ValidatorStore> {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Validator>> {
        (**self).get(identity).await
    }

    async fn put(&self, identity: &CacheIdentity, validator: Validator) -> StoreResult<()> {
        (**self).put(identity, validator).await
    }

    async fn remove_by_identity(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        (**self).remove_by_identity(identity).await
    }

    async fn remove_by_resource_uri(&self, resource_uri: &str) -> StoreResult<usize> {
        (**self).remove_by_resource_uri(resource_uri).await
    }

    async fn remove_by_route_pattern(&self, pattern: &RoutePattern) -> StoreResult<usize> {
        (**self).remove_by_route_pattern(pattern).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }
}

#[async_trait]
impl ValidatorStore for Box<dyn ValidatorStore> {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Validator>> {
        (**self).get(identity).await
    }

    async fn put(&self, identity: &CacheIdentity, validator: Validator) -> StoreResult<()> {
        (**self).put(identity, validator).await
    }

    async fn remove_by_identity(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        (**self).remove_by_identity(identity).await
    }

    async fn remove_by_resource_uri(&self, resource_uri: &str) -> StoreResult<usize> {
        (**self).remove_by_resource_uri(resource_uri).await
    }

    async fn remove_by_route_pattern(&self, pattern: &RoutePattern) -> StoreResult<usize> {
        (**self).remove_by_route_pattern(pattern).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }
}
