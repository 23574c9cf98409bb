//! Simple in-memory validator store for testing using DashMap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use heifer_backend::{InvalidationIndex, StoreError, StoreResult, ValidatorStore};
use heifer_core::{CacheIdentity, RoutePattern, Validator};

/// Thread-safe, cheaply clonable validator store.
#[derive(Clone, Default)]
pub struct TestValidatorStore {
    validators: Arc<DashMap<CacheIdentity, Validator>>,
    index: Arc<InvalidationIndex>,
    failing: Arc<AtomicBool>,
}

impl TestValidatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Makes every subsequent operation fail with a connection error.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(Box::new(std::io::Error::other(
                "store is down",
            ))));
        }
        Ok(())
    }

    fn drop_all(&self, identities: Vec<CacheIdentity>) -> usize {
        identities
            .iter()
            .filter(|identity| self.validators.remove(*identity).is_some())
            .count()
    }
}

#[async_trait]
impl ValidatorStore for TestValidatorStore {
    async fn get(&self, identity: &CacheIdentity) -> StoreResult<Option<Validator>> {
        self.check()?;
        Ok(self.validators.get(identity).map(|v| v.clone()))
    }

    async fn put(&self, identity: &CacheIdentity, validator: Validator) -> StoreResult<()> {
        self.check()?;
        self.validators.insert(identity.clone(), validator);
        self.index.register(identity);
        Ok(())
    }

    async fn remove_by_identity(&self, identity: &CacheIdentity) -> StoreResult<bool> {
        self.check()?;
        self.index.forget(identity);
        Ok(self.validators.remove(identity).is_some())
    }

    async fn remove_by_resource_uri(&self, resource_uri: &str) -> StoreResult<usize> {
        self.check()?;
        Ok(self.drop_all(self.index.take_resource(resource_uri)))
    }

    async fn remove_by_route_pattern(&self, pattern: &RoutePattern) -> StoreResult<usize> {
        self.check()?;
        Ok(self.drop_all(self.index.take_pattern(pattern)))
    }

    async fn clear(&self) -> StoreResult<()> {
        self.check()?;
        self.validators.clear();
        self.index.clear();
        Ok(())
    }
}
