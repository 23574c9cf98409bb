//! Resource URI and route pattern index over stored identities.

use std::collections::HashSet;

use dashmap::DashMap;
use heifer_core::{CacheIdentity, RoutePattern};
use smol_str::SmolStr;

/// Maps resource URIs and route patterns to the identities stored under them.
///
/// Each map is locked per shard and no guard is held while the other map is
/// touched, so concurrent registration and invalidation cannot deadlock.
#[derive(Debug, Default)]
pub struct InvalidationIndex {
    by_resource: DashMap<SmolStr, HashSet<CacheIdentity>>,
    by_pattern: DashMap<RoutePattern, HashSet<CacheIdentity>>,
}

impl InvalidationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the identity under its resource URI and every linked pattern.
    pub fn register(&self, identity: &CacheIdentity) {
        self.by_resource
            .entry(SmolStr::new(identity.resource_uri()))
            .or_default()
            .replace(identity.clone());
        for link in identity.links() {
            self.by_pattern
                .entry(link.clone())
                .or_default()
                .replace(identity.clone());
        }
    }

    /// Removes and returns every identity stored under the resource URI.
    pub fn take_resource(&self, resource_uri: &str) -> Vec<CacheIdentity> {
        let Some((_, identities)) = self.by_resource.remove(resource_uri) else {
            return Vec::new();
        };
        for identity in &identities {
            for link in identity.links() {
                Self::unlink(&self.by_pattern, link, identity);
            }
        }
        identities.into_iter().collect()
    }

    /// Removes and returns every identity linked to the pattern.
    pub fn take_pattern(&self, pattern: &RoutePattern) -> Vec<CacheIdentity> {
        let Some((_, identities)) = self.by_pattern.remove(pattern) else {
            return Vec::new();
        };
        for identity in &identities {
            Self::unlink(&self.by_resource, identity.resource_uri(), identity);
            for link in identity.links().iter().filter(|link| *link != pattern) {
                Self::unlink(&self.by_pattern, link, identity);
            }
        }
        identities.into_iter().collect()
    }

    /// Drops a single identity from every index entry.
    pub fn forget(&self, identity: &CacheIdentity) {
        Self::unlink(&self.by_resource, identity.resource_uri(), identity);
        for link in identity.links() {
            Self::unlink(&self.by_pattern, link, identity);
        }
    }

    /// Number of distinct resource URIs indexed.
    pub fn resources(&self) -> usize {
        self.by_resource.len()
    }

    /// Number of distinct patterns indexed.
    pub fn patterns(&self) -> usize {
        self.by_pattern.len()
    }

    pub fn clear(&self) {
        self.by_resource.clear();
        self.by_pattern.clear();
    }

    fn unlink<K, Q>(map: &DashMap<K, HashSet<CacheIdentity>>, key: &Q, identity: &CacheIdentity)
    where
        K: std::borrow::Borrow<Q> + Eq + std::hash::Hash,
        Q: Eq + std::hash::Hash + ?Sized,
    {
        let now_empty = match map.get_mut(key) {
            Some(mut identities) => {
                identities.remove(identity);
                identities.is_empty()
            }
            None => false,
        };
        if now_empty {
            map.remove_if(key, |_, identities| identities.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uri: &str, links: &[&str]) -> CacheIdentity {
        CacheIdentity::new(uri, vec![], "test")
            .with_links(links.iter().map(|l| RoutePattern::new(*l)).collect())
    }

    #[test]
    fn test_take_resource_unlinks_patterns() {
        let index = InvalidationIndex::new();
        let car = identity("/api/cars/1", &["/api/cars/+"]);
        index.register(&car);

        assert_eq!(index.take_resource("/api/cars/1"), vec![car]);
        assert_eq!(index.resources(), 0);
        assert_eq!(index.patterns(), 0);
    }

    #[test]
    fn test_forget_keeps_siblings() {
        let index = InvalidationIndex::new();
        let one = identity("/api/cars/1", &["/api/cars/+"]);
        let two = identity("/api/cars/2", &["/api/cars/+"]);
        index.register(&one);
        index.register(&two);

        index.forget(&one);
        assert_eq!(index.take_pattern(&RoutePattern::new("/api/cars/+")), vec![two]);
    }
}
