//! Cache identity of a cacheable exchange.
//!
//! A [`CacheIdentity`] is computed from three inputs:
//!
//! 1. **URI** - the request URI as sent
//! 2. **Vary values** - request header values selected by the resource's `Vary`
//! 3. **Namespace** - service id + version, or a route pattern
//!
//! The identity's *key material* is `{resource uri}-{vary values joined by '-'}`,
//! where the resource URI is the URI with its query string stripped.
//! Equality and hashing use the key material; [`CacheIdentity::hash`] is the
//! base64-encoded SHA-1 digest of it and is what stores key on.
//!
//! [`CacheIdentity`] wraps its data in an [`Arc`], so clones are cheap.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use smol_str::SmolStr;

use crate::route::RoutePattern;

#[derive(Debug, Clone)]
struct CacheIdentityInner {
    uri: SmolStr,
    resource_uri: SmolStr,
    vary_values: Vec<SmolStr>,
    namespace: SmolStr,
    links: Vec<RoutePattern>,
    key_material: String,
    hash: SmolStr,
    domain: OnceLock<Option<SmolStr>>,
}

/// Content-addressed identity of a cached response variant.
#[derive(Clone, Debug)]
pub struct CacheIdentity {
    inner: Arc<CacheIdentityInner>,
}

impl CacheIdentity {
    /// Builds an identity from the request URI, the selected vary values and a
    /// namespace tag.
    pub fn new(
        uri: impl Into<SmolStr>,
        vary_values: Vec<SmolStr>,
        namespace: impl Into<SmolStr>,
    ) -> Self {
        let uri = uri.into();
        let resource_uri = SmolStr::new(strip_query(&uri));
        let key_material = key_material(&resource_uri, &vary_values);
        let hash = SmolStr::new(STANDARD.encode(Sha1::digest(key_material.as_bytes())));
        CacheIdentity {
            inner: Arc::new(CacheIdentityInner {
                uri,
                resource_uri,
                vary_values,
                namespace: namespace.into(),
                links: Vec::new(),
                key_material,
                hash,
                domain: OnceLock::new(),
            }),
        }
    }

    /// Attaches route patterns this identity must be invalidated under.
    pub fn with_links(mut self, links: Vec<RoutePattern>) -> Self {
        Arc::make_mut(&mut self.inner).links = links;
        self
    }

    /// The URI as sent, query included.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The URI without query string or fragment.
    pub fn resource_uri(&self) -> &str {
        &self.inner.resource_uri
    }

    /// Request header values selected by `Vary`, in header-name order.
    pub fn vary_values(&self) -> &[SmolStr] {
        &self.inner.vary_values
    }

    /// Namespace tag.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Route patterns linked to this identity.
    pub fn links(&self) -> &[RoutePattern] {
        &self.inner.links
    }

    /// Pre-hash string used for equality.
    pub fn key_material(&self) -> &str {
        &self.inner.key_material
    }

    /// Base64 SHA-1 digest of the key material; the storage key.
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    /// Host part of the URI, computed on first access.
    ///
    /// Relative URIs have no domain.
    pub fn domain(&self) -> Option<&str> {
        self.inner
            .domain
            .get_or_init(|| {
                self.inner
                    .uri
                    .parse::<http::Uri>()
                    .ok()
                    .and_then(|uri| uri.host().map(SmolStr::new))
            })
            .as_deref()
    }
}

fn strip_query(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}

fn key_material(uri: &str, vary_values: &[SmolStr]) -> String {
    let mut material = String::with_capacity(
        uri.len() + vary_values.iter().map(|v| v.len() + 1).sum::<usize>(),
    );
    material.push_str(uri);
    material.push('-');
    for (index, value) in vary_values.iter().enumerate() {
        if index > 0 {
            material.push('-');
        }
        material.push_str(value);
    }
    material
}

impl PartialEq for CacheIdentity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || self.inner.key_material == other.inner.key_material
    }
}

impl Eq for CacheIdentity {}

impl Hash for CacheIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.key_material.hash(state);
    }
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.key_material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn identity(uri: &str, vary: &[&str]) -> CacheIdentity {
        CacheIdentity::new(uri, vary.iter().map(|v| SmolStr::new(*v)).collect(), "ns")
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = identity("/api/cars/1", &["application/json"]);
        let b = identity("/api/cars/1", &["application/json"]);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_vary_values_separate_variants() {
        let json = identity("/api/cars/1", &["application/json"]);
        let xml = identity("/api/cars/1", &["application/xml"]);
        assert_ne!(json, xml);
        assert_ne!(json.hash(), xml.hash());
        assert_eq!(json.resource_uri(), xml.resource_uri());
    }

    #[test]
    fn test_query_is_stripped_from_key() {
        let page1 = identity("/api/cars?page=1", &["application/json"]);
        let page2 = identity("/api/cars?page=2", &["application/json"]);
        assert_eq!(page1, page2);
        assert_eq!(page1.hash(), page2.hash());
        assert_eq!(page1.uri(), "/api/cars?page=1");
        assert_eq!(page1.resource_uri(), "/api/cars");
        assert_eq!(page1.key_material(), "/api/cars-application/json");
    }

    #[test]
    fn test_hash_is_base64_sha1() {
        let id = identity("/a", &["b"]);
        let expected = STANDARD.encode(Sha1::digest(b"/a-b"));
        assert_eq!(id.hash(), expected);
        assert_eq!(id.hash().len(), 28);
    }

    #[test]
    fn test_namespace_does_not_affect_equality() {
        let a = CacheIdentity::new("/x", vec![], "svc/v1");
        let b = CacheIdentity::new("/x", vec![], "svc/v2");
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_domain_of_relative_uri() {
        assert_eq!(identity("/api/cars", &[]).domain(), None);
        assert_eq!(
            identity("http://localhost:8080/api", &[]).domain(),
            Some("localhost")
        );
    }

    #[test]
    fn test_links_are_kept_on_clone() {
        let id = identity("/api/cars/1", &[]).with_links(vec![RoutePattern::new("/api/cars/+")]);
        let copy = id.clone();
        assert_eq!(copy.links(), &[RoutePattern::new("/api/cars/+")]);
    }
}
