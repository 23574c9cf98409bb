//! Building cache identities from HTTP requests.

use std::sync::Arc;

use dashmap::DashMap;
use heifer_core::{CacheIdentity, SmolStr};
use http::header::{HeaderName, VARY};
use http::HeaderMap;
use tracing::warn;

/// Value of a response's `Vary` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaryHeader {
    /// `Vary: *`; the response cannot be reused.
    Any,
    /// Request headers selecting the variant, in advertised order.
    Names(Vec<HeaderName>),
}

impl VaryHeader {
    /// Parses every `Vary` value of the map. An absent header varies on
    /// nothing.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut names = Vec::new();
        for value in headers.get_all(VARY) {
            let Ok(value) = value.to_str() else {
                warn!("non-visible characters in Vary, skipping value");
                continue;
            };
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "*" {
                    return VaryHeader::Any;
                }
                match HeaderName::try_from(name) {
                    Ok(name) if !names.contains(&name) => names.push(name),
                    Ok(_) => {}
                    Err(_) => warn!(name, "invalid header name in Vary, skipping"),
                }
            }
        }
        VaryHeader::Names(names)
    }
}

/// Vary header set advertised per resource URI.
///
/// Consulted when building identities for reads. URIs that never advertised
/// `Vary` use the default set.
#[derive(Debug)]
pub struct VaryTable {
    default: Arc<[HeaderName]>,
    entries: DashMap<SmolStr, Arc<[HeaderName]>>,
}

impl VaryTable {
    pub fn new(default: Vec<HeaderName>) -> Self {
        Self {
            default: default.into(),
            entries: DashMap::new(),
        }
    }

    /// Builds a table from header name strings, skipping invalid names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let names = names
            .iter()
            .filter_map(|name| match HeaderName::try_from(name.as_ref()) {
                Ok(name) => Some(name),
                Err(_) => {
                    warn!(name = name.as_ref(), "invalid default vary header, skipping");
                    None
                }
            })
            .collect();
        Self::new(names)
    }

    /// Header set for the resource URI, falling back to the default.
    pub fn resolve(&self, resource_uri: &str) -> Arc<[HeaderName]> {
        self.entries
            .get(resource_uri)
            .map(|names| names.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    /// Whether the resource URI has advertised a set.
    pub fn is_known(&self, resource_uri: &str) -> bool {
        self.entries.contains_key(resource_uri)
    }

    /// Records the set advertised by an origin response.
    pub fn record(&self, resource_uri: &str, names: Vec<HeaderName>) {
        self.entries.insert(SmolStr::new(resource_uri), names.into());
    }

    pub fn forget(&self, resource_uri: &str) {
        self.entries.remove(resource_uri);
    }
}

impl Default for VaryTable {
    fn default() -> Self {
        Self::new(vec![http::header::ACCEPT])
    }
}

/// Request header values selected by `vary`, multi-valued headers joined
/// with `", "` and absent headers as empty strings.
pub fn vary_values(headers: &HeaderMap, vary: &[HeaderName]) -> Vec<SmolStr> {
    vary.iter()
        .map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            SmolStr::new(values.join(", "))
        })
        .collect()
}

/// Builds the identity of a request.
pub fn build_identity(
    uri: &str,
    headers: &HeaderMap,
    vary: &[HeaderName],
    namespace: &str,
) -> CacheIdentity {
    CacheIdentity::new(uri, vary_values(headers, vary), namespace)
}

/// Like [`build_identity`], but a non-empty query string is appended to the
/// selected values as `?{query}`, so `/api/cars?page=1` and
/// `/api/cars?page=2` are stored apart while still sharing their resource
/// URI for invalidation.
pub fn build_query_identity(
    uri: &str,
    headers: &HeaderMap,
    vary: &[HeaderName],
    namespace: &str,
) -> CacheIdentity {
    let mut values = vary_values(headers, vary);
    if let Some(query) = query(uri) {
        values.push(SmolStr::new(format!("?{query}")));
    }
    CacheIdentity::new(uri, values, namespace)
}

/// Picks [`build_query_identity`] or [`build_identity`].
pub fn request_identity(
    uri: &str,
    headers: &HeaderMap,
    vary: &[HeaderName],
    namespace: &str,
    query_variants: bool,
) -> CacheIdentity {
    if query_variants {
        build_query_identity(uri, headers, vary, namespace)
    } else {
        build_identity(uri, headers, vary, namespace)
    }
}

fn query(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once('?')?;
    let query = rest.split_once('#').map_or(rest, |(query, _)| query);
    (!query.is_empty()).then_some(query)
}

/// Resource URI (no query) of a request URI.
pub fn resource_uri(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}
