//! Where the server pipeline gets resource validators from.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use heifer_core::{EntityTag, Validator};
use http::header::{ETAG, LAST_MODIFIED};
use http::{HeaderMap, request};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::headers::{header_date, header_str};

/// Computes the validator of a produced response.
pub trait ValidatorSource: Send + Sync {
    fn validator(&self, headers: &HeaderMap, body: &Bytes) -> Option<Validator>;
}

/// Reads `ETag`, then `Last-Modified`, from the response headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderValidatorSource;

impl ValidatorSource for HeaderValidatorSource {
    fn validator(&self, headers: &HeaderMap, _body: &Bytes) -> Option<Validator> {
        if let Some(raw) = header_str(headers, &ETAG) {
            match raw.parse::<EntityTag>() {
                Ok(tag) => return Some(Validator::etag(tag)),
                Err(error) => debug!(%error, "ignoring malformed ETag"),
            }
        }
        header_date(headers, &LAST_MODIFIED).map(Validator::last_modified)
    }
}

/// Strong entity tag from the base64 SHA-1 digest of the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestValidatorSource;

impl ValidatorSource for DigestValidatorSource {
    fn validator(&self, _headers: &HeaderMap, body: &Bytes) -> Option<Validator> {
        if body.is_empty() {
            return None;
        }
        let digest = STANDARD.encode(Sha1::digest(body));
        Some(Validator::etag(EntityTag::strong(digest)))
    }
}

/// Ordered sources; the first one returning a validator wins.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    sources: Vec<Arc<dyn ValidatorSource>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers first, then optionally the body digest.
    pub fn standard(digest: bool) -> Self {
        let chain = Self::new().with(HeaderValidatorSource);
        if digest {
            chain.with(DigestValidatorSource)
        } else {
            chain
        }
    }

    pub fn with<S: ValidatorSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn validator(&self, headers: &HeaderMap, body: &Bytes) -> Option<Validator> {
        self.sources
            .iter()
            .find_map(|source| source.validator(headers, body))
    }
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("sources", &self.sources.len())
            .finish()
    }
}

/// Looks up a resource's current validator before the handler runs, e.g.
/// from a database timestamp, when the validator store has none.
#[async_trait]
pub trait ValidatorQuery: Send + Sync {
    async fn current(&self, request: &request::Parts) -> Option<Validator>;
}
