//! Handler side: conditional pre-check, validator post-check and
//! invalidation after mutations.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use heifer::{CacheError, ServerPolicy, metrics};
use heifer_backend::ValidatorStore;
use heifer_core::{CacheIdentity, RoutePattern, Validator};
use http::header::{
    CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderName, LAST_MODIFIED, LOCATION, VARY,
};
use http::{HeaderMap, Method, Response, StatusCode, Uri, request, response};
use tracing::{debug, warn};

use super::{absorb, status_response};
use crate::conditional::{Precondition, Verdict, check, classify, is_mutation, is_read};
use crate::headers::{header_str, set_date_header, set_header};
use crate::identity::{request_identity, resource_uri};
use crate::route::{RestfulPatternProvider, RoutePatternProvider};
use crate::validator_source::{ValidatorChain, ValidatorQuery};

/// State carried from [`ServerPipeline::before`] to [`ServerPipeline::after`].
#[derive(Debug, Clone)]
pub struct ServerExchange {
    identity: CacheIdentity,
    method: Method,
    precondition: Precondition,
}

impl ServerExchange {
    /// Whether `after` needs the buffered response body.
    pub fn needs_body(&self) -> bool {
        self.method == Method::GET
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    pub fn precondition(&self) -> &Precondition {
        &self.precondition
    }
}

/// Whether to run the handler.
#[derive(Debug)]
pub enum ServerBefore {
    /// Answer without running the handler (`304`, `400` or `412`).
    Respond(Response<Bytes>),
    /// Run the handler.
    Proceed(ServerExchange),
}

/// Server-side conditional request pipeline.
#[derive(Clone)]
pub struct ServerPipeline {
    policy: ServerPolicy,
    validators: Arc<dyn ValidatorStore>,
    routes: Arc<dyn RoutePatternProvider>,
    sources: ValidatorChain,
    query: Option<Arc<dyn ValidatorQuery>>,
    vary: Vec<HeaderName>,
}

impl ServerPipeline {
    pub fn new(policy: ServerPolicy, validators: Arc<dyn ValidatorStore>) -> Self {
        let sources = ValidatorChain::standard(policy.digest_etag);
        let vary = policy
            .vary
            .iter()
            .filter_map(|name| match HeaderName::try_from(name.as_str()) {
                Ok(name) => Some(name),
                Err(_) => {
                    warn!(name = name.as_str(), "invalid vary header in server policy, skipping");
                    None
                }
            })
            .collect();
        Self {
            policy,
            validators,
            routes: Arc::new(RestfulPatternProvider),
            sources,
            query: None,
            vary,
        }
    }

    pub fn with_routes(self, routes: Arc<dyn RoutePatternProvider>) -> Self {
        Self { routes, ..self }
    }

    pub fn with_sources(self, sources: ValidatorChain) -> Self {
        Self { sources, ..self }
    }

    pub fn with_query(self, query: Arc<dyn ValidatorQuery>) -> Self {
        Self {
            query: Some(query),
            ..self
        }
    }

    pub fn policy(&self) -> &ServerPolicy {
        &self.policy
    }

    fn identity(&self, parts: &request::Parts) -> CacheIdentity {
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        request_identity(
            uri,
            &parts.headers,
            &self.vary,
            &self.policy.namespace,
            self.policy.query_variants,
        )
        .with_links(self.routes.links(parts.uri.path()))
    }

    async fn current(
        &self,
        identity: &CacheIdentity,
        parts: &request::Parts,
    ) -> Result<Option<Validator>, CacheError> {
        let stored = absorb(
            self.policy.store_errors,
            "get",
            self.validators.get(identity).await,
        )?;
        if stored.is_some() {
            return Ok(stored);
        }
        Ok(match &self.query {
            Some(query) => query.current(parts).await,
            None => None,
        })
    }

    /// Runs before the handler.
    ///
    /// Contradictory conditional headers are answered with `400` without
    /// touching the store.
    pub async fn before(&self, parts: &request::Parts) -> Result<ServerBefore, CacheError> {
        let precondition = match classify(&parts.method, &parts.headers) {
            Ok(precondition) => precondition,
            Err(conflict) => {
                debug!(uri = %parts.uri, %conflict, "contradictory conditional headers");
                metrics::record_server_short_circuit(StatusCode::BAD_REQUEST.as_u16());
                return Ok(ServerBefore::Respond(status_response(StatusCode::BAD_REQUEST)));
            }
        };
        let identity = self.identity(parts);

        if precondition != Precondition::None {
            let current = self.current(&identity, parts).await?;
            let verdict = check(&precondition, current.as_ref());
            debug!(
                identity = %identity,
                kind = precondition.kind().as_str(),
                ?verdict,
                "conditional pre-check"
            );
            match verdict {
                Verdict::Continue => {}
                Verdict::NotModified => {
                    metrics::record_server_short_circuit(StatusCode::NOT_MODIFIED.as_u16());
                    let mut response = status_response(StatusCode::NOT_MODIFIED);
                    if let Some(current) = &current {
                        self.advertise(response.headers_mut(), current);
                    }
                    return Ok(ServerBefore::Respond(response));
                }
                Verdict::PreconditionFailed => {
                    metrics::record_server_short_circuit(StatusCode::PRECONDITION_FAILED.as_u16());
                    return Ok(ServerBefore::Respond(status_response(
                        StatusCode::PRECONDITION_FAILED,
                    )));
                }
            }
        }

        Ok(ServerBefore::Proceed(ServerExchange {
            identity,
            method: parts.method.clone(),
            precondition,
        }))
    }

    /// Runs after the handler with the buffered response.
    ///
    /// A successful `GET` gets its validator persisted and advertised, and is
    /// turned into a `304` when the new validator satisfies the request's
    /// `If-None-Match` / `If-Modified-Since`. A successful mutation
    /// invalidates the resource.
    pub async fn after(
        &self,
        exchange: ServerExchange,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, CacheError> {
        if !response.status().is_success() {
            return Ok(response);
        }
        if !is_read(&exchange.method) {
            let (mut parts, body) = response.into_parts();
            self.after_unbuffered(exchange, &mut parts).await?;
            return Ok(Response::from_parts(parts, body));
        }

        let (mut parts, body) = response.into_parts();
        let Some(validator) = self.sources.validator(&parts.headers, &body) else {
            debug!(identity = %exchange.identity, "no validator for response");
            return Ok(Response::from_parts(parts, body));
        };
        absorb(
            self.policy.store_errors,
            "put",
            self.validators
                .put(&exchange.identity, validator.clone())
                .await,
        )?;
        self.advertise(&mut parts.headers, &validator);

        if check(&exchange.precondition, Some(&validator)) == Verdict::NotModified {
            debug!(identity = %exchange.identity, "late validation matched");
            metrics::record_server_short_circuit(StatusCode::NOT_MODIFIED.as_u16());
            parts.status = StatusCode::NOT_MODIFIED;
            parts.headers.remove(CONTENT_LENGTH);
            parts.headers.remove(CONTENT_TYPE);
            return Ok(Response::from_parts(parts, Bytes::new()));
        }
        Ok(Response::from_parts(parts, body))
    }

    /// Runs after the handler when the body was not buffered.
    ///
    /// Only mutations have work to do here: a successful one removes every
    /// variant stored under the resource URI and the route patterns it
    /// invalidates, and for `POST` with `Location` the same for the created
    /// resource and its collection.
    pub async fn after_unbuffered(
        &self,
        exchange: ServerExchange,
        parts: &mut response::Parts,
    ) -> Result<(), CacheError> {
        if !parts.status.is_success() || !is_mutation(&exchange.method) {
            return Ok(());
        }

        let path = exchange.identity.resource_uri();
        let mut removed = self.invalidate_resource(path).await?;
        for pattern in self.routes.invalidations(path) {
            removed += self.invalidate_pattern(&pattern).await?;
        }

        if exchange.method == Method::POST
            && let Some(location) = header_str(&parts.headers, &LOCATION).map(location_path)
        {
            removed += self.invalidate_resource(&location).await?;
            if let Some(collection) = self.routes.collection_of(&location) {
                removed += self.invalidate_pattern(&collection).await?;
            }
        }

        debug!(resource = path, removed, "invalidated after mutation");
        Ok(())
    }

    async fn invalidate_resource(&self, resource: &str) -> Result<usize, CacheError> {
        let removed = absorb(
            self.policy.store_errors,
            "remove_by_resource_uri",
            self.validators.remove_by_resource_uri(resource).await,
        )?;
        metrics::record_invalidation("resource", removed);
        Ok(removed)
    }

    async fn invalidate_pattern(&self, pattern: &RoutePattern) -> Result<usize, CacheError> {
        let removed = absorb(
            self.policy.store_errors,
            "remove_by_route_pattern",
            self.validators.remove_by_route_pattern(pattern).await,
        )?;
        metrics::record_invalidation("pattern", removed);
        Ok(removed)
    }

    /// Sets validator, `Cache-Control` and `Vary` headers the handler left
    /// unset.
    fn advertise(&self, headers: &mut HeaderMap, validator: &Validator) {
        match validator {
            Validator::ETag(tag) if !headers.contains_key(ETAG) => {
                set_header(headers, ETAG, &tag.to_string());
            }
            Validator::LastModified(modified) if !headers.contains_key(LAST_MODIFIED) => {
                set_date_header(headers, LAST_MODIFIED, *modified);
            }
            _ => {}
        }
        if !headers.contains_key(CACHE_CONTROL) {
            set_header(headers, CACHE_CONTROL, &self.policy.cache_control());
        }
        if !headers.contains_key(VARY) && !self.vary.is_empty() {
            let vary: Vec<&str> = self.vary.iter().map(HeaderName::as_str).collect();
            set_header(headers, VARY, &vary.join(", "));
        }
    }
}

impl fmt::Debug for ServerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPipeline")
            .field("policy", &self.policy)
            .field("sources", &self.sources)
            .field("query", &self.query.is_some())
            .finish()
    }
}

/// Path of a `Location` value, which may be absolute or relative.
fn location_path(location: &str) -> String {
    match location.parse::<Uri>() {
        Ok(uri) => uri.path().to_owned(),
        Err(_) => resource_uri(location).to_owned(),
    }
}
