//! Outgoing-call side: serve from the store, revalidate, or forward.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use heifer::{CacheError, ClientPolicy, metrics};
use heifer_backend::ResponseStore;
use heifer_core::{CacheIdentity, Diagnostic, FreshnessOutcome};
use http::header::{
    AGE, CACHE_CONTROL, DATE, ETAG, EXPIRES, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, LOCATION, RANGE,
};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri, request};
use tracing::{debug, warn};

use super::absorb;
use crate::freshness::{evaluate, expiry, staleness_acceptable};
use crate::headers::{
    CacheControl, DIAGNOSTIC_HEADER, age, header_date, header_str, pragma_no_cache, set_date_header,
    set_header,
};
use crate::identity::{VaryHeader, VaryTable, request_identity, resource_uri};
use crate::stored::StoredResponse;

/// Outcome of a request rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Forward without reading or writing the store.
    Bypass,
    /// Forward, then drop cached variants of the URI if the call succeeds.
    Invalidate,
}

/// A rule inspecting the outgoing request. The first rule returning a
/// decision wins; when none does the request goes through the cache.
pub type RequestRule = Arc<dyn Fn(&request::Parts) -> Option<RequestDecision> + Send + Sync>;

fn default_rules() -> Vec<RequestRule> {
    vec![
        Arc::new(|parts: &request::Parts| {
            (parts.method != Method::GET && parts.method != Method::HEAD)
                .then_some(RequestDecision::Invalidate)
        }),
        Arc::new(|parts: &request::Parts| {
            (parts.method == Method::HEAD).then_some(RequestDecision::Bypass)
        }),
        Arc::new(|parts: &request::Parts| {
            CacheControl::from_headers(&parts.headers)
                .is_some_and(|cc| cc.no_store)
                .then_some(RequestDecision::Bypass)
        }),
        Arc::new(|parts: &request::Parts| {
            parts
                .headers
                .contains_key(RANGE)
                .then_some(RequestDecision::Bypass)
        }),
        // The caller is running its own conditional request.
        Arc::new(|parts: &request::Parts| {
            (parts.headers.contains_key(IF_NONE_MATCH) || parts.headers.contains_key(IF_MODIFIED_SINCE))
                .then_some(RequestDecision::Bypass)
        }),
    ]
}

#[derive(Debug)]
enum Mode {
    Cached {
        identity: CacheIdentity,
        cached: Option<StoredResponse>,
    },
    Bypass,
    Invalidate,
}

/// State carried from [`ClientPipeline::before`] to [`ClientPipeline::after`].
#[derive(Debug)]
pub struct ClientExchange {
    mode: Mode,
    uri: Uri,
    method: Method,
    request_headers: HeaderMap,
    diagnostic: Diagnostic,
}

impl ClientExchange {
    /// Whether `after` needs the buffered response body. When `false` the
    /// adapter may stream the body and call
    /// [`ClientPipeline::after_passthrough`] instead.
    pub fn needs_body(&self) -> bool {
        matches!(self.mode, Mode::Cached { .. })
    }

    /// Diagnostic record so far.
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }
}

/// What to do with the outgoing request.
#[derive(Debug)]
pub enum ClientBefore {
    /// Serve this response without calling the origin.
    Respond(Response<Bytes>),
    /// Call the origin with the (possibly amended) request.
    Forward(ClientExchange),
}

/// Client-side cache pipeline.
#[derive(Clone)]
pub struct ClientPipeline {
    policy: ClientPolicy,
    responses: Arc<dyn ResponseStore>,
    vary: Arc<VaryTable>,
    rules: Vec<RequestRule>,
}

impl ClientPipeline {
    pub fn new(policy: ClientPolicy, responses: Arc<dyn ResponseStore>) -> Self {
        let vary = Arc::new(VaryTable::from_names(&policy.default_vary));
        Self {
            policy,
            responses,
            vary,
            rules: default_rules(),
        }
    }

    /// Replaces the request rules.
    pub fn with_rules(self, rules: Vec<RequestRule>) -> Self {
        Self { rules, ..self }
    }

    /// Adds a rule evaluated before the existing ones.
    pub fn with_rule(mut self, rule: RequestRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Shares a vary table, e.g. between several pipelines over one store.
    pub fn with_vary_table(self, vary: Arc<VaryTable>) -> Self {
        Self { vary, ..self }
    }

    pub fn policy(&self) -> &ClientPolicy {
        &self.policy
    }

    pub fn vary_table(&self) -> &Arc<VaryTable> {
        &self.vary
    }

    fn decide(&self, parts: &request::Parts) -> Option<RequestDecision> {
        self.rules.iter().find_map(|rule| rule(parts))
    }

    fn identity(&self, uri: &str, headers: &HeaderMap) -> CacheIdentity {
        let vary = self.vary.resolve(resource_uri(uri));
        request_identity(
            uri,
            headers,
            &vary,
            &self.policy.namespace,
            self.policy.query_variants,
        )
    }

    async fn load(&self, identity: &CacheIdentity) -> Result<Option<StoredResponse>, CacheError> {
        let bytes = absorb(
            self.policy.store_errors,
            "get",
            self.responses.get(identity).await,
        )?;
        Ok(bytes.and_then(|bytes| match StoredResponse::decode(&bytes) {
            Ok(stored) => Some(stored),
            Err(error) => {
                warn!(identity = %identity, %error, "stored response is unreadable, treating as absent");
                None
            }
        }))
    }

    async fn store(&self, identity: &CacheIdentity, stored: &StoredResponse) -> Result<(), CacheError> {
        let encoded = match stored.encode() {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(identity = %identity, %error, "response cannot be encoded, not storing");
                return Ok(());
            }
        };
        absorb(
            self.policy.store_errors,
            "put",
            self.responses.put(identity, encoded).await,
        )
    }

    async fn purge(&self, identity: &CacheIdentity) -> Result<bool, CacheError> {
        absorb(
            self.policy.store_errors,
            "remove",
            self.responses.remove(identity).await,
        )
    }

    /// Runs before the origin call.
    ///
    /// May add `If-None-Match` / `If-Modified-Since` to `parts` when a stored
    /// entry needs revalidation.
    pub async fn before(&self, parts: &mut request::Parts) -> Result<ClientBefore, CacheError> {
        let mut exchange = ClientExchange {
            mode: Mode::Bypass,
            uri: parts.uri.clone(),
            method: parts.method.clone(),
            request_headers: parts.headers.clone(),
            diagnostic: Diagnostic::default(),
        };

        if let Some(decision) = self.decide(parts) {
            debug!(uri = %parts.uri, ?decision, "request rule matched");
            exchange.mode = match decision {
                RequestDecision::Bypass => Mode::Bypass,
                RequestDecision::Invalidate => Mode::Invalidate,
            };
            return Ok(ClientBefore::Forward(exchange));
        }

        let uri = parts.uri.to_string();
        let identity = self.identity(&uri, &parts.headers);
        let Some(mut stored) = self.load(&identity).await? else {
            debug!(identity = %identity, "nothing stored");
            exchange.diagnostic.did_not_exist = Some(true);
            exchange.mode = Mode::Cached {
                identity,
                cached: None,
            };
            return Ok(ClientBefore::Forward(exchange));
        };
        exchange.diagnostic.did_not_exist = Some(false);

        let now = Utc::now();
        let outcome = evaluate(
            &mut stored.headers,
            stored.status,
            !stored.body.is_empty(),
            self.policy.revalidate_by_default,
            now,
        );
        let request_cc = CacheControl::from_headers(&parts.headers).unwrap_or_default();
        let forced = request_cc.no_cache || pragma_no_cache(&parts.headers);
        let expires_at = stored_expiry(&stored.headers);
        debug!(identity = %identity, %outcome, forced, "evaluated stored response");

        let serve = match outcome {
            FreshnessOutcome::Ok => {
                exchange.diagnostic.was_stale = Some(false);
                !forced
            }
            FreshnessOutcome::Stale => {
                exchange.diagnostic.was_stale = Some(true);
                !forced
                    && expires_at.is_some_and(|(expires_at, date)| {
                        let advertised = age(&stored.headers).unwrap_or_default();
                        staleness_acceptable(&request_cc, expires_at, date, advertised, now)
                    })
            }
            FreshnessOutcome::MustRevalidate => {
                exchange.diagnostic.was_stale =
                    Some(expires_at.is_some_and(|(expires_at, _)| expires_at <= now));
                false
            }
            _ => {
                debug!(identity = %identity, "stored response is not cacheable, purging");
                self.purge(&identity).await?;
                exchange.diagnostic.not_cacheable = Some(true);
                exchange.mode = Mode::Cached {
                    identity,
                    cached: None,
                };
                return Ok(ClientBefore::Forward(exchange));
            }
        };

        if serve {
            exchange.diagnostic.retrieved_from_cache = Some(true);
            metrics::record_client_outcome(outcome.as_str(), true);
            let mut response = stored.into_response();
            self.attach(&exchange.diagnostic, response.headers_mut());
            return Ok(ClientBefore::Respond(response));
        }

        if add_validation_headers(&stored.headers, &mut parts.headers) {
            exchange.diagnostic.cache_validation_applied = Some(true);
        }
        exchange.mode = Mode::Cached {
            identity,
            cached: Some(stored),
        };
        Ok(ClientBefore::Forward(exchange))
    }

    /// Runs after the origin call with the buffered response.
    pub async fn after(
        &self,
        exchange: ClientExchange,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, CacheError> {
        let ClientExchange {
            mode,
            uri,
            method,
            request_headers,
            mut diagnostic,
        } = exchange;
        let (identity, cached) = match mode {
            Mode::Cached { identity, cached } => (identity, cached),
            mode => {
                let (mut parts, body) = response.into_parts();
                let passthrough = ClientExchange {
                    mode,
                    uri,
                    method,
                    request_headers,
                    diagnostic,
                };
                self.after_passthrough(passthrough, parts.status, &mut parts.headers)
                    .await?;
                return Ok(Response::from_parts(parts, body));
            }
        };
        let now = Utc::now();

        if response.status() == StatusCode::NOT_MODIFIED
            && let Some(mut cached) = cached
        {
            merge_not_modified(&mut cached.headers, response.headers(), now);
            self.store(&identity, &cached).await?;
            diagnostic.retrieved_from_cache = Some(true);
            metrics::record_client_outcome("revalidated", true);
            debug!(identity = %identity, "revalidated stored response");
            let mut response = cached.into_response();
            self.attach(&diagnostic, response.headers_mut());
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();
        let uri = uri.to_string();
        let resource = resource_uri(&uri);
        let outcome = match VaryHeader::from_headers(&parts.headers) {
            VaryHeader::Any => {
                debug!(identity = %identity, "response varies on everything");
                self.purge(&identity).await?;
                FreshnessOutcome::NotCacheable
            }
            VaryHeader::Names(names) => {
                let write_identity = request_identity(
                    &uri,
                    &request_headers,
                    &names,
                    &self.policy.namespace,
                    self.policy.query_variants,
                );
                let outcome = evaluate(
                    &mut parts.headers,
                    parts.status,
                    !body.is_empty(),
                    self.policy.revalidate_by_default,
                    now,
                );
                if outcome.is_storable() {
                    self.vary.record(resource, names);
                    let stored = StoredResponse::new(parts.status, parts.headers.clone(), body.clone());
                    self.store(&write_identity, &stored).await?;
                    debug!(identity = %write_identity, %outcome, "stored response");
                } else {
                    self.purge(&identity).await?;
                    if write_identity != identity {
                        self.purge(&write_identity).await?;
                    }
                }
                outcome
            }
        };

        if !outcome.is_storable() {
            diagnostic.not_cacheable = Some(true);
        }
        diagnostic.retrieved_from_cache = Some(false);
        metrics::record_client_outcome(outcome.as_str(), false);
        self.attach(&diagnostic, &mut parts.headers);
        Ok(Response::from_parts(parts, body))
    }

    /// Runs after the origin call when the body was not buffered.
    ///
    /// A successful call under [`RequestDecision::Invalidate`] drops the
    /// cached variant of the request URI and, for `POST` with `Location`, of
    /// the location.
    pub async fn after_passthrough(
        &self,
        exchange: ClientExchange,
        status: StatusCode,
        headers: &mut HeaderMap,
    ) -> Result<(), CacheError> {
        if !matches!(exchange.mode, Mode::Invalidate)
            || !status.is_success()
            || !self.policy.invalidate_on_mutation
        {
            return Ok(());
        }

        let uri = exchange.uri.to_string();
        let mut removed = usize::from(
            self.purge(&self.identity(&uri, &exchange.request_headers))
                .await?,
        );
        if exchange.method == Method::POST
            && let Some(location) = header_str(headers, &LOCATION)
        {
            let location = absolute_location(&exchange.uri, location);
            removed += usize::from(
                self.purge(&self.identity(&location, &exchange.request_headers))
                    .await?,
            );
        }
        debug!(uri = %uri, removed, "invalidated after mutation");
        metrics::record_invalidation("client", removed);
        Ok(())
    }

    fn attach(&self, diagnostic: &Diagnostic, headers: &mut HeaderMap) {
        if self.policy.diagnostic_header {
            set_header(headers, DIAGNOSTIC_HEADER, &diagnostic.to_string());
        }
    }
}

impl fmt::Debug for ClientPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPipeline")
            .field("policy", &self.policy)
            .field("vary", &self.vary)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Expiry and `Date` of a stored response.
fn stored_expiry(headers: &HeaderMap) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let cache_control = CacheControl::from_headers(headers)?;
    let date = header_date(headers, &DATE)?;
    expiry(headers, &cache_control, date).map(|expires_at| (expires_at, date))
}

/// Copies the stored validator onto the outgoing request. Returns whether one
/// was added.
fn add_validation_headers(stored: &HeaderMap, request: &mut HeaderMap) -> bool {
    if let Some(etag) = stored.get(ETAG) {
        request.insert(IF_NONE_MATCH, etag.clone());
        return true;
    }
    if let Some(last_modified) = stored.get(LAST_MODIFIED) {
        request.insert(IF_MODIFIED_SINCE, last_modified.clone());
        return true;
    }
    false
}

/// Refreshes a stored entry from a `304 Not Modified`.
fn merge_not_modified(stored: &mut HeaderMap, not_modified: &HeaderMap, now: DateTime<Utc>) {
    for name in [CACHE_CONTROL, EXPIRES, ETAG, LAST_MODIFIED] {
        let values: Vec<HeaderValue> = not_modified.get_all(&name).iter().cloned().collect();
        if values.is_empty() {
            continue;
        }
        stored.remove(&name);
        for value in values {
            stored.append(name.clone(), value);
        }
    }
    stored.remove(AGE);
    set_date_header(stored, DATE, now);
}

/// Resolves a `Location` against the request URI.
fn absolute_location(request: &Uri, location: &str) -> String {
    if !location.starts_with('/') {
        return location.to_owned();
    }
    match (request.scheme_str(), request.authority()) {
        (Some(scheme), Some(authority)) => format!("{scheme}://{authority}{location}"),
        _ => location.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_resolution() {
        let request: Uri = "https://api.example.com/api/cars".parse().unwrap();
        assert_eq!(
            absolute_location(&request, "/api/cars/7"),
            "https://api.example.com/api/cars/7"
        );
        assert_eq!(
            absolute_location(&request, "https://other/x"),
            "https://other/x"
        );
        let relative: Uri = "/api/cars".parse().unwrap();
        assert_eq!(absolute_location(&relative, "/api/cars/7"), "/api/cars/7");
    }

    #[test]
    fn test_not_modified_merge() {
        let mut stored = HeaderMap::new();
        stored.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=10"));
        stored.insert(ETAG, HeaderValue::from_static("\"abc\""));
        stored.insert(AGE, HeaderValue::from_static("30"));
        let mut not_modified = HeaderMap::new();
        not_modified.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));

        let now = Utc::now();
        merge_not_modified(&mut stored, &not_modified, now);
        assert_eq!(stored.get(CACHE_CONTROL).unwrap(), "max-age=60");
        assert_eq!(stored.get(ETAG).unwrap(), "\"abc\"");
        assert!(!stored.contains_key(AGE));
        assert_eq!(
            header_date(&stored, &DATE).map(|d| d.timestamp()),
            Some(now.timestamp())
        );
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        let decide = |request: http::Request<()>| {
            let (parts, _) = request.into_parts();
            rules.iter().find_map(|rule| rule(&parts))
        };
        let get = |header: Option<(HeaderName, &'static str)>| {
            let mut builder = http::Request::get("http://h/x");
            if let Some((name, value)) = header {
                builder = builder.header(name, value);
            }
            builder.body(()).unwrap()
        };

        assert_eq!(decide(get(None)), None);
        assert_eq!(
            decide(http::Request::put("http://h/x").body(()).unwrap()),
            Some(RequestDecision::Invalidate)
        );
        assert_eq!(
            decide(http::Request::head("http://h/x").body(()).unwrap()),
            Some(RequestDecision::Bypass)
        );
        assert_eq!(
            decide(get(Some((CACHE_CONTROL, "no-store")))),
            Some(RequestDecision::Bypass)
        );
        assert_eq!(
            decide(get(Some((RANGE, "bytes=0-10")))),
            Some(RequestDecision::Bypass)
        );
        assert_eq!(
            decide(get(Some((IF_NONE_MATCH, "\"a\"")))),
            Some(RequestDecision::Bypass)
        );
    }
}
