//! Cache middleware for reqwest-middleware.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use heifer::ClientPolicy;
use heifer_backend::ResponseStore;
use heifer_http::{ClientBefore, ClientPipeline, RequestRule, VaryTable};
use heifer_moka::MokaResponseStore;
use http::Extensions;
use http_body_util::BodyExt;
use reqwest::{Request, Response};
use reqwest_middleware::{Error, Middleware, Next, Result};
use tracing::debug;

/// Response capacity of the store created when none is configured.
pub const DEFAULT_MAX_RESPONSES: u64 = 10_000;

/// Client-side cache middleware.
#[derive(Debug, Clone)]
pub struct ClientCache {
    pipeline: ClientPipeline,
}

impl ClientCache {
    /// Wraps an already configured pipeline.
    pub fn new(pipeline: ClientPipeline) -> Self {
        Self { pipeline }
    }

    pub fn builder() -> ClientCacheBuilder {
        ClientCacheBuilder::default()
    }

    pub fn pipeline(&self) -> &ClientPipeline {
        &self.pipeline
    }
}

/// Builder of [`ClientCache`].
#[derive(Default)]
pub struct ClientCacheBuilder {
    policy: ClientPolicy,
    store: Option<Arc<dyn ResponseStore>>,
    rules: Vec<RequestRule>,
    vary: Option<Arc<VaryTable>>,
}

impl ClientCacheBuilder {
    pub fn policy(self, policy: ClientPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Sets the response store. Defaults to a [`MokaResponseStore`] holding
    /// [`DEFAULT_MAX_RESPONSES`] entries.
    pub fn store<S: ResponseStore + 'static>(self, store: S) -> Self {
        Self {
            store: Some(Arc::new(store)),
            ..self
        }
    }

    /// Adds a request rule evaluated before the built-in ones.
    pub fn rule(mut self, rule: RequestRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Shares a vary table between several middlewares.
    pub fn vary_table(self, vary: Arc<VaryTable>) -> Self {
        Self {
            vary: Some(vary),
            ..self
        }
    }

    pub fn build(self) -> ClientCache {
        let store: Arc<dyn ResponseStore> = match self.store {
            Some(store) => store,
            None => Arc::new(
                MokaResponseStore::builder()
                    .max_entries(DEFAULT_MAX_RESPONSES)
                    .build(),
            ),
        };
        let mut pipeline = ClientPipeline::new(self.policy, store);
        // `with_rule` prepends, so the last added rule would win otherwise.
        for rule in self.rules.into_iter().rev() {
            pipeline = pipeline.with_rule(rule);
        }
        if let Some(vary) = self.vary {
            pipeline = pipeline.with_vary_table(vary);
        }
        ClientCache::new(pipeline)
    }
}

impl fmt::Debug for ClientCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCacheBuilder")
            .field("policy", &self.policy)
            .field("store", &self.store.is_some())
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[async_trait]
impl Middleware for ClientCache {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let http_request: http::Request<reqwest::Body> = req
            .try_into()
            .map_err(|e: reqwest::Error| Error::Reqwest(e))?;
        let (mut parts, body) = http_request.into_parts();

        let exchange = match self.pipeline.before(&mut parts).await.map_err(Error::middleware)? {
            ClientBefore::Respond(response) => {
                return Ok(response.map(reqwest::Body::from).into());
            }
            ClientBefore::Forward(exchange) => exchange,
        };

        let request: Request = http::Request::from_parts(parts, body)
            .try_into()
            .map_err(|e: reqwest::Error| Error::Reqwest(e))?;
        let response = next.run(request, extensions).await?;
        let http_response: http::Response<reqwest::Body> = response.into();
        let (mut parts, body) = http_response.into_parts();

        if !exchange.needs_body() {
            self.pipeline
                .after_passthrough(exchange, parts.status, &mut parts.headers)
                .await
                .map_err(Error::middleware)?;
            return Ok(http::Response::from_parts(parts, body).into());
        }

        let bytes = body.collect().await.map_err(Error::Reqwest)?.to_bytes();
        debug!(status = %parts.status, size = bytes.len(), "buffered origin response");
        let response = self
            .pipeline
            .after(exchange, http::Response::from_parts(parts, bytes))
            .await
            .map_err(Error::middleware)?;
        Ok(response.map(reqwest::Body::from).into())
    }
}
