use std::fmt;
use std::sync::Arc;

use heifer::ServerPolicy;
use heifer_backend::ValidatorStore;
use heifer_http::{RoutePatternProvider, ServerPipeline, ValidatorChain, ValidatorQuery};
use heifer_moka::MokaValidatorStore;
use tower::Layer;

use crate::service::ServerCacheService;

/// Validator capacity of the store created when none is configured.
pub const DEFAULT_MAX_VALIDATORS: u64 = 10_000;

/// Tower layer running the server pipeline around a handler.
#[derive(Debug, Clone)]
pub struct ServerCache {
    pipeline: ServerPipeline,
}

impl ServerCache {
    /// Wraps an already configured pipeline.
    pub fn new(pipeline: ServerPipeline) -> Self {
        Self { pipeline }
    }

    /// Starts a builder with the default policy and an in-memory store.
    pub fn builder() -> ServerCacheBuilder {
        ServerCacheBuilder::default()
    }

    /// The pipeline shared by every layered service.
    pub fn pipeline(&self) -> &ServerPipeline {
        &self.pipeline
    }
}

impl<S> Layer<S> for ServerCache {
    type Service = ServerCacheService<S>;

    fn layer(&self, upstream: S) -> Self::Service {
        ServerCacheService::new(upstream, self.pipeline.clone())
    }
}

/// Builder of [`ServerCache`].
#[derive(Default)]
pub struct ServerCacheBuilder {
    policy: ServerPolicy,
    validators: Option<Arc<dyn ValidatorStore>>,
    routes: Option<Arc<dyn RoutePatternProvider>>,
    sources: Option<ValidatorChain>,
    query: Option<Arc<dyn ValidatorQuery>>,
}

impl ServerCacheBuilder {
    /// Sets the server policy.
    pub fn policy(self, policy: ServerPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Sets the validator store. Defaults to a [`MokaValidatorStore`] of
    /// [`DEFAULT_MAX_VALIDATORS`] entries.
    pub fn validators<V: ValidatorStore + 'static>(self, validators: V) -> Self {
        Self {
            validators: Some(Arc::new(validators)),
            ..self
        }
    }

    /// Sets the route pattern provider. Defaults to RESTful ancestors.
    pub fn routes<R: RoutePatternProvider + 'static>(self, routes: R) -> Self {
        Self {
            routes: Some(Arc::new(routes)),
            ..self
        }
    }

    /// Replaces the validator sources applied to handler responses.
    pub fn sources(self, sources: ValidatorChain) -> Self {
        Self {
            sources: Some(sources),
            ..self
        }
    }

    /// Sets the hook consulted when no validator is stored.
    pub fn query<Q: ValidatorQuery + 'static>(self, query: Q) -> Self {
        Self {
            query: Some(Arc::new(query)),
            ..self
        }
    }

    /// Builds the layer.
    pub fn build(self) -> ServerCache {
        let validators: Arc<dyn ValidatorStore> = match self.validators {
            Some(validators) => validators,
            None => Arc::new(MokaValidatorStore::new(DEFAULT_MAX_VALIDATORS)),
        };
        let mut pipeline = ServerPipeline::new(self.policy, validators);
        if let Some(routes) = self.routes {
            pipeline = pipeline.with_routes(routes);
        }
        if let Some(sources) = self.sources {
            pipeline = pipeline.with_sources(sources);
        }
        if let Some(query) = self.query {
            pipeline = pipeline.with_query(query);
        }
        ServerCache::new(pipeline)
    }
}

impl fmt::Debug for ServerCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCacheBuilder")
            .field("policy", &self.policy)
            .field("validators", &self.validators.is_some())
            .field("routes", &self.routes.is_some())
            .field("query", &self.query.is_some())
            .finish()
    }
}
