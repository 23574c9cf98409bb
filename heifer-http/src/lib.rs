//! HTTP side of heifer: header parsing, freshness evaluation, the conditional
//! request protocol, route patterns and the client/server pipelines driven by
//! the framework adapters.

pub mod body;
pub mod conditional;
pub mod freshness;
pub mod headers;
pub mod identity;
pub mod pipeline;
pub mod route;
mod stored;
pub mod validator_source;

pub use body::CacheBody;
pub use conditional::{Precondition, Verdict};
pub use headers::{CacheControl, DIAGNOSTIC_HEADER, MaxStale};
pub use identity::{VaryHeader, VaryTable};
pub use pipeline::{
    ClientBefore, ClientExchange, ClientPipeline, RequestDecision, RequestRule, ServerBefore,
    ServerExchange, ServerPipeline,
};
pub use route::{
    RestfulPatternProvider, RoutePatternProvider, RouteTemplate, RouteTemplateError,
    TemplatePatternProvider,
};
pub use stored::StoredResponse;
pub use validator_source::{
    DigestValidatorSource, HeaderValidatorSource, ValidatorChain, ValidatorQuery, ValidatorSource,
};
