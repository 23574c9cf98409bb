//! Tower middleware for the server side of heifer.
//!
//! This crate provides [`ServerCache`], a Tower [`Layer`] that wraps a
//! request handler with the conditional request protocol:
//!
//! - conditional `GET`s whose validator is still current are answered with
//!   `304 Not Modified` without running the handler
//! - conditional writes whose validator is outdated are answered with
//!   `412 Precondition Failed` without running the handler
//! - successful `GET` responses get their validator persisted and
//!   advertised together with `Cache-Control` and `Vary`
//! - successful mutations invalidate the stored validators of the resource
//!   and of the route patterns linked to it
//!
//! [`Layer`]: tower::Layer
//!
//! # Quick Start
//!
//! ```ignore
//! use heifer::ServerPolicy;
//! use heifer_http::TemplatePatternProvider;
//! use heifer_moka::MokaValidatorStore;
//! use heifer_tower::ServerCache;
//! use tower::{ServiceBuilder, service_fn};
//!
//! let routes = TemplatePatternProvider::new().route("/api/cars/{id?}")?;
//! let layer = ServerCache::builder()
//!     .policy(ServerPolicy::default())
//!     .validators(MokaValidatorStore::new(10_000))
//!     .routes(routes)
//!     .build();
//!
//! let service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|_req| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(http_body_util::Full::new(bytes::Bytes::from("[]"))))
//!     }));
//! ```
//!
//! # Body Handling
//!
//! Only the body of a successful `GET` is buffered, since the digest ETag and
//! late validation need it. Every other response body is streamed through
//! untouched.
//!
//! # Store Failures
//!
//! With [`StoreErrorPolicy::Propagate`](heifer::StoreErrorPolicy::Propagate)
//! a failing validator store turns the response into `500 Internal Server
//! Error`; the default policy logs and continues.

#![warn(missing_docs)]

/// Future type of the layered service.
pub mod future;
/// Tower layer and builder.
pub mod layer;
/// The Tower service driving the server pipeline.
pub mod service;

pub use heifer_http::CacheBody;
pub use layer::{ServerCache, ServerCacheBuilder};
pub use service::ServerCacheService;
