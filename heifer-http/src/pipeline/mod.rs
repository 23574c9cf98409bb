//! Request/response orchestration.
//!
//! Both pipelines are split in two halves around the protected call:
//! `before` decides whether the call can be skipped, `after` post-processes
//! its result. Framework adapters drive them; no lock is held between the two
//! halves.

pub mod client;
pub mod server;

pub use client::{ClientBefore, ClientExchange, ClientPipeline, RequestDecision, RequestRule};
pub use server::{ServerBefore, ServerExchange, ServerPipeline};

use bytes::Bytes;
use heifer::CacheError;
use heifer::metrics;
use heifer_backend::{StoreErrorPolicy, StoreResult};
use http::{Response, StatusCode};
use tracing::error;

/// Applies the store error policy, recording failures.
pub(crate) fn absorb<T: Default>(
    policy: StoreErrorPolicy,
    operation: &'static str,
    result: StoreResult<T>,
) -> Result<T, CacheError> {
    if let Err(error) = &result {
        metrics::record_store_error(operation, error.kind());
    }
    policy.absorb(operation, result).map_err(|error| {
        error!(operation, %error, "store operation failed");
        CacheError::from(error)
    })
}

/// Empty response with the given status.
pub(crate) fn status_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}
