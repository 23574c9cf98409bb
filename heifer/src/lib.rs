#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # heifer
//!
//! Cache-consistency engine shared by the client and server layers.
//!
//! This crate holds everything that is neither a value type (see
//! [`heifer_core`]) nor tied to HTTP message types (see `heifer-http`):
//! policies, the error type surfaced by the pipelines, and the
//! [`QuotaManager`](quota::QuotaManager) that keeps the client store within
//! its byte budget.

/// Client and server policies with YAML loading.
///
/// [`ClientPolicy`](config::ClientPolicy) drives the outgoing-call interceptor
/// and [`ServerPolicy`](config::ServerPolicy) the handler interceptor.
pub mod config;

/// Error types surfaced by the pipelines.
///
/// Defines [`CacheError`] which covers:
/// - Store failures propagated by [`StoreErrorPolicy::Propagate`](heifer_backend::StoreErrorPolicy)
/// - Contradictory conditional headers
/// - Configuration errors
pub mod error;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters for
/// client outcomes, server short-circuits, invalidations, store errors and
/// housekeeping runs.
pub mod metrics;

/// Byte accounting of the client store and detached housekeeping.
pub mod quota;

pub use config::{ClientPolicy, ServerPolicy};
pub use error::{CacheError, ProtocolConflict};
pub use quota::{
    Housekeeper, HousekeepingError, HousekeepingFailure, HousekeepingRequest, QuotaConfig,
    QuotaManager, QuotaScope,
};

pub use heifer_backend::{
    MetadataProvider, ResponseStore, StoreError, StoreErrorPolicy, UsageListener, ValidatorStore,
};
pub use heifer_core::{
    CacheIdentity, ConditionalKind, Diagnostic, EntityTag, EntryMeta, FreshnessOutcome,
    RoutePattern, Validator,
};
