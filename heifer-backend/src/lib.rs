// #![warn(missing_docs)]
//! Store contracts for heifer.
//!
//! The cache-consistency engine never talks to a concrete storage engine. It
//! talks to two async traits:
//!
//! - [`ResponseStore`] keeps opaque response blobs keyed by [`CacheIdentity`]
//! - [`ValidatorStore`] keeps [`Validator`]s keyed by identity and can drop
//!   every identity under a resource URI or a route pattern
//!
//! Stores that feed quota accounting report usage through a [`UsageListener`]
//! and expose their per-domain listings through a [`MetadataProvider`].
//!
//! [`InvalidationIndex`] is the bookkeeping structure validator stores use to
//! answer the bulk removals.
//!
//! [`CacheIdentity`]: heifer_core::CacheIdentity
//! [`Validator`]: heifer_core::Validator
mod error;
mod index;
mod policy;
mod store;
mod usage;

pub use error::{StoreError, StoreResult};
pub use index::InvalidationIndex;
pub use policy::StoreErrorPolicy;
pub use store::{ResponseStore, ValidatorStore};
pub use usage::{MetadataProvider, UsageListener};
