#![warn(missing_docs)]
//! # heifer-core
//!
//! Value types shared by every heifer crate.
//!
//! This crate knows nothing about stores, frameworks or middleware. It only
//! defines the vocabulary the cache-consistency engine speaks:
//!
//! - [`CacheIdentity`] - content-addressed key of a cacheable exchange
//! - [`Validator`] / [`EntityTag`] - minimal resource-state identity
//! - [`FreshnessOutcome`] / [`ConditionalKind`] - decision enums
//! - [`RoutePattern`] - invalidation key for a family of URIs
//! - [`EntryMeta`] - quota bookkeeping for a stored entry
//! - [`Diagnostic`] - per-request record serialized into the diagnostic header
//!
//! ## Identity format
//!
//! ```
//! use heifer_core::CacheIdentity;
//!
//! let identity = CacheIdentity::new(
//!     "https://api.example.com/cars/7?expand=true",
//!     vec!["application/json".into()],
//!     "cars-service/v1",
//! );
//!
//! assert_eq!(identity.resource_uri(), "https://api.example.com/cars/7");
//! assert_eq!(identity.domain(), Some("api.example.com"));
//! assert_eq!(
//!     identity.to_string(),
//!     "https://api.example.com/cars/7-application/json"
//! );
//! ```

pub mod date;
pub mod diagnostic;
pub mod identity;
pub mod meta;
pub mod outcome;
pub mod route;
pub mod validator;

pub use diagnostic::Diagnostic;
pub use identity::CacheIdentity;
pub use meta::EntryMeta;
pub use outcome::{ConditionalKind, FreshnessOutcome};
pub use route::RoutePattern;
pub use validator::{EntityTag, EntityTagList, Validator, ValidatorParseError};

#[doc(hidden)]
pub use smol_str::SmolStr;
