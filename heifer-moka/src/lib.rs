#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # heifer-moka
//!
//! In-memory stores for heifer backed by [Moka](https://github.com/moka-rs/moka).
//!
//! - [`MokaResponseStore`] keeps client-side response blobs and reports every
//!   write and eviction to a [`UsageListener`](heifer_backend::UsageListener),
//!   usually a [`QuotaManager`](heifer::QuotaManager)
//! - [`MokaValidatorStore`] keeps server-side validators with an
//!   [`InvalidationIndex`](heifer_backend::InvalidationIndex) for bulk removal
//! - [`LruHousekeeper`] evicts least-recently-accessed responses when a quota
//!   is crossed
//!
//! ```
//! use std::sync::Arc;
//! use heifer::{QuotaConfig, QuotaManager};
//! use heifer_moka::{LruHousekeeper, MokaResponseStore};
//!
//! let store = MokaResponseStore::builder().max_entries(10_000).build();
//! let housekeeper = LruHousekeeper::new(store.clone());
//! let manager = QuotaManager::new(QuotaConfig::default(), Arc::new(housekeeper));
//! assert!(store.set_listener(Arc::new(manager)));
//! ```
//!
//! Data is not persisted and not shared across processes.

mod builder;
mod housekeeper;
mod response;
mod validator;

pub use builder::MokaResponseStoreBuilder;
pub use housekeeper::LruHousekeeper;
pub use moka::policy::EvictionPolicy;
pub use response::MokaResponseStore;
pub use validator::MokaValidatorStore;
