//! Storage quota accounting for the client store.
//!
//! The response store reports every write and eviction to the
//! [`QuotaManager`] through the [`UsageListener`](heifer_backend::UsageListener)
//! trait. When a per-domain or global budget is crossed the manager spawns a
//! detached [`Housekeeper`] run; failures are logged and published on a
//! broadcast channel, never returned to the request that triggered them.
//!
//! # Example
//!
//! ```ignore
//! use heifer::quota::{QuotaConfig, QuotaManager};
//!
//! let config = QuotaConfig::builder().per_domain(ByteSize::mib(8)).build();
//! let manager = QuotaManager::new(config, Arc::new(housekeeper));
//! manager.rebuild(&store).await?;
//! store.set_listener(Arc::new(manager.clone()));
//! ```

mod housekeeper;
mod manager;
mod policy;

pub use housekeeper::{
    Housekeeper, HousekeepingError, HousekeepingFailure, HousekeepingRequest, QuotaScope,
};
pub use manager::QuotaManager;
pub use policy::{QuotaConfig, QuotaConfigBuilder};
