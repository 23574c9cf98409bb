//! Client-side response cache for [`reqwest`] through `reqwest-middleware`.
//!
//! [`ClientCache`] runs every outgoing call through the heifer client
//! pipeline: fresh stored responses are served without a network round
//! trip, stale ones are revalidated with `If-None-Match` /
//! `If-Modified-Since`, and successful mutations drop the cached variants of
//! the resource they touched.
//!
//! ```ignore
//! use heifer_moka::MokaResponseStore;
//! use heifer_reqwest::ClientCache;
//! use reqwest_middleware::ClientBuilder;
//!
//! let cache = ClientCache::builder()
//!     .store(MokaResponseStore::builder().max_entries(10_000).build())
//!     .build();
//! let client = ClientBuilder::new(reqwest::Client::new()).with(cache).build();
//! let cars = client.get("https://api.example/api/cars").send().await?;
//! ```
//!
//! Responses carry the [`DIAGNOSTIC_HEADER`] unless
//! [`ClientPolicy::diagnostic_header`](heifer::ClientPolicy::diagnostic_header)
//! is disabled.

mod middleware;

pub use heifer_http::DIAGNOSTIC_HEADER;
pub use middleware::{ClientCache, ClientCacheBuilder, DEFAULT_MAX_RESPONSES};
