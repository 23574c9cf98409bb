use std::fmt;

use async_trait::async_trait;
use heifer_backend::StoreError;
use smol_str::SmolStr;
use thiserror::Error;

/// Budget whose crossing triggered housekeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuotaScope {
    /// The aggregate budget across every domain.
    Global,
    /// The budget of a single domain.
    Domain(SmolStr),
}

impl QuotaScope {
    /// Label used in spans and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Domain(_) => "domain",
        }
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Domain(domain) => write!(f, "domain:{domain}"),
        }
    }
}

/// What the housekeeper is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousekeepingRequest {
    /// Budget that was crossed.
    pub scope: QuotaScope,
    /// Bytes in use when the budget was crossed.
    pub used: u64,
    /// The budget.
    pub quota: u64,
}

impl HousekeepingRequest {
    /// Bytes to free to get back under the budget.
    pub fn excess(&self) -> u64 {
        self.used.saturating_sub(self.quota)
    }
}

/// Housekeeping failure reason.
#[derive(Debug, Error)]
pub enum HousekeepingError {
    /// The store failed while evicting.
    #[error("store failed during housekeeping: {0}")]
    Store(#[from] StoreError),
    /// The housekeeper panicked.
    #[error("housekeeper panicked: {0}")]
    Panicked(String),
    /// No tokio runtime was available to run housekeeping on.
    #[error("no runtime to spawn housekeeping on")]
    NoRuntime,
}

/// A failed housekeeping run, as published on the failure channel.
#[derive(Debug)]
pub struct HousekeepingFailure {
    /// Budget the run was for.
    pub scope: QuotaScope,
    /// Why it failed.
    pub error: HousekeepingError,
}

/// Selects and evicts victims once a budget is crossed.
///
/// The [`QuotaManager`](super::QuotaManager) owns the trigger and the
/// accounting; implementations only decide what to remove.
#[async_trait]
pub trait Housekeeper: Send + Sync {
    /// Frees space for the request's scope.
    async fn housekeep(&self, request: HousekeepingRequest) -> Result<(), HousekeepingError>;
}
