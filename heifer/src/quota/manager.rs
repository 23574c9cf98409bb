//! QuotaManager implementation: byte accounting and housekeeping trigger.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use heifer_backend::{MetadataProvider, StoreResult, UsageListener};
use heifer_core::EntryMeta;
use smol_str::SmolStr;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span};

use super::housekeeper::{
    Housekeeper, HousekeepingError, HousekeepingFailure, HousekeepingRequest, QuotaScope,
};
use super::policy::QuotaConfig;
use crate::metrics;

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Internal state shared across clones.
struct QuotaManagerInner {
    config: QuotaConfig,
    housekeeper: Arc<dyn Housekeeper>,
    domains: DashMap<SmolStr, AtomicU64>,
    total: AtomicU64,
    tasks: DashMap<QuotaScope, JoinHandle<()>>,
    failures: broadcast::Sender<Arc<HousekeepingFailure>>,
}

/// Keeps per-domain and aggregate byte totals of the client store and
/// triggers detached housekeeping when a budget is crossed.
///
/// Triggering is edge based: housekeeping runs once when usage goes from at
/// or under a budget to over it. Further growth while over the budget, or
/// removals back under it, do not trigger again. At most one housekeeping
/// task per scope is in flight.
#[derive(Clone)]
pub struct QuotaManager {
    inner: Arc<QuotaManagerInner>,
}

impl QuotaManager {
    /// Create a new QuotaManager with the given budgets and housekeeper.
    pub fn new(config: QuotaConfig, housekeeper: Arc<dyn Housekeeper>) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(QuotaManagerInner {
                config,
                housekeeper,
                domains: DashMap::new(),
                total: AtomicU64::new(0),
                tasks: DashMap::new(),
                failures,
            }),
        }
    }

    /// The configured budgets.
    pub fn config(&self) -> &QuotaConfig {
        &self.inner.config
    }

    /// Bytes in use across every domain.
    pub fn used(&self) -> u64 {
        self.inner.total.load(Ordering::Acquire)
    }

    /// Bytes in use by one domain.
    pub fn domain_used(&self, domain: &str) -> u64 {
        self.inner
            .domains
            .get(domain)
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Receives every housekeeping failure published after the call.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<Arc<HousekeepingFailure>> {
        self.inner.failures.subscribe()
    }

    /// Accounts a newly stored entry.
    pub fn item_added(&self, meta: &EntryMeta) {
        let size = meta.size;
        let domain_prev = self.add_to_domain(&meta.domain, size);
        let total_prev = self.inner.total.fetch_add(size, Ordering::AcqRel);

        if let Some(quota) = self.inner.config.per_domain_bytes()
            && crossed(domain_prev, size, quota)
        {
            self.trigger(
                QuotaScope::Domain(meta.domain.clone()),
                domain_prev.saturating_add(size),
                quota,
            );
        }
        if let Some(quota) = self.inner.config.global_bytes()
            && crossed(total_prev, size, quota)
        {
            self.trigger(QuotaScope::Global, total_prev.saturating_add(size), quota);
        }
    }

    /// Accounts a removed entry.
    pub fn item_removed(&self, meta: &EntryMeta) {
        let size = meta.size;
        if let Some(counter) = self.inner.domains.get(meta.domain.as_str()) {
            saturating_sub(&counter, size);
        }
        saturating_sub(&self.inner.total, size);
    }

    /// Recomputes every total from the store's listings.
    pub async fn rebuild(&self, provider: &dyn MetadataProvider) -> StoreResult<()> {
        let mut totals = Vec::new();
        for domain in provider.domains().await? {
            let items = provider.items(&domain).await?;
            totals.push((domain, items.iter().map(|meta| meta.size).sum::<u64>()));
        }

        self.inner.domains.clear();
        let mut total = 0u64;
        for (domain, size) in totals {
            total = total.saturating_add(size);
            self.inner.domains.insert(domain, AtomicU64::new(size));
        }
        self.inner.total.store(total, Ordering::Release);
        debug!(total, domains = self.inner.domains.len(), "quota totals rebuilt");
        Ok(())
    }

    /// Check if housekeeping for the scope is in flight.
    pub fn is_in_flight(&self, scope: &QuotaScope) -> bool {
        self.inner
            .tasks
            .get(scope)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for all currently tracked housekeeping tasks to complete.
    pub async fn wait_all(&self) {
        loop {
            self.inner.tasks.retain(|_, handle| !handle.is_finished());
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    fn add_to_domain(&self, domain: &SmolStr, size: u64) -> u64 {
        if let Some(counter) = self.inner.domains.get(domain) {
            return counter.fetch_add(size, Ordering::AcqRel);
        }
        self.inner
            .domains
            .entry(domain.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(size, Ordering::AcqRel)
    }

    fn trigger(&self, scope: QuotaScope, used: u64, quota: u64) {
        // The scope's entry stays locked until the new task is recorded.
        let entry = self.inner.tasks.entry(scope.clone());
        if let Entry::Occupied(running) = &entry
            && !running.get().is_finished()
        {
            debug!(%scope, "housekeeping already in flight");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            drop(entry);
            self.publish(scope, HousekeepingError::NoRuntime);
            return;
        };

        debug!(%scope, used, quota, "quota crossed, spawning housekeeping");
        metrics::record_housekeeping_triggered(scope.kind());

        let request = HousekeepingRequest {
            scope: scope.clone(),
            used,
            quota,
        };
        let span = info_span!("housekeeping", scope = %scope, used, quota);
        let manager = self.clone();
        let task_scope = scope.clone();

        let handle = runtime.spawn(
            async move {
                let housekeeper = manager.inner.housekeeper.clone();
                let outcome = AssertUnwindSafe(housekeeper.housekeep(request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HousekeepingError::Panicked(panic_message(&*panic))));
                match outcome {
                    Ok(()) => {
                        debug!("housekeeping finished");
                        metrics::record_housekeeping_finished(task_scope.kind(), true);
                    }
                    Err(error) => manager.publish(task_scope, error),
                }
            }
            .instrument(span),
        );
        entry.insert(handle);
    }

    fn publish(&self, scope: QuotaScope, error: HousekeepingError) {
        error!(%scope, %error, "housekeeping failed");
        metrics::record_housekeeping_finished(scope.kind(), false);
        // No subscribers is fine.
        let _ = self
            .inner
            .failures
            .send(Arc::new(HousekeepingFailure { scope, error }));
    }
}

impl UsageListener for QuotaManager {
    fn item_added(&self, meta: &EntryMeta) {
        QuotaManager::item_added(self, meta);
    }

    fn item_removed(&self, meta: &EntryMeta) {
        QuotaManager::item_removed(self, meta);
    }
}

impl fmt::Debug for QuotaManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaManager")
            .field("config", &self.inner.config)
            .field("used", &self.used())
            .field("domains", &self.inner.domains.len())
            .finish()
    }
}

fn crossed(prev: u64, added: u64, quota: u64) -> bool {
    prev <= quota && prev.saturating_add(added) > quota
}

fn saturating_sub(counter: &AtomicU64, size: u64) {
    // The closure never declines, so the update always succeeds.
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(size))
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
