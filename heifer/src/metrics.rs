//! Metrics declaration and recording helpers.
//!
//! Every helper is a no-op when the `metrics` feature is disabled.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track client requests by freshness outcome.
    pub static ref CLIENT_OUTCOME_COUNTER: &'static str = {
        metrics::describe_counter!(
            "heifer_client_outcome_total",
            "Total number of client requests by freshness outcome."
        );
        "heifer_client_outcome_total"
    };
    /// Track client responses served from the store.
    pub static ref CLIENT_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "heifer_client_hit_total",
            "Total number of client responses served from the store."
        );
        "heifer_client_hit_total"
    };
    /// Track server requests answered without running the handler.
    pub static ref SERVER_SHORT_CIRCUIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "heifer_server_short_circuit_total",
            "Total number of server requests answered with 304, 400 or 412 before the handler."
        );
        "heifer_server_short_circuit_total"
    };
    /// Track validator entries removed by invalidation.
    pub static ref INVALIDATION_COUNTER: &'static str = {
        metrics::describe_counter!(
            "heifer_invalidated_entries_total",
            "Total number of entries removed by invalidation."
        );
        "heifer_invalidated_entries_total"
    };
    /// Track store operation failures.
    pub static ref STORE_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "heifer_store_errors_total",
            "Total number of failed store operations."
        );
        "heifer_store_errors_total"
    };
    /// Track housekeeping runs spawned.
    pub static ref HOUSEKEEPING_TRIGGERED: &'static str = {
        metrics::describe_counter!(
            "heifer_housekeeping_triggered_total",
            "Total number of housekeeping runs spawned."
        );
        "heifer_housekeeping_triggered_total"
    };
    /// Track housekeeping runs finished, by result.
    pub static ref HOUSEKEEPING_FINISHED: &'static str = {
        metrics::describe_counter!(
            "heifer_housekeeping_finished_total",
            "Total number of housekeeping runs finished."
        );
        "heifer_housekeeping_finished_total"
    };
}

/// Record a client freshness outcome.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_client_outcome(outcome: &'static str, from_cache: bool) {
    metrics::counter!(*CLIENT_OUTCOME_COUNTER, "outcome" => outcome).increment(1);
    if from_cache {
        metrics::counter!(*CLIENT_HIT_COUNTER).increment(1);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_client_outcome(_outcome: &'static str, _from_cache: bool) {}

/// Record a server short-circuit by status code.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_server_short_circuit(status: u16) {
    metrics::counter!(*SERVER_SHORT_CIRCUIT_COUNTER, "status" => status.to_string()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_server_short_circuit(_status: u16) {}

/// Record entries removed by an invalidation of the given kind.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_invalidation(kind: &'static str, removed: usize) {
    metrics::counter!(*INVALIDATION_COUNTER, "kind" => kind).increment(removed as u64);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_invalidation(_kind: &'static str, _removed: usize) {}

/// Record a failed store operation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_store_error(operation: &'static str, kind: &'static str) {
    metrics::counter!(*STORE_ERROR_COUNTER, "operation" => operation, "kind" => kind).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_store_error(_operation: &'static str, _kind: &'static str) {}

/// Record a spawned housekeeping run.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_housekeeping_triggered(scope: &'static str) {
    metrics::counter!(*HOUSEKEEPING_TRIGGERED, "scope" => scope).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_housekeeping_triggered(_scope: &'static str) {}

/// Record a finished housekeeping run.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_housekeeping_finished(scope: &'static str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(*HOUSEKEEPING_FINISHED, "scope" => scope, "result" => result).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_housekeeping_finished(_scope: &'static str, _success: bool) {}
