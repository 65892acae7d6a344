//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::ServerError;
use crate::Result;

/// Entries written to the index.
pub static ENTRIES_ADDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("fscache_entries_added_total", "Entries added to the index")
        .expect("metric registers once")
});

/// Entries removed from the index.
pub static ENTRIES_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fscache_entries_deleted_total",
        "Entries deleted from the index"
    )
    .expect("metric registers once")
});

/// Indexed entries, refreshed on status requests.
pub static ENTRIES_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("fscache_entries", "Number of indexed entries")
        .expect("metric registers once")
});

/// Normalized watcher events received, by kind.
pub static EVENTS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fscache_events_total",
        "Filesystem events received",
        &["kind"]
    )
    .expect("metric registers once")
});

/// Events dropped by the global ignore list.
pub static EVENTS_IGNORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fscache_events_ignored_total",
        "Filesystem events dropped by global ignores"
    )
    .expect("metric registers once")
});

/// Queries served, by outcome.
pub static QUERY_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("fscache_queries_total", "Queries served", &["status"])
        .expect("metric registers once")
});

/// Query latency histogram.
pub static QUERY_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "fscache_query_duration_seconds",
        "Query latency in seconds",
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("metric registers once")
});

/// Duration of full tree walks.
pub static WALK_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "fscache_walk_duration_seconds",
        "Tree walk duration in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("metric registers once")
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*ENTRIES_ADDED;
    let _ = &*ENTRIES_DELETED;
    let _ = &*ENTRIES_TOTAL;
    let _ = &*EVENTS_RECEIVED;
    let _ = &*EVENTS_IGNORED;
    let _ = &*QUERY_COUNT;
    let _ = &*QUERY_LATENCY;
    let _ = &*WALK_DURATION;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn render() -> Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buf)
        .map_err(|e| ServerError::Request(format!("metrics encoding failed: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| ServerError::Request(format!("metrics are not UTF-8: {e}")).into())
}
