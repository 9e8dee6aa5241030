//! Prometheus metrics for directory-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Entry insert outcomes (ok, already_exists, no_such_object, ...).
pub static INSERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "directory_inserts_total",
        "Total number of entry insert attempts by outcome",
        &["result"]
    )
    .expect("Failed to register inserts_total")
});

/// Tree node promotions; `existing` counts promotions lost to another writer.
pub static TREE_PROMOTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "directory_tree_promotions_total",
        "Total number of tree node promotions by outcome",
        &["outcome"]
    )
    .expect("Failed to register tree_promotions_total")
});

/// Membership edges written, by declaring attribute.
pub static MEMBER_EDGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "directory_member_edges_total",
        "Total number of membership edges inserted",
        &["role"]
    )
    .expect("Failed to register member_edges_total")
});

/// Database operation duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "directory_db_query_duration_seconds",
        "Database operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INSERTS_TOTAL);
    Lazy::force(&TREE_PROMOTIONS_TOTAL);
    Lazy::force(&MEMBER_EDGES_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
