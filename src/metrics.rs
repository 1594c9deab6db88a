//! Prometheus metrics for the aggregation cache
//!
//! Counters are registered in the default registry on first use.
//! [`gather_metrics`] renders everything registered in the text exposition
//! format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};

lazy_static! {
    // === Segment Cache ===

    /// Segment cache operations by backend, operation and outcome
    pub static ref SEGMENT_CACHE_OPS: CounterVec = register_counter_vec!(
        "starcache_segment_cache_ops_total",
        "Total segment cache operations",
        &["backend", "op", "outcome"]
    ).unwrap();

    /// Segment loads through the cache manager
    pub static ref SEGMENT_LOADS: CounterVec = register_counter_vec!(
        "starcache_segment_loads_total",
        "Total segment loads by outcome (hit, miss, store_failed, load_failed)",
        &["outcome"]
    ).unwrap();

    // === Predicate Compilation ===

    /// Compilations by outcome
    pub static ref PREDICATE_COMPILATIONS: CounterVec = register_counter_vec!(
        "starcache_predicate_compilations_total",
        "Total predicate compilations by outcome",
        &["outcome"]
    ).unwrap();

    /// Tuples skipped because they could not be constrained
    pub static ref UNSATISFIABLE_TUPLES: Counter = register_counter!(
        "starcache_unsatisfiable_tuples_total",
        "Total tuples that could not be expressed against the measure's star"
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a segment cache operation
#[inline]
pub fn record_cache_op(backend: &str, op: &str, outcome: &str) {
    SEGMENT_CACHE_OPS
        .with_label_values(&[backend, op, outcome])
        .inc();
}

/// Record a predicate compilation
#[inline]
pub fn record_compilation(outcome: &str, unsatisfiable_tuples: usize) {
    PREDICATE_COMPILATIONS.with_label_values(&[outcome]).inc();
    if unsatisfiable_tuples > 0 {
        UNSATISFIABLE_TUPLES.inc_by(unsatisfiable_tuples as f64);
    }
}

/// Record a segment load
#[inline]
pub fn record_load(outcome: &str) {
    SEGMENT_LOADS.with_label_values(&[outcome]).inc();
}
