//! Prometheus metrics for the ledger engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

use crate::error::LedgerError;

/// Operation counter by operation and outcome.
pub static OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_operations_total",
        "Total number of ledger operations",
        &["operation", "status"] // ok, error - not account_id to avoid cardinality explosion
    )
    .expect("Failed to register operations_total")
});

/// Operation duration histogram by operation.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_operation_duration_seconds",
        "Ledger operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register operation_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_errors_total",
        "Total number of errors by type",
        &["error_type"] // insufficient_funds, busy, storage_failure, etc.
    )
    .expect("Failed to register errors_total")
});

/// Accounts opened counter.
pub static ACCOUNTS_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledger_accounts_opened_total",
        "Total number of accounts opened"
    )
    .expect("Failed to register accounts_opened")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&OPERATIONS_TOTAL);
    Lazy::force(&OPERATION_DURATION);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&ACCOUNTS_OPENED);
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

/// Record an operation outcome, including the error type on failure.
pub fn record_operation<T>(operation: &str, result: &Result<T, LedgerError>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    if let Err(error) = result {
        ERRORS_TOTAL.with_label_values(&[error.kind()]).inc();
    }
}

/// Record an account opening.
pub fn record_account_opened() {
    ACCOUNTS_OPENED.inc();
}
