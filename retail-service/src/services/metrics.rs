//! Prometheus metrics for retail-service.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};

/// Store operation duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "retail_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Checkouts by outcome: created, replayed, rejected, conflict, failed.
pub static CHECKOUTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("retail_checkouts_total", "Checkout attempts by outcome"),
        &["outcome"]
    )
    .expect("Failed to register CHECKOUTS_TOTAL")
});

pub static CHECKOUT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "retail_checkout_duration_seconds",
            "Checkout duration",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        ),
        &["outcome"]
    )
    .expect("Failed to register CHECKOUT_DURATION")
});

pub static STOCK_ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("retail_stock_alerts_total", "Stock alerts by kind and outcome"),
        &["kind", "outcome"]
    )
    .expect("Failed to register STOCK_ALERTS_TOTAL")
});

pub static REMINDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "retail_payment_reminders_total",
            "Payment reminders by type and delivery outcome"
        ),
        &["reminder_type", "outcome"]
    )
    .expect("Failed to register REMINDERS_TOTAL")
});

pub static REMINDER_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("retail_reminder_runs_total", "Reminder batch runs by status"),
        &["status"]
    )
    .expect("Failed to register REMINDER_RUNS_TOTAL")
});

pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "retail_notifications_total",
            "Outbound notifications by provider and outcome"
        ),
        &["provider", "outcome"]
    )
    .expect("Failed to register NOTIFICATIONS_TOTAL")
});

/// Error counter for alerting
pub static ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("retail_errors_total", "Total errors by type for alerting"),
        &["error_type", "operation"]
    )
    .expect("Failed to register ERRORS_TOTAL")
});

/// Register every metric. Call once at startup so `/metrics` lists them
/// before first use.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&CHECKOUTS_TOTAL);
    Lazy::force(&CHECKOUT_DURATION);
    Lazy::force(&STOCK_ALERTS_TOTAL);
    Lazy::force(&REMINDERS_TOTAL);
    Lazy::force(&REMINDER_RUNS_TOTAL);
    Lazy::force(&NOTIFICATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_checkout(outcome: &str, duration_secs: f64) {
    CHECKOUTS_TOTAL.with_label_values(&[outcome]).inc();
    CHECKOUT_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

pub fn record_stock_alert(kind: &str, outcome: &str) {
    STOCK_ALERTS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_reminder(reminder_type: &str, outcome: &str) {
    REMINDERS_TOTAL
        .with_label_values(&[reminder_type, outcome])
        .inc();
}

pub fn record_reminder_run(status: &str) {
    REMINDER_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_notification(provider: &str, outcome: &str) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[provider, outcome])
        .inc();
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, operation])
        .inc();
}
