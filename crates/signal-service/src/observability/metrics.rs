//! Metrics definitions for the signal service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signal_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `verb`: 7 values (the signaling verbs) plus the lookup endpoints
//! - `status`: `success` or a `SignalError::metric_label()` value
//! - `operation`: bounded by code (create_signal_invite, handle_signal_invitation, etc.)
//!
//! Room and user identifiers are never used as labels.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Verb latency includes provider round-trips
        .set_buckets_for_metric(
            Matcher::Prefix("signal_verb".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set verb buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("signal_redis".to_string()),
            &[0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100],
        )
        .map_err(|e| format!("Failed to set Redis buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("signal_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("signal_provider".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set provider buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("signal_busy_line_scan_rooms".to_string()),
            &[0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0],
        )
        .map_err(|e| format!("Failed to set busy-line scan buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Verb Metrics
// ============================================================================

/// Record a completed signaling verb.
///
/// Metric: `signal_verb_duration_seconds`, `signal_verbs_total`
/// Labels: `verb`, `status`
pub fn record_verb(verb: &'static str, status: &'static str, duration: Duration) {
    histogram!("signal_verb_duration_seconds",
        "verb" => verb,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("signal_verbs_total",
        "verb" => verb,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Storage Metrics
// ============================================================================

/// Record Redis operation latency.
///
/// Metric: `signal_redis_latency_seconds`
/// Labels: `operation`
pub fn record_redis_latency(operation: &'static str, duration: Duration) {
    histogram!("signal_redis_latency_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

/// Record database query execution.
///
/// Metric: `signal_db_query_duration_seconds`, `signal_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("signal_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("signal_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// RTC Provider Metrics
// ============================================================================

/// Record an RTC provider API call.
///
/// Metric: `signal_provider_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_provider_call(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("signal_provider_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());
}

/// Record how many rooms one busy-line scan walked.
///
/// Metric: `signal_busy_line_scan_rooms`
pub fn record_busy_line_scan(rooms_scanned: usize) {
    histogram!("signal_busy_line_scan_rooms").record(rooms_scanned as f64);
}

/// Record invitees skipped because they already had an unhandled invitation.
///
/// Metric: `signal_unhandled_invitees_total`
pub fn record_unhandled_invitees(count: usize) {
    if count > 0 {
        counter!("signal_unhandled_invitees_total").increment(count as u64);
    }
}
