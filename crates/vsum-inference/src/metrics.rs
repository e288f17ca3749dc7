//! Inference metrics collection.
//!
//! Provides standardized metrics for monitoring model endpoint calls:
//! - Attempt counters by backend and outcome
//! - Latency histograms
//! - Backoff delay histograms

use std::time::Duration;

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total endpoint submissions by backend and outcome.
    pub const ATTEMPTS_TOTAL: &str = "vsum_inference_attempts_total";

    /// Total rate-limit signals received by backend.
    pub const RATE_LIMITED_TOTAL: &str = "vsum_inference_rate_limited_total";

    /// Submission latency in seconds by backend.
    pub const LATENCY_SECONDS: &str = "vsum_inference_latency_seconds";

    /// Backoff wait in seconds by backend.
    pub const BACKOFF_SECONDS: &str = "vsum_inference_backoff_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed submission.
pub fn record_attempt(backend: &str, outcome: &str, latency: Duration) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "backend" => backend.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "backend" => backend.to_string()
    )
    .record(latency.as_secs_f64());

    if outcome == "rate_limited" {
        counter!(
            names::RATE_LIMITED_TOTAL,
            "backend" => backend.to_string()
        )
        .increment(1);
    }
}

/// Record a backoff wait before a retry.
pub fn record_backoff(backend: &str, delay: Duration) {
    histogram!(
        names::BACKOFF_SECONDS,
        "backend" => backend.to_string()
    )
    .record(delay.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::ATTEMPTS_TOTAL.contains("attempts"));
        assert!(names::RATE_LIMITED_TOTAL.contains("rate_limited"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
        assert!(names::BACKOFF_SECONDS.contains("backoff"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_attempt("chat", "success", Duration::from_millis(120));
        record_attempt("chat", "rate_limited", Duration::from_millis(40));
        record_backoff("chat", Duration::from_secs(1));
    }
}
