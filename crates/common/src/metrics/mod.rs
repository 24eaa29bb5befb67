//! Metrics and observability utilities
//!
//! Standardized counter/histogram names for the chat, auth, and email
//! paths, registered once at startup.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all Cortexify metrics
pub const METRICS_PREFIX: &str = "cortexify";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_chat_exchanges_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat exchanges processed (one user message + one reply)"
    );

    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total completion provider requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion provider latency in seconds"
    );

    describe_counter!(
        format!("{}_otp_issued_total", METRICS_PREFIX),
        Unit::Count,
        "Total OTPs issued"
    );

    describe_counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        Unit::Count,
        "Total outbound email attempts"
    );

    tracing::info!("Metrics registered");
}

/// Record one completed chat exchange
pub fn record_chat_exchange(streamed: bool) {
    let mode = if streamed { "stream" } else { "single" };

    counter!(
        format!("{}_chat_exchanges_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Record a completion provider request
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record an issued OTP
pub fn record_otp_issued(purpose: &str) {
    counter!(
        format!("{}_otp_issued_total", METRICS_PREFIX),
        "purpose" => purpose.to_string()
    )
    .increment(1);
}

/// Record an outbound email attempt
pub fn record_email(success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_does_not_panic_without_recorder() {
        register_metrics();
        record_chat_exchange(false);
        record_completion(0.2, "echo", true);
        record_otp_issued("verification");
        record_email(true);
    }
}
