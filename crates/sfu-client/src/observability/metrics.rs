//! Metrics definitions for the SFU client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sfu_client_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Negotiation Outcomes (Counters)
// ============================================================================

/// Record the outcome of one consume attempt.
///
/// Metric: `sfu_client_consume_total`
/// Labels: `kind`, `outcome`
///
/// Outcomes: success, cannot_consume, consume_failed, timeout, error
pub fn record_consume(kind: &str, outcome: &str) {
    counter!(
        "sfu_client_consume_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the outcome of one transport connect handshake.
///
/// Metric: `sfu_client_transport_connect_total`
/// Labels: `direction`, `outcome`
///
/// Outcomes: success, rejected, timeout, error
pub fn record_transport_connect(direction: &str, outcome: &str) {
    counter!(
        "sfu_client_transport_connect_total",
        "direction" => direction.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the outcome of one producer registration.
///
/// Metric: `sfu_client_produce_total`
/// Labels: `kind`, `outcome`
///
/// Outcomes: success, rejected, error
pub fn record_produce(kind: &str, outcome: &str) {
    counter!(
        "sfu_client_produce_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Signaling (Counters, Histograms)
// ============================================================================

/// Record a signaling request that hit its timeout.
///
/// Metric: `sfu_client_signaling_timeouts_total`
/// Labels: `topic`
pub fn record_signaling_timeout(topic: &str) {
    counter!("sfu_client_signaling_timeouts_total", "topic" => topic.to_string()).increment(1);
}

/// Record signaling round trip latency, including failed round trips.
///
/// Metric: `sfu_client_signaling_latency_seconds`
/// Labels: `topic`
pub fn record_signaling_latency(topic: &str, duration: Duration) {
    histogram!("sfu_client_signaling_latency_seconds", "topic" => topic.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Registry (Gauges)
// ============================================================================

/// Set the number of published consumer entries.
///
/// Metric: `sfu_client_registry_entries`
/// Labels: none
pub fn set_registry_entries(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("sfu_client_registry_entries").set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_metric_functions_without_recorder() {
        // No recorder installed: calls must be no-ops
        record_consume("audio", "success");
        record_transport_connect("receive", "timeout");
        record_produce("video", "rejected");
        record_signaling_timeout("consumeMedia");
        record_signaling_latency("joinRoom", Duration::from_millis(12));
        set_registry_entries(3);
    }

    #[test]
    fn test_metrics_recorded_with_expected_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_consume("video", "cannot_consume");
            record_consume("video", "cannot_consume");
            record_transport_connect("send", "success");
            record_produce("audio", "success");
            record_signaling_timeout("unpauseConsumer");
            record_signaling_latency("connectTransport", Duration::from_millis(40));
            set_registry_entries(2);
        });

        let metrics = snapshotter.snapshot().into_vec();
        let names: Vec<String> = metrics
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "sfu_client_consume_total",
            "sfu_client_transport_connect_total",
            "sfu_client_produce_total",
            "sfu_client_signaling_timeouts_total",
            "sfu_client_signaling_latency_seconds",
            "sfu_client_registry_entries",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }

        let consume = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "sfu_client_consume_total")
            .map(|(_, _, _, value)| value.clone())
            .unwrap();
        assert_eq!(*consume, DebugValue::Counter(2));
    }
}
