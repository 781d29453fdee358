//! Metric instrument factories for didlist.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! When no provider is installed these are no-ops.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry_semantic_conventions::attribute::HTTP_RESPONSE_STATUS_CODE;

use crate::model::QueueStats;

fn meter() -> Meter {
    opentelemetry::global::meter("didlist")
}

/// Counter: enqueue attempts.
/// Labels: `result` ("queued" | "duplicate" | "full" | "not_ready").
pub fn enqueued() -> Counter<u64> {
    meter()
        .u64_counter("didlist.queue.enqueued")
        .with_description("Identifiers offered to the work queue")
        .build()
}

/// Counter: remote submissions.
/// Labels: `result` ("success" | "quota_exceeded" | "transient" | "permanent"),
/// plus the HTTP status when one was returned.
pub fn submissions() -> Counter<u64> {
    meter()
        .u64_counter("didlist.submissions")
        .with_description("Remote list entry submissions")
        .build()
}

/// Counter: snapshot saves.
/// Labels: `file` ("pending" | "added"), `result` ("ok" | "error").
pub fn snapshot_saves() -> Counter<u64> {
    meter()
        .u64_counter("didlist.snapshot.saves")
        .with_description("Snapshot file writes")
        .build()
}

/// Histogram: remote submission latency in milliseconds.
pub fn submission_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("didlist.submission.duration_ms")
        .with_description("Remote submission latency in milliseconds")
        .with_unit("ms")
        .build()
}

/// Histogram: set sizes, sampled on the diagnostic timer.
/// Labels: `set` ("added" | "pending" | "in_flight").
pub fn queue_size() -> Histogram<u64> {
    meter()
        .u64_histogram("didlist.queue.size")
        .with_description("Sampled work queue set sizes")
        .build()
}

/// Record one submission result.
pub fn record_submission(result: &str, status: Option<u16>, duration_ms: f64) {
    let mut labels = vec![KeyValue::new("result", result.to_string())];
    if let Some(status) = status {
        labels.push(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status)));
    }
    submissions().add(1, &labels);
    submission_duration_ms().record(duration_ms, &[KeyValue::new("result", result.to_string())]);
}

/// Sample all three set sizes.
pub fn record_queue_stats(stats: QueueStats) {
    let histogram = queue_size();
    histogram.record(stats.added as u64, &[KeyValue::new("set", "added")]);
    histogram.record(stats.pending as u64, &[KeyValue::new("set", "pending")]);
    histogram.record(stats.in_flight as u64, &[KeyValue::new("set", "in_flight")]);
}
