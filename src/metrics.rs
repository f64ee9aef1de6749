// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for content-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `content_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: publish, sort, clear, refresh, reload, ...
//! - `status`: success, noop, error
//! - `source`: file, store, empty

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a public cache operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "content_cache_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "content_cache_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a commit of a new published tree
pub fn record_commit(registered: bool) {
    counter!(
        "content_cache_commits_total",
        "registered" => if registered { "true" } else { "false" }
    )
    .increment(1);
}

/// Set the number of nodes in the published tree
pub fn set_tree_nodes(count: usize) {
    gauge!("content_cache_tree_nodes").set(count as f64);
}

/// Set the published generation
pub fn set_generation(generation: u64) {
    gauge!("content_cache_generation").set(generation as f64);
}

/// Record where a load came from
pub fn record_load(source: &str, duration: Duration) {
    counter!(
        "content_cache_loads_total",
        "source" => source.to_string()
    )
    .increment(1);
    histogram!(
        "content_cache_load_seconds",
        "source" => source.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record rows dropped during assembly (orphans, unparsable payloads)
pub fn record_dropped_rows(reason: &str, count: usize) {
    counter!(
        "content_cache_dropped_rows_total",
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

/// Record a file write attempt
pub fn record_persist(status: &str, duration: Duration) {
    counter!(
        "content_cache_persist_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("content_cache_persist_seconds").record(duration.as_secs_f64());
}

/// Record bytes written to the durable file
pub fn record_persist_bytes(bytes: usize) {
    counter!("content_cache_persist_bytes_total").increment(bytes as u64);
}

/// Record a debounced write request
pub fn record_touch(accepted: bool) {
    counter!(
        "content_cache_persist_requests_total",
        "accepted" => if accepted { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a reload triggered by an out-of-process file change
pub fn record_stale_reload() {
    counter!("content_cache_stale_reloads_total").increment(1);
}

/// Record an error with category for alerting
pub fn record_error(component: &str, operation: &str, error_type: &str) {
    counter!(
        "content_cache_errors_total",
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Set file ownership (1 = this process writes the file)
pub fn set_file_owner(owner: bool) {
    gauge!("content_cache_file_owner").set(if owner { 1.0 } else { 0.0 });
}

/// Times an operation and records its latency on drop.
///
/// ```
/// use content_cache::metrics::LatencyTimer;
///
/// {
///     let _timer = LatencyTimer::new("publish");
///     // ... work ...
/// } // latency recorded here
/// ```
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
