// SPDX-License-Identifier: MIT

//! Process-wide metrics surface (spec.md §4.6, §9 Design Notes: "Global
//! mutable state"). A single [`Metrics`] value is constructed once at
//! process start and passed by reference into every component
//! constructor; nothing in this workspace calls the `metrics` crate's
//! macros directly outside this module, so tests can swap in
//! [`Metrics::noop`] without a global recorder ever being installed.

use metrics::{counter, gauge, histogram, Label};

#[derive(Clone, Default)]
pub struct Metrics {
    /// When true, calls are no-ops: no recorder needs to be installed.
    /// Used by tests that construct components without a process-wide
    /// metrics exporter (spec.md §4.6: "Tests may swap in a null
    /// implementation").
    noop: bool,
}

impl Metrics {
    pub fn new() -> Self {
        Self { noop: false }
    }

    pub fn noop() -> Self {
        Self { noop: true }
    }

    fn guard(&self) -> bool {
        !self.noop
    }

    pub fn logs_processed(&self, source_type: &str, source_id: &str, component: &'static str) {
        if self.guard() {
            counter!(
                "logs_processed",
                vec![Label::new("source_type", source_type.to_string()), Label::new("source_id", source_id.to_string()), Label::new("component", component)]
            )
            .increment(1);
        }
    }

    pub fn errors(&self, component: &'static str, error_type: &'static str) {
        if self.guard() {
            counter!("errors", "component" => component, "error_type" => error_type).increment(1);
        }
    }

    pub fn drops(&self, component: &'static str, reason: &'static str) {
        if self.guard() {
            counter!("drops", "component" => component, "reason" => reason).increment(1);
        }
    }

    pub fn retries_queued(&self, component: &'static str) {
        if self.guard() {
            counter!("retries_queued", "component" => component).increment(1);
        }
    }

    pub fn retries_success(&self, component: &'static str) {
        if self.guard() {
            counter!("retries_success", "component" => component).increment(1);
        }
    }

    pub fn retries_failed(&self, component: &'static str) {
        if self.guard() {
            counter!("retries_failed", "component" => component).increment(1);
        }
    }

    pub fn retries_give_up(&self, component: &'static str) {
        if self.guard() {
            counter!("retries_give_up", "component" => component).increment(1);
        }
    }

    pub fn old_logs_ignored(&self, component: &'static str, source: &str) {
        if self.guard() {
            counter!("old_logs_ignored", "component" => component, "source" => source.to_string()).increment(1);
        }
    }

    pub fn stream_errors(&self, error_type: &'static str, source_id: &str) {
        if self.guard() {
            counter!("stream_errors", "error_type" => error_type, "source_id" => source_id.to_string()).increment(1);
        }
    }

    pub fn set_active_streams(&self, count: u64) {
        if self.guard() {
            gauge!("active_streams").set(count as f64);
        }
    }

    pub fn set_queue_size(&self, size: u64) {
        if self.guard() {
            gauge!("queue_size").set(size as f64);
        }
    }

    pub fn set_queue_utilization(&self, ratio: f64) {
        if self.guard() {
            gauge!("queue_utilization").set(ratio);
        }
    }

    pub fn set_files_monitored(&self, count: u64) {
        if self.guard() {
            gauge!("files_monitored_total").set(count as f64);
        }
    }

    pub fn set_container_streams_active(&self, count: u64) {
        if self.guard() {
            gauge!("container_streams_active").set(count as f64);
        }
    }

    pub fn set_component_health(&self, component: &'static str, name: &str, healthy: bool) {
        if self.guard() {
            gauge!("component_health", "component" => component, "name" => name.to_string()).set(if healthy { 1.0 } else { 0.0 });
        }
    }

    pub fn record_processing_duration(&self, component: &'static str, operation: &'static str, duration: std::time::Duration) {
        if self.guard() {
            histogram!("processing_duration_seconds", "component" => component, "operation" => operation).record(duration.as_secs_f64());
        }
    }

    pub fn record_sink_send_duration(&self, sink: &str, duration: std::time::Duration) {
        if self.guard() {
            histogram!("sink_send_duration_seconds", "sink" => sink.to_string()).record(duration.as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_do_not_panic_without_a_recorder() {
        let metrics = Metrics::noop();
        metrics.logs_processed("file", "abc123", "file_supervisor");
        metrics.errors("dispatcher", "queue_full");
        metrics.set_queue_size(10);
    }
}
