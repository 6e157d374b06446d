// SPDX-License-Identifier: MIT

//! The value flowing through the capture pipeline (spec.md §3).

use crate::labels::LabelMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Container,
}

impl SourceType {
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Container => "container",
        }
    }
}

/// A single captured, enriched log line, ready for dispatch to sinks.
///
/// Invariants (spec.md §3):
/// - `timestamp <= processed_at + skew_tolerance`
/// - `labels` is never shared between concurrently dispatched records
/// - `message` is non-empty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub source_type: SourceType,
    pub source_id: String,
    pub message: String,
    pub labels: LabelMap,
    pub trace_id: Uuid,
}

impl LogRecord {
    /// Builds a record with `processed_at = now` and a fresh trace id.
    /// `message` must already be non-empty and newline-stripped; callers
    /// (the file/container supervisors) are responsible for dropping empty
    /// lines before calling this (spec.md §3).
    pub fn new(
        now_utc: DateTime<Utc>,
        timestamp: DateTime<Utc>,
        source_type: SourceType,
        source_id: impl Into<String>,
        message: impl Into<String>,
        labels: LabelMap,
    ) -> Self {
        Self {
            timestamp,
            processed_at: now_utc,
            source_type,
            source_id: source_id.into(),
            message: message.into(),
            labels,
            trace_id: crate::id::new_trace_id(),
        }
    }

    /// Whether `timestamp` is within `skew_tolerance` of `processed_at`
    /// (spec.md §3 invariant). Timestamps in the future beyond tolerance
    /// are typically produced by a misbehaving source clock.
    pub fn within_skew_tolerance(&self, skew_tolerance: chrono::Duration) -> bool {
        self.timestamp <= self.processed_at + skew_tolerance
    }
}
