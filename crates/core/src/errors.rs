// SPDX-License-Identifier: MIT

//! Shared error taxonomy (spec.md §7). Kinds, not one giant enum: each
//! component that can fail defines its own `thiserror` enum at its own
//! crate boundary (`DispatchError` in `ltap-engine`, `PositionStoreError`
//! in `ltap-storage`, ...); this module holds the vocabulary shared across
//! those boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The outcome of validating a single record's timestamp (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampAction {
    Accept,
    Clamp,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampValidation {
    pub valid: bool,
    pub action: TimestampAction,
    pub reason: Option<String>,
}

/// Validates a candidate timestamp against wall-clock `now` and a skew
/// tolerance, per the configured policy action (spec.md §7). `policy`
/// controls what happens to an out-of-bounds timestamp; `now` establishes
/// the tolerance window.
pub fn validate_timestamp(
    candidate: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
    skew_tolerance: chrono::Duration,
    policy: TimestampAction,
) -> TimestampValidation {
    if candidate <= now + skew_tolerance && candidate >= now - skew_tolerance {
        return TimestampValidation { valid: true, action: TimestampAction::Accept, reason: None };
    }
    match policy {
        TimestampAction::Accept => TimestampValidation { valid: true, action: TimestampAction::Accept, reason: Some("accepted despite skew per policy".into()) },
        TimestampAction::Clamp => TimestampValidation { valid: true, action: TimestampAction::Clamp, reason: Some("clamped to now".into()) },
        TimestampAction::Reject => TimestampValidation { valid: false, action: TimestampAction::Reject, reason: Some("timestamp outside skew tolerance".into()) },
    }
}

/// Error kind reported on every structured failure log (spec.md §7:
/// "structured log entries carrying component, task_id, error_type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientDispatch,
    RecordLevel,
    StreamLevel,
    PlannedRotation,
    Cancellation,
    ResourceExhaustion,
    TimestampValidation,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientDispatch => "transient_dispatch",
            ErrorKind::RecordLevel => "record_level",
            ErrorKind::StreamLevel => "stream_level",
            ErrorKind::PlannedRotation => "planned_rotation",
            ErrorKind::Cancellation => "cancellation",
            ErrorKind::ResourceExhaustion => "resource_exhaustion",
            ErrorKind::TimestampValidation => "timestamp_validation",
            ErrorKind::Fatal => "fatal",
        }
    }
}

/// Fatal construction-time errors (spec.md §7: "missing logger, missing
/// dispatcher at construction; configuration that cannot be parsed;
/// inability to connect to the container runtime at startup").
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("missing required dependency: {0}")]
    MissingDependency(&'static str),
    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),
}
