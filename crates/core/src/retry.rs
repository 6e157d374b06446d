// SPDX-License-Identifier: MIT

//! File-side retry queue entries and drop policy (spec.md §3, §4.4.4).

use crate::labels::LabelMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub line: String,
    pub labels: LabelMap,
    pub source_id: String,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
}

impl RetryEntry {
    pub fn new(line: String, labels: LabelMap, source_id: String, now: DateTime<Utc>, initial_delay: chrono::Duration) -> Self {
        Self {
            line,
            labels,
            source_id,
            attempts: 1,
            next_retry_at: now + initial_delay,
            added_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }

    /// Schedules the next attempt with exponential backoff capped at
    /// `max_delay` (spec.md §4.4.4).
    pub fn schedule_retry(&mut self, now: DateTime<Utc>, initial_delay: chrono::Duration, multiplier: f64, max_delay: chrono::Duration) {
        self.attempts += 1;
        let exponent = (self.attempts - 1) as i32;
        let scaled_ms = (initial_delay.num_milliseconds() as f64) * multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(max_delay.num_milliseconds() as f64).max(0.0);
        self.next_retry_at = now + chrono::Duration::milliseconds(capped_ms as i64);
    }

    /// Drop conditions (spec.md §4.4.4): `age > max_age` OR `attempts > max_attempts`.
    pub fn should_give_up(&self, now: DateTime<Utc>, max_age: chrono::Duration, max_attempts: u32) -> bool {
        now - self.added_at > max_age || self.attempts > max_attempts
    }
}

/// Drop policy applied when the retry queue is full and a new entry arrives
/// (spec.md §4.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    Oldest,
    Newest,
    Random,
}

impl Default for DropPolicy {
    fn default() -> Self {
        DropPolicy::Oldest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelMap {
        LabelMap::new()
    }

    #[test]
    fn schedule_retry_backs_off_exponentially_and_caps() {
        let now = DateTime::UNIX_EPOCH;
        let mut entry = RetryEntry::new("line".into(), labels(), "src".into(), now, chrono::Duration::seconds(1));
        let initial = chrono::Duration::seconds(1);
        let max = chrono::Duration::seconds(10);

        entry.schedule_retry(now, initial, 2.0, max);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.next_retry_at - now, chrono::Duration::seconds(2));

        entry.schedule_retry(now, initial, 2.0, max);
        assert_eq!(entry.next_retry_at - now, chrono::Duration::seconds(4));

        for _ in 0..5 {
            entry.schedule_retry(now, initial, 2.0, max);
        }
        assert_eq!(entry.next_retry_at - now, max);
    }

    #[test]
    fn should_give_up_on_age_or_attempts() {
        let now = DateTime::UNIX_EPOCH;
        let mut entry = RetryEntry::new("line".into(), labels(), "src".into(), now, chrono::Duration::seconds(1));
        assert!(!entry.should_give_up(now, chrono::Duration::minutes(5), 10));

        let later = now + chrono::Duration::minutes(6);
        assert!(entry.should_give_up(later, chrono::Duration::minutes(5), 10));

        entry.attempts = 11;
        assert!(entry.should_give_up(now, chrono::Duration::minutes(5), 10));
    }

    #[test]
    fn is_due_compares_against_next_retry_at() {
        let now = DateTime::UNIX_EPOCH;
        let entry = RetryEntry::new("line".into(), labels(), "src".into(), now, chrono::Duration::seconds(5));
        assert!(!entry.is_due(now));
        assert!(entry.is_due(now + chrono::Duration::seconds(5)));
    }
}
