// SPDX-License-Identifier: MIT

//! Bounded, per-source retry queue for records a sink rejected
//! (spec.md §4.4). Exponential backoff and give-up are delegated to
//! [`ltap_core::retry::RetryEntry`]; this module owns the bound, the drop
//! policy, and the pop-when-due scan.

use ltap_core::retry::{DropPolicy, RetryEntry};
use ltap_core::{Clock, LabelMap};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct RetryQueueConfig {
    pub max_size: usize,
    pub drop_policy: DropPolicy,
    pub initial_delay: chrono::Duration,
    pub max_delay: chrono::Duration,
    pub backoff_multiplier: f64,
    pub max_age: chrono::Duration,
    pub max_attempts: u32,
}

struct Inner<C: Clock> {
    clock: C,
    config: RetryQueueConfig,
    entries: Mutex<VecDeque<RetryEntry>>,
}

/// One bounded queue per source (spec.md §4.4: "retry queues are scoped
/// per source so one noisy file cannot starve another's retries").
#[derive(Clone)]
pub struct RetryQueue<C: Clock> {
    inner: Arc<Inner<C>>,
}

pub enum EnqueueOutcome {
    Accepted,
    /// The queue was full and `dropped` was evicted to make room.
    DroppedExisting(RetryEntry),
    /// The queue was full and the incoming entry itself was the one dropped
    /// (this is what `DropPolicy::Newest` means).
    DroppedIncoming,
}

impl<C: Clock> RetryQueue<C> {
    pub fn new(clock: C, config: RetryQueueConfig) -> Self {
        Self { inner: Arc::new(Inner { clock, config, entries: Mutex::new(VecDeque::new()) }) }
    }

    pub fn enqueue(&self, line: String, labels: LabelMap, source_id: String) -> EnqueueOutcome {
        let now = self.inner.clock.now_utc();
        let mut entry = RetryEntry { line, labels, source_id, attempts: 0, next_retry_at: now, added_at: now };
        entry.schedule_retry(now, self.inner.config.initial_delay, self.inner.config.backoff_multiplier, self.inner.config.max_delay);

        let mut entries = self.inner.entries.lock();
        if entries.len() < self.inner.config.max_size {
            entries.push_back(entry);
            return EnqueueOutcome::Accepted;
        }

        match self.inner.config.drop_policy {
            DropPolicy::Oldest => {
                let dropped = entries.pop_front();
                entries.push_back(entry);
                match dropped {
                    Some(dropped) => EnqueueOutcome::DroppedExisting(dropped),
                    None => EnqueueOutcome::Accepted,
                }
            }
            DropPolicy::Newest => EnqueueOutcome::DroppedIncoming,
            DropPolicy::Random => {
                let index = rand::rng().random_range(0..entries.len());
                let dropped = entries.remove(index);
                entries.push_back(entry);
                match dropped {
                    Some(dropped) => EnqueueOutcome::DroppedExisting(dropped),
                    None => EnqueueOutcome::Accepted,
                }
            }
        }
    }

    /// Removes and returns every entry whose `next_retry_at` has elapsed,
    /// advancing their attempt counters. Entries past `max_age`/
    /// `max_attempts` are returned separately as given-up.
    pub fn drain_due(&self) -> (Vec<RetryEntry>, Vec<RetryEntry>) {
        let now = self.inner.clock.now_utc();
        let mut entries = self.inner.entries.lock();
        let mut due = Vec::new();
        let mut given_up = Vec::new();
        let mut remaining = VecDeque::with_capacity(entries.len());

        for entry in entries.drain(..) {
            if entry.should_give_up(now, self.inner.config.max_age, self.inner.config.max_attempts) {
                given_up.push(entry);
            } else if entry.is_due(now) {
                due.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        *entries = remaining;
        (due, given_up)
    }

    /// Re-enqueues an entry that failed another retry attempt, bumping its
    /// backoff. Call sites own incrementing `attempts` before calling this.
    pub fn reschedule(&self, mut entry: RetryEntry) {
        let now = self.inner.clock.now_utc();
        entry.schedule_retry(now, self.inner.config.initial_delay, self.inner.config.backoff_multiplier, self.inner.config.max_delay);
        self.inner.entries.lock().push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltap_core::FakeClock;

    fn config(max_size: usize, drop_policy: DropPolicy) -> RetryQueueConfig {
        RetryQueueConfig {
            max_size,
            drop_policy,
            initial_delay: chrono::Duration::milliseconds(100),
            max_delay: chrono::Duration::seconds(30),
            backoff_multiplier: 2.0,
            max_age: chrono::Duration::hours(1),
            max_attempts: 10,
        }
    }

    #[test]
    fn oldest_policy_evicts_front_when_full() {
        let clock = FakeClock::new();
        let queue = RetryQueue::new(clock, config(2, DropPolicy::Oldest));
        queue.enqueue("a".into(), LabelMap::default(), "src".into());
        queue.enqueue("b".into(), LabelMap::default(), "src".into());
        let outcome = queue.enqueue("c".into(), LabelMap::default(), "src".into());
        assert!(matches!(outcome, EnqueueOutcome::DroppedExisting(ref e) if e.line == "a"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn newest_policy_drops_incoming_when_full() {
        let clock = FakeClock::new();
        let queue = RetryQueue::new(clock, config(1, DropPolicy::Newest));
        queue.enqueue("a".into(), LabelMap::default(), "src".into());
        let outcome = queue.enqueue("b".into(), LabelMap::default(), "src".into());
        assert!(matches!(outcome, EnqueueOutcome::DroppedIncoming));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_due_only_returns_elapsed_entries() {
        let clock = FakeClock::new();
        let queue = RetryQueue::new(clock.clone(), config(10, DropPolicy::Oldest));
        queue.enqueue("a".into(), LabelMap::default(), "src".into());
        let (due, given_up) = queue.drain_due();
        assert!(due.is_empty());
        assert!(given_up.is_empty());

        clock.advance(std::time::Duration::from_millis(150));
        let (due, given_up) = queue.drain_due();
        assert_eq!(due.len(), 1);
        assert!(given_up.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn entries_past_max_age_are_given_up_not_retried() {
        let clock = FakeClock::new();
        let mut cfg = config(10, DropPolicy::Oldest);
        cfg.max_age = chrono::Duration::seconds(1);
        let queue = RetryQueue::new(clock.clone(), cfg);
        queue.enqueue("a".into(), LabelMap::default(), "src".into());

        clock.advance(std::time::Duration::from_secs(2));
        let (due, given_up) = queue.drain_due();
        assert!(due.is_empty());
        assert_eq!(given_up.len(), 1);
    }

    #[test]
    fn reschedule_applies_exponential_backoff() {
        let clock = FakeClock::new();
        let queue = RetryQueue::new(clock.clone(), config(10, DropPolicy::Oldest));
        queue.enqueue("a".into(), LabelMap::default(), "src".into());
        clock.advance(std::time::Duration::from_millis(100));
        let (mut due, _) = queue.drain_due();
        let entry = due.pop().unwrap();
        assert_eq!(entry.attempts, 1);
        queue.reschedule(entry);

        clock.advance(std::time::Duration::from_millis(150));
        let (due, _) = queue.drain_due();
        assert!(due.is_empty(), "backoff should have doubled past the first delay");
    }
}
