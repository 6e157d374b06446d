// SPDX-License-Identifier: MIT

//! Concurrency limiter bounding active container log streams
//! (spec.md §4.5.1). Capacity is enforced by counting entries in a
//! mutex-guarded map rather than a semaphore, so the pool can also answer
//! per-id diagnostic questions ("which containers are active, and since
//! when") that a bare semaphore cannot.

use ltap_core::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtCapacity;

struct Inner<C: Clock> {
    clock: C,
    capacity: usize,
    active: Mutex<HashMap<String, std::time::Instant>>,
}

#[derive(Clone)]
pub struct StreamPool<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> StreamPool<C> {
    pub fn new(clock: C, capacity: usize) -> Self {
        Self { inner: Arc::new(Inner { clock, capacity, active: Mutex::new(HashMap::new()) }) }
    }

    /// Reserves a slot for `container_id`. Idempotent: re-acquiring an
    /// id that already holds a slot refreshes its activity time and
    /// succeeds without consuming a second slot.
    pub fn acquire(&self, container_id: &str) -> Result<(), AtCapacity> {
        let now = self.inner.clock.now();
        let mut active = self.inner.active.lock();
        if active.contains_key(container_id) {
            active.insert(container_id.to_string(), now);
            return Ok(());
        }
        if active.len() >= self.inner.capacity {
            return Err(AtCapacity);
        }
        active.insert(container_id.to_string(), now);
        Ok(())
    }

    pub fn release(&self, container_id: &str) {
        self.inner.active.lock().remove(container_id);
    }

    pub fn touch(&self, container_id: &str) {
        let now = self.inner.clock.now();
        if let Some(last_activity) = self.inner.active.lock().get_mut(container_id) {
            *last_activity = now;
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    pub fn is_active(&self, container_id: &str) -> bool {
        self.inner.active.lock().contains_key(container_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltap_core::FakeClock;

    #[test]
    fn acquire_up_to_capacity_then_fails() {
        let pool = StreamPool::new(FakeClock::new(), 2);
        assert!(pool.acquire("a").is_ok());
        assert!(pool.acquire("b").is_ok());
        assert_eq!(pool.acquire("c"), Err(AtCapacity));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn release_frees_a_slot_for_a_new_container() {
        let pool = StreamPool::new(FakeClock::new(), 1);
        pool.acquire("a").unwrap();
        assert_eq!(pool.acquire("b"), Err(AtCapacity));
        pool.release("a");
        assert!(pool.acquire("b").is_ok());
    }

    #[test]
    fn reacquiring_the_same_id_does_not_consume_a_second_slot() {
        let pool = StreamPool::new(FakeClock::new(), 1);
        pool.acquire("a").unwrap();
        assert!(pool.acquire("a").is_ok());
        assert_eq!(pool.active_count(), 1);
    }
}
