//! Bounded pool of compact entity identifiers
//!
//! Hands out small integers that stand in for full entity ids in
//! network-facing messages. Freed ids are reused smallest-first so
//! encodings stay compact. Acquisition waits a short bounded interval
//! when the pool is empty and then fails; exhaustion is an expected
//! condition callers degrade on, never a panic.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::grid::entity::ShortId;
use crate::grid::GridError;

/// Pool size; usable ids are `1..DEFAULT_POOL_SIZE`
pub const DEFAULT_POOL_SIZE: u16 = 1000;

/// How long an acquire may wait for a freed id before failing
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(10);

struct PoolInner {
    free: BinaryHeap<Reverse<ShortId>>,
    owners: FxHashMap<String, ShortId>,
}

/// Min-ordered pool of short ids with per-owner idempotent assignment
pub struct ShortIdPool {
    inner: Mutex<PoolInner>,
    freed: Condvar,
    timeout: Duration,
}

impl ShortIdPool {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_POOL_SIZE)
    }

    pub fn with_size(size: u16) -> Self {
        Self::with_size_and_timeout(size, ACQUIRE_TIMEOUT)
    }

    pub fn with_size_and_timeout(size: u16, timeout: Duration) -> Self {
        let mut free = BinaryHeap::with_capacity(size.saturating_sub(1) as usize);
        for id in 1..size {
            free.push(Reverse(id));
        }
        Self {
            inner: Mutex::new(PoolInner {
                free,
                owners: FxHashMap::default(),
            }),
            freed: Condvar::new(),
            timeout,
        }
    }

    /// Assign the smallest available id to `owner`
    ///
    /// Idempotent: an owner that already holds an id gets the same id
    /// back. Waits up to the pool timeout for a release when empty, then
    /// fails with `CapacityExhausted`.
    pub fn acquire(&self, owner: &str) -> Result<ShortId, GridError> {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.owners.get(owner) {
            return Ok(id);
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(Reverse(id)) = inner.free.pop() {
                inner.owners.insert(owner.to_string(), id);
                return Ok(id);
            }
            if self.freed.wait_until(&mut inner, deadline).timed_out() {
                return Err(GridError::CapacityExhausted);
            }
        }
    }

    /// Return `owner`'s id to the pool; no-op if none is held
    pub fn release(&self, owner: &str) {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.owners.remove(owner) {
            inner.free.push(Reverse(id));
            self.freed.notify_one();
        }
    }

    /// Number of ids currently free
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Number of owners currently holding an id
    pub fn assigned(&self) -> usize {
        self.inner.lock().owners.len()
    }
}

impl Default for ShortIdPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_hands_out_smallest_first() {
        let pool = ShortIdPool::new();
        assert_eq!(pool.acquire("a").unwrap(), 1);
        assert_eq!(pool.acquire("b").unwrap(), 2);
        assert_eq!(pool.acquire("c").unwrap(), 3);
    }

    #[test]
    fn test_acquire_is_idempotent_per_owner() {
        let pool = ShortIdPool::new();
        let first = pool.acquire("a").unwrap();
        let second = pool.acquire("a").unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.assigned(), 1);
    }

    #[test]
    fn test_release_recycles_smallest_freed_id() {
        let pool = ShortIdPool::new();
        pool.acquire("a").unwrap();
        pool.acquire("b").unwrap();
        pool.acquire("c").unwrap();

        pool.release("a");
        pool.release("b");

        // 1 was freed and is smaller than 2 and the never-issued 4
        assert_eq!(pool.acquire("d").unwrap(), 1);
        assert_eq!(pool.acquire("e").unwrap(), 2);
        assert_eq!(pool.acquire("f").unwrap(), 4);
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = ShortIdPool::new();
        pool.acquire("a").unwrap();
        pool.release("a");
        pool.release("a");
        assert_eq!(pool.assigned(), 0);
        assert_eq!(pool.available(), (DEFAULT_POOL_SIZE - 1) as usize);
    }

    #[test]
    fn test_distinct_owners_get_distinct_ids() {
        let pool = ShortIdPool::with_size(6);
        let ids: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|owner| pool.acquire(owner).unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn test_exhausted_pool_fails_within_timeout() {
        let pool = ShortIdPool::with_size_and_timeout(3, Duration::from_millis(10));
        pool.acquire("a").unwrap();
        pool.acquire("b").unwrap();

        let started = Instant::now();
        let result = pool.acquire("c");
        assert!(matches!(result, Err(GridError::CapacityExhausted)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_waiter_picks_up_concurrent_release() {
        use std::sync::Arc;

        let pool = Arc::new(ShortIdPool::with_size_and_timeout(
            2,
            Duration::from_millis(200),
        ));
        pool.acquire("a").unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.acquire("b"))
        };
        std::thread::sleep(Duration::from_millis(20));
        pool.release("a");

        assert_eq!(waiter.join().unwrap().unwrap(), 1);
    }
}
