//! Per-observer memory of what was last sent about each target
//!
//! Observers re-query their neighbors every tick; most targets only need
//! their incremental movement resent. The cache decides, per (observer,
//! target) pair, between a full state, a compact delta, and a stale
//! re-anchor, with a floor refresh interval that bounds drift for
//! observers that missed updates.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::grid::entity::{EntityDelta, EntityState, NeighborEntry};
use crate::grid::short_id::ShortIdPool;

/// A pair older than this gets a full state resent instead of a delta
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Last-sent memory for one (observer, target) pair
///
/// Created on first sighting, never speculatively. Holds the raw
/// coordinates of the last send and a persistent clone of the target's
/// public state keyed by short id, kept current on every delta emission.
struct CachedObservation {
    x: i32,
    y: i32,
    last_send: Instant,
    delta: EntityDelta,
}

impl CachedObservation {
    fn new(target: &EntityState, short_id: u16, now: Instant) -> Self {
        Self {
            x: target.x,
            y: target.y,
            last_send: now,
            delta: EntityDelta::from_state(target, short_id),
        }
    }
}

/// Observer id -> target id -> last-sent memory
pub(crate) struct ObserverCache {
    observers: DashMap<String, FxHashMap<String, CachedObservation>>,
    refresh_interval: Duration,
}

impl ObserverCache {
    pub(crate) fn new() -> Self {
        Self::with_refresh_interval(REFRESH_INTERVAL)
    }

    pub(crate) fn with_refresh_interval(refresh_interval: Duration) -> Self {
        Self {
            observers: DashMap::new(),
            refresh_interval,
        }
    }

    /// Decide what to emit to `observer_id` about `target`
    ///
    /// Returns `None` only when the target cannot be tracked because the
    /// short-id pool is exhausted; the caller skips the target and the
    /// query degrades rather than failing.
    pub(crate) fn observe(
        &self,
        observer_id: &str,
        target: &EntityState,
        short_ids: &ShortIdPool,
        now: Instant,
    ) -> Option<NeighborEntry> {
        let mut tracked = self.observers.entry(observer_id.to_string()).or_default();

        let stale = match tracked.get_mut(&target.id) {
            Some(observation) => {
                if now.duration_since(observation.last_send) <= self.refresh_interval {
                    observation.delta.ix = target.x - observation.x;
                    observation.delta.iy = target.y - observation.y;
                    observation.delta.refresh_from(target);
                    observation.x = target.x;
                    observation.y = target.y;
                    observation.last_send = now;
                    return Some(NeighborEntry::Delta(observation.delta.clone()));
                }
                true
            }
            None => false,
        };

        if stale {
            // drop the pair and re-anchor with full coordinates; the
            // target's grid-level short id stays assigned
            tracked.remove(&target.id);
            return Some(NeighborEntry::Full(target.clone()));
        }

        // first sighting: the acquire is idempotent against the grid-level
        // assignment made when the entity was written
        let short_id = match short_ids.acquire(&target.id) {
            Ok(id) => id,
            Err(_) => {
                warn!(target_id = %target.id, "short id pool exhausted, skipping target");
                return None;
            }
        };
        tracked.insert(
            target.id.clone(),
            CachedObservation::new(target, short_id, now),
        );
        let mut full = target.clone();
        full.short_id = Some(short_id);
        Some(NeighborEntry::Full(full))
    }

    /// Drop everything `observer_id` remembers
    pub(crate) fn remove_observer(&self, observer_id: &str) {
        self.observers.remove(observer_id);
    }

    /// Drop `target_id` from every observer's memory
    pub(crate) fn remove_target(&self, target_id: &str) {
        for mut tracked in self.observers.iter_mut() {
            tracked.remove(target_id);
        }
    }

    /// Number of pairs currently cached for `observer_id`
    pub(crate) fn tracked_count(&self, observer_id: &str) -> usize {
        self.observers
            .get(observer_id)
            .map(|tracked| tracked.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::entity::EntityKind;

    fn target(id: &str, x: i32, y: i32) -> EntityState {
        EntityState::new(id, x, y, 0, EntityKind::Player)
    }

    #[test]
    fn test_first_sighting_emits_full_with_short_id() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let state = target("t1", 25000, 25000);

        let entry = cache.observe("obs", &state, &pool, Instant::now()).unwrap();

        match entry {
            NeighborEntry::Full(full) => {
                assert_eq!(full.id, "t1");
                assert_eq!(full.short_id, Some(1));
            }
            NeighborEntry::Delta(_) => panic!("first sighting must be full"),
        }
        assert_eq!(cache.tracked_count("obs"), 1);
    }

    #[test]
    fn test_second_sighting_emits_exact_movement_delta() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("obs", &target("t1", 25000, 25000), &pool, now);
        let entry = cache
            .observe("obs", &target("t1", 25120, 24950), &pool, now)
            .unwrap();

        match entry {
            NeighborEntry::Delta(delta) => {
                assert_eq!(delta.ix, 120);
                assert_eq!(delta.iy, -50);
                assert_eq!(delta.short_id, 1);
            }
            NeighborEntry::Full(_) => panic!("recent pair must get a delta"),
        }
    }

    #[test]
    fn test_deltas_chain_from_last_sent_position() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("obs", &target("t1", 1000, 1000), &pool, now);
        cache.observe("obs", &target("t1", 1100, 1000), &pool, now);
        let entry = cache
            .observe("obs", &target("t1", 1150, 900), &pool, now)
            .unwrap();

        match entry {
            NeighborEntry::Delta(delta) => {
                assert_eq!(delta.ix, 50);
                assert_eq!(delta.iy, -100);
            }
            NeighborEntry::Full(_) => panic!("expected a delta"),
        }
    }

    #[test]
    fn test_stale_pair_reanchors_with_full_state() {
        let cache = ObserverCache::with_refresh_interval(Duration::from_millis(0));
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("obs", &target("t1", 1000, 1000), &pool, now);
        let entry = cache
            .observe(
                "obs",
                &target("t1", 1100, 1000),
                &pool,
                now + Duration::from_millis(5),
            )
            .unwrap();

        assert!(matches!(entry, NeighborEntry::Full(_)));
        // pair dropped: the next sighting starts a fresh cycle
        assert_eq!(cache.tracked_count("obs"), 0);
    }

    #[test]
    fn test_delta_carries_current_state_fields() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("obs", &target("t1", 1000, 1000), &pool, now);

        let mut moved = target("t1", 1200, 1000);
        moved.speed = Some(3.0);
        moved.dynamic_message = Some(vec![42]);
        let entry = cache.observe("obs", &moved, &pool, now).unwrap();

        match entry {
            NeighborEntry::Delta(delta) => {
                assert_eq!(delta.speed, Some(3.0));
                assert_eq!(delta.dynamic_message, Some(vec![42]));
            }
            NeighborEntry::Full(_) => panic!("expected a delta"),
        }
    }

    #[test]
    fn test_exhausted_pool_skips_target() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::with_size_and_timeout(1, Duration::from_millis(5));

        let entry = cache.observe("obs", &target("t1", 1000, 1000), &pool, Instant::now());

        assert!(entry.is_none());
        assert_eq!(cache.tracked_count("obs"), 0);
    }

    #[test]
    fn test_observers_track_independently() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("a", &target("t1", 1000, 1000), &pool, now);
        // b has never seen t1, so b gets a full even though a would get a delta
        let entry = cache.observe("b", &target("t1", 1100, 1000), &pool, now).unwrap();

        assert!(matches!(entry, NeighborEntry::Full(_)));
    }

    #[test]
    fn test_remove_target_purges_every_observer() {
        let cache = ObserverCache::new();
        let pool = ShortIdPool::new();
        let now = Instant::now();

        cache.observe("a", &target("t1", 1000, 1000), &pool, now);
        cache.observe("b", &target("t1", 1000, 1000), &pool, now);
        cache.remove_target("t1");

        assert_eq!(cache.tracked_count("a"), 0);
        assert_eq!(cache.tracked_count("b"), 0);
    }
}
