//! Fast 2D spatial hashing with per-observer delta compression
//!
//! A grid divides one named area into cells of `cell_size`; the cell size
//! must divide evenly into the grid size. Neighbor queries scan the cells
//! around the query point, so results are a bounding-box superset of true
//! neighbors; callers that need an exact range filter further themselves.
//!
//! All coordinates are fixed-point integers with a precision of
//! `scale_factor` (space matters more than precision on the wire).
//! When an observer has seen an entity recently the grid emits a
//! positional delta instead of full coordinates; a client-side delta
//! referencing an entity we have no full record for is rejected so the
//! session layer can request a full resend.
//!
//! Any number of threads may mutate and query one grid concurrently.
//! Writes to the same entity id serialize on that entity's record;
//! distinct ids proceed in parallel.

pub mod entity;
pub mod observer;
pub mod short_id;
pub mod spatial;

use std::sync::atomic::Ordering;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::config::{ConfigError, GridSettings};
use crate::stats::{GridCounters, GridStats};

pub use entity::{EntityDelta, EntityKind, EntityState, NeighborEntry, ShortId, StateUpdate};

use observer::ObserverCache;
use short_id::ShortIdPool;
use spatial::SpatialHash;

/// Fixed-point precision: world units are stored multiplied by this
pub const DEFAULT_SCALE_FACTOR: i32 = 100;

/// Recoverable grid operation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Short-id pool empty: too many simultaneously tracked entities
    #[error("short id pool exhausted")]
    CapacityExhausted,
    /// A delta update arrived with no prior full record for its entity
    #[error("delta update references an unknown entity")]
    UnknownEntityForDelta,
}

/// Spatial index for one named area within one game
pub struct Grid {
    max: i32,
    cell_size: i32,
    scale_factor: i32,
    spatial: SpatialHash,
    /// Single authoritative copy per entity
    object_index: DashMap<String, EntityState>,
    /// Entity id -> current cell, for O(1) membership removal on move
    cells_index: DashMap<String, i32>,
    /// Sparse cell id -> members; a cell is dropped the moment it empties
    cells: DashMap<i32, HashMap<String, EntityState>>,
    short_ids: ShortIdPool,
    observers: ObserverCache,
    counters: GridCounters,
}

impl Grid {
    /// Build a grid from validated settings
    pub fn new(settings: &GridSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            max: settings.size,
            cell_size: settings.cell_size,
            scale_factor: DEFAULT_SCALE_FACTOR,
            spatial: SpatialHash::new(settings.size, settings.cell_size),
            object_index: DashMap::new(),
            cells_index: DashMap::new(),
            cells: DashMap::new(),
            short_ids: ShortIdPool::new(),
            observers: ObserverCache::new(),
            counters: GridCounters::new(),
        })
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    pub fn width(&self) -> i32 {
        self.spatial.width()
    }

    pub fn cell_count(&self) -> i32 {
        self.spatial.cell_count()
    }

    pub fn scale_factor(&self) -> i32 {
        self.scale_factor
    }

    pub fn entity_count(&self) -> usize {
        self.object_index.len()
    }

    /// Current authoritative record for an entity
    pub fn get(&self, id: &str) -> Option<EntityState> {
        self.object_index.get(id).map(|state| state.value().clone())
    }

    /// Every tracked entity, in no particular order
    pub fn get_all(&self) -> Vec<EntityState> {
        self.object_index
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Members of one cell; empty when the cell has no occupants
    pub fn entities_in_cell(&self, cell: i32) -> Vec<EntityState> {
        self.cells
            .get(&cell)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write a full position for an entity
    pub fn set_position(
        &self,
        id: impl Into<String>,
        x: i32,
        y: i32,
        z: i32,
        kind: EntityKind,
    ) -> Result<(), GridError> {
        self.apply_update(StateUpdate::full(id, x, y, z, kind))
    }

    /// Apply a full or delta position write and re-hash the entity
    ///
    /// Delta updates require an existing record; full updates replace the
    /// record outright. The entity's short id is acquired lazily here and
    /// exhaustion rejects the write.
    pub fn apply_update(&self, update: StateUpdate) -> Result<(), GridError> {
        let short_id = match self.short_ids.acquire(&update.id) {
            Ok(id) => id,
            Err(err) => {
                GridCounters::incr(&self.counters.short_id_exhausted);
                warn!(entity_id = %update.id, "rejecting update, short id pool exhausted");
                return Err(err);
            }
        };

        // the entry guard is held across the whole re-hash so writers of
        // the same id cannot interleave partial updates
        match self.object_index.entry(update.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if update.is_delta() {
                    state.x += update.ix.unwrap_or(0);
                    state.y += update.iy.unwrap_or(0);
                    if let Some(message) = update.dynamic_message {
                        state.dynamic_message = Some(message);
                    }
                    if let Some(direction) = update.direction {
                        state.direction = Some(direction);
                    }
                    if let Some(speed) = update.speed {
                        state.speed = Some(speed);
                    }
                } else {
                    *state = update.into_state();
                }
                state.short_id = Some(short_id);
                let snapshot = state.clone();
                self.reindex(&snapshot);
            }
            Entry::Vacant(vacant) => {
                if update.is_delta() {
                    GridCounters::incr(&self.counters.unknown_delta_rejected);
                    debug!(entity_id = %update.id, "delta update with no original");
                    return Err(GridError::UnknownEntityForDelta);
                }
                let mut state = update.into_state();
                state.short_id = Some(short_id);
                let snapshot = state.clone();
                let _guard = vacant.insert(state);
                self.reindex(&snapshot);
            }
        }

        GridCounters::incr(&self.counters.updates_applied);
        Ok(())
    }

    /// Hash the entity into its cell, moving it out of the previous cell
    /// if that changed
    fn reindex(&self, state: &EntityState) {
        let cell = self
            .spatial
            .hash(state.x / self.scale_factor, state.y / self.scale_factor);

        let previous = self.cells_index.insert(state.id.clone(), cell);
        if let Some(old_cell) = previous {
            if old_cell != cell {
                if let Some(mut members) = self.cells.get_mut(&old_cell) {
                    members.remove(&state.id);
                }
                self.cells.remove_if(&old_cell, |_, members| members.is_empty());
            }
        }

        self.cells
            .entry(cell)
            .or_default()
            .insert(state.id.clone(), state.clone());
    }

    /// Stop tracking an entity entirely
    ///
    /// Drops the record, its cell membership, every observer-cache entry
    /// naming it, and returns its short id to the pool.
    pub fn remove(&self, id: &str) {
        match self.object_index.entry(id.to_string()) {
            Entry::Occupied(occupied) => {
                if let Some((_, cell)) = self.cells_index.remove(id) {
                    if let Some(mut members) = self.cells.get_mut(&cell) {
                        members.remove(id);
                    }
                    self.cells.remove_if(&cell, |_, members| members.is_empty());
                }
                self.observers.remove_observer(id);
                self.observers.remove_target(id);
                self.short_ids.release(id);
                occupied.remove();
            }
            Entry::Vacant(_) => {}
        }
    }

    /// Entities near a fixed-point position, as seen by `observer_id`
    ///
    /// Scans the candidate cells around the point and applies the
    /// per-observer full/delta decision to each occupant. `raw` bypasses
    /// the cache and short-id substitution entirely. Results follow cell
    /// iteration order, not distance.
    pub fn neighbors(
        &self,
        observer_id: &str,
        x: i32,
        y: i32,
        kind: Option<EntityKind>,
        raw: bool,
    ) -> Vec<NeighborEntry> {
        GridCounters::incr(&self.counters.queries);
        let now = Instant::now();
        let mut result = Vec::new();

        let candidates = self
            .spatial
            .cells_within_bounds(x / self.scale_factor, y / self.scale_factor);

        for cell in candidates {
            // snapshot the occupants so cell locks are not held while the
            // observer cache decides (which may wait on the id pool)
            let members: Vec<EntityState> = match self.cells.get(&cell) {
                Some(members) => members.values().cloned().collect(),
                None => continue,
            };

            for target in members {
                if target.id == observer_id {
                    continue;
                }
                if let Some(wanted) = kind {
                    if target.kind != wanted {
                        continue;
                    }
                }

                if raw {
                    GridCounters::incr(&self.counters.fulls_sent);
                    result.push(NeighborEntry::Full(target));
                    continue;
                }

                match self.observers.observe(observer_id, &target, &self.short_ids, now) {
                    Some(entry) => {
                        match entry {
                            NeighborEntry::Full(_) => {
                                GridCounters::incr(&self.counters.fulls_sent)
                            }
                            NeighborEntry::Delta(_) => {
                                GridCounters::incr(&self.counters.deltas_sent)
                            }
                        }
                        result.push(entry);
                    }
                    None => GridCounters::incr(&self.counters.short_id_exhausted),
                }
            }
        }
        result
    }

    /// Neighbors around a tracked entity's current position
    ///
    /// `None` when the target has no current record.
    pub fn neighbors_of(
        &self,
        observer_id: &str,
        target_id: &str,
        kind: Option<EntityKind>,
        raw: bool,
    ) -> Option<Vec<NeighborEntry>> {
        let (x, y) = {
            let target = self.object_index.get(target_id)?;
            (target.x, target.y)
        };
        Some(self.neighbors(observer_id, x, y, kind, raw))
    }

    /// Point-in-time diagnostics snapshot
    pub fn stats(&self) -> GridStats {
        GridStats {
            entity_count: self.object_index.len(),
            occupied_cells: self.cells.len(),
            max: self.max,
            cell_size: self.cell_size,
            width: self.spatial.width(),
            short_ids_available: self.short_ids.available(),
            queries: self.counters.queries.load(Ordering::Relaxed),
            fulls_sent: self.counters.fulls_sent.load(Ordering::Relaxed),
            deltas_sent: self.counters.deltas_sent.load(Ordering::Relaxed),
            updates_applied: self.counters.updates_applied.load(Ordering::Relaxed),
            short_id_exhausted: self.counters.short_id_exhausted.load(Ordering::Relaxed),
            unknown_delta_rejected: self
                .counters
                .unknown_delta_rejected
                .load(Ordering::Relaxed),
        }
    }

    /// Log every tracked entity at debug level, descaled to world units
    pub fn dump(&self) {
        for entry in self.object_index.iter() {
            debug!(
                id = %entry.id,
                x = entry.x / self.scale_factor,
                y = entry.y / self.scale_factor,
                "tracked entity"
            );
        }
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("max", &self.max)
            .field("cell_size", &self.cell_size)
            .field("entity_count", &self.object_index.len())
            .finish()
    }
}
