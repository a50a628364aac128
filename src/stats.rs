//! Read-only grid diagnostics
//!
//! Counters are updated by grid operations with relaxed atomics and read
//! by an external metrics collaborator; nothing here affects grid
//! behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-grid operation counters
#[derive(Debug, Default)]
pub struct GridCounters {
    /// Neighbor queries served
    pub queries: AtomicU64,
    /// Full states emitted to observers
    pub fulls_sent: AtomicU64,
    /// Positional deltas emitted to observers
    pub deltas_sent: AtomicU64,
    /// Position writes applied (full or delta)
    pub updates_applied: AtomicU64,
    /// Targets skipped or writes rejected because the short-id pool was empty
    pub short_id_exhausted: AtomicU64,
    /// Delta writes rejected for lack of a prior full record
    pub unknown_delta_rejected: AtomicU64,
}

impl GridCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of one grid, for logging and dashboards
#[derive(Debug, Clone)]
pub struct GridStats {
    pub entity_count: usize,
    pub occupied_cells: usize,
    pub max: i32,
    pub cell_size: i32,
    pub width: i32,
    pub short_ids_available: usize,
    pub queries: u64,
    pub fulls_sent: u64,
    pub deltas_sent: u64,
    pub updates_applied: u64,
    pub short_id_exhausted: u64,
    pub unknown_delta_rejected: u64,
}
