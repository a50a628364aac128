//! Process-wide registry of grids, keyed by game id and grid name
//!
//! Grids are created lazily from configuration on first access. A game
//! may own at most five named grids at once. Requesting an existing name
//! with different dimensions replaces the grid and discards everything it
//! tracked; the caller gets an explicit `Replaced` signal so the session
//! layer can reconcile instead of losing state silently.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GridSettings, GridsConfig};
use crate::grid::Grid;

/// Named grids a single game may own concurrently
pub const MAX_GRIDS_PER_GAME: usize = 5;

/// How a grid handle was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridProvision {
    /// An existing grid with identical dimensions was reused
    Existing,
    /// A grid was created under a new name
    Created,
    /// A same-named grid with different dimensions was discarded and
    /// rebuilt empty; its previous entities are no longer reachable
    Replaced,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("grid limit exceeded")]
    GridLimitExceeded,
    #[error("no grid configured for this game and name")]
    NotConfigured,
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),
}

/// One game's named grids; the lock serializes creation and replacement
/// only, grid data operations never take it
#[derive(Default)]
struct GameSlot {
    grids: RwLock<FxHashMap<String, Arc<Grid>>>,
}

/// Game id -> grid name -> grid
///
/// Explicitly constructed and injected; created at server start, torn
/// down at shutdown.
pub struct GridRegistry {
    games: DashMap<String, Arc<GameSlot>>,
    config: GridsConfig,
}

impl GridRegistry {
    pub fn new(config: GridsConfig) -> Self {
        Self {
            games: DashMap::new(),
            config,
        }
    }

    /// Existing grid, or lazily create it from configuration
    pub fn get_or_create(
        &self,
        game_id: &str,
        grid_name: &str,
    ) -> Result<Arc<Grid>, RegistryError> {
        if let Some(slot) = self.games.get(game_id) {
            if let Some(grid) = slot.grids.read().get(grid_name) {
                return Ok(Arc::clone(grid));
            }
        }

        let settings = self
            .config
            .get(game_id, grid_name)
            .ok_or(RegistryError::NotConfigured)?
            .clone();
        self.create_or_reuse(game_id, &settings).map(|(grid, _)| grid)
    }

    /// Create a grid, reuse a dimension-identical one, or replace a
    /// dimension-changed one
    ///
    /// Serialized per game so two concurrent callers cannot both pass the
    /// count check or race a replacement. Replacement is destructive: the
    /// previous grid's entities, caches, and short-id assignments are
    /// discarded.
    pub fn create_or_reuse(
        &self,
        game_id: &str,
        settings: &GridSettings,
    ) -> Result<(Arc<Grid>, GridProvision), RegistryError> {
        settings.validate()?;

        let slot = Arc::clone(
            self.games
                .entry(game_id.to_string())
                .or_default()
                .value(),
        );
        let mut grids = slot.grids.write();

        if let Some(existing) = grids.get(&settings.name) {
            if existing.max() == settings.size && existing.cell_size() == settings.cell_size {
                debug!(game_id, grid_name = %settings.name, "existing grid with same settings");
                return Ok((Arc::clone(existing), GridProvision::Existing));
            }

            let grid = Arc::new(Grid::new(settings)?);
            warn!(
                game_id,
                grid_name = %settings.name,
                dropped_entities = existing.entity_count(),
                "replacing grid with changed dimensions, previous state discarded"
            );
            grids.insert(settings.name.clone(), Arc::clone(&grid));
            return Ok((grid, GridProvision::Replaced));
        }

        if grids.len() >= MAX_GRIDS_PER_GAME {
            info!(game_id, grid_name = %settings.name, "grid limit exceeded");
            return Err(RegistryError::GridLimitExceeded);
        }

        let grid = Arc::new(Grid::new(settings)?);
        grids.insert(settings.name.clone(), Arc::clone(&grid));
        debug!(game_id, grid_name = %settings.name, "grid created");
        Ok((grid, GridProvision::Created))
    }

    /// Existing grid only; never creates
    pub fn get(&self, game_id: &str, grid_name: &str) -> Option<Arc<Grid>> {
        let slot = self.games.get(game_id)?;
        let grid = slot.grids.read().get(grid_name).map(Arc::clone);
        grid
    }

    /// Drop every grid a game owns
    pub fn remove_all_for_game(&self, game_id: &str) {
        if self.games.remove(game_id).is_some() {
            info!(game_id, "removed all grids for game");
        }
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    pub fn grid_count(&self, game_id: &str) -> usize {
        self.games
            .get(game_id)
            .map(|slot| slot.grids.read().len())
            .unwrap_or(0)
    }

    /// Log every grid's occupancy and dimensions at debug level
    pub fn log_grid_counts(&self) {
        for entry in self.games.iter() {
            for (grid_name, grid) in entry.value().grids.read().iter() {
                debug!(
                    game_id = %entry.key(),
                    grid_name = %grid_name,
                    count = grid.entity_count(),
                    max = grid.max(),
                    cell_size = grid.cell_size(),
                    "grid count"
                );
            }
        }
    }
}
