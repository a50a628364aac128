//! Grid configuration
//!
//! Each game names its grids and fixes their dimensions up front; the
//! registry consults this when a grid is first accessed. Dimensions are
//! validated here so a malformed grid can never be constructed.

use std::path::Path;

use anyhow::Context;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Dimensions for one named grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSettings {
    pub name: String,
    /// Grid extent in grid units
    pub size: i32,
    /// Cell edge length; must divide `size` evenly
    pub cell_size: i32,
}

impl GridSettings {
    pub fn new(name: impl Into<String>, size: i32, cell_size: i32) -> Self {
        Self {
            name: name.into(),
            size,
            cell_size,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size <= 0 || self.cell_size <= 0 {
            return Err(ConfigError::NonPositive {
                size: self.size,
                cell_size: self.cell_size,
            });
        }
        if self.size % self.cell_size != 0 {
            return Err(ConfigError::UnevenCellSize {
                size: self.size,
                cell_size: self.cell_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("cell size {cell_size} does not divide grid size {size} evenly")]
    UnevenCellSize { size: i32, cell_size: i32 },
    #[error("grid dimensions must be positive (size {size}, cell size {cell_size})")]
    NonPositive { size: i32, cell_size: i32 },
}

/// Grid settings per game id, keyed by grid name within each game
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridsConfig {
    games: HashMap<String, Vec<GridSettings>>,
}

impl GridsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register settings for a game; replaces any same-named entry
    pub fn insert(&mut self, game_id: impl Into<String>, settings: GridSettings) {
        let grids = self.games.entry(game_id.into()).or_default();
        if let Some(existing) = grids.iter_mut().find(|s| s.name == settings.name) {
            *existing = settings;
        } else {
            grids.push(settings);
        }
    }

    pub fn get(&self, game_id: &str, grid_name: &str) -> Option<&GridSettings> {
        self.games
            .get(game_id)?
            .iter()
            .find(|s| s.name == grid_name)
    }

    /// Parse from JSON of the shape `{"game_id": [{name, size, cell_size}]}`
    ///
    /// Every entry is validated; a single malformed grid rejects the whole
    /// document rather than surfacing later at grid creation.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing grid configuration")?;
        for (game_id, grids) in &config.games {
            for settings in grids {
                settings
                    .validate()
                    .with_context(|| format!("grid {}/{}", game_id, settings.name))?;
            }
        }
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading grid configuration from {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
