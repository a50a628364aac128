//! Gridcast Server Library
//!
//! Spatial interest management for a real-time multiplayer game server:
//! per-game grids hash entity positions into cells, neighbor queries
//! answer "who is near entity X" from the surrounding cells, and a
//! per-observer cache prefers small positional deltas over full state to
//! keep broadcast bytes down.
//!
//! The session/actor layer that owns network connections sits above this
//! crate; it obtains grids through [`registry::GridRegistry`] and routes
//! entity updates and neighbor queries into [`grid::Grid`].

pub mod config;
pub mod grid;
pub mod registry;
pub mod stats;
