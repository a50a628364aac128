//! Entity state types shared by the grid and the session layer
//!
//! All coordinates are fixed-point integers: real-world units multiplied by
//! the grid's scale factor (default 100, centimeter precision). Optional
//! fields use `Option` as the presence flag; `None` means "unchanged, do
//! not update" when applying and "not sent" when emitting.

use serde::{Deserialize, Serialize};

/// Compact integer substituted for an entity id in network-facing messages
pub type ShortId = u16;

/// Entity classification tag, used only as an equality filter in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Npc,
    Object,
}

/// Authoritative tracked state for one entity
///
/// One copy per entity lives in the grid's object index; cell membership
/// holds value snapshots of it. Also emitted as-is for full updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: String,
    /// Fixed-point coordinates (world units * scale factor)
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub kind: EntityKind,
    /// Grid-assigned compact id, stamped when the entity is first written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<ShortId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f32>,
    /// Opaque game-defined payload, carried verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_message: Option<Vec<u8>>,
}

impl EntityState {
    pub fn new(id: impl Into<String>, x: i32, y: i32, z: i32, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
            kind,
            short_id: None,
            direction: None,
            speed: None,
            velocity: None,
            dynamic_message: None,
        }
    }
}

/// Incoming position write: either full coordinates or a movement delta
///
/// A delta update carries `ix`/`iy` and no absolute `x`; it is applied
/// against the existing authoritative record. Anything else is treated as
/// a full update that replaces the record outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub id: String,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<i32>,
    /// Signed coordinate change since the client's last acknowledged write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ix: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iy: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_message: Option<Vec<u8>>,
}

impl StateUpdate {
    /// Full-coordinate update
    pub fn full(id: impl Into<String>, x: i32, y: i32, z: i32, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            x: Some(x),
            y: Some(y),
            z: Some(z),
            ix: None,
            iy: None,
            direction: None,
            speed: None,
            velocity: None,
            dynamic_message: None,
        }
    }

    /// Movement delta against the last known full coordinates
    pub fn delta(id: impl Into<String>, ix: i32, iy: i32, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            x: None,
            y: None,
            z: None,
            ix: Some(ix),
            iy: Some(iy),
            direction: None,
            speed: None,
            velocity: None,
            dynamic_message: None,
        }
    }

    pub fn is_delta(&self) -> bool {
        self.ix.is_some() && self.x.is_none()
    }

    /// Build the authoritative record for a full update
    ///
    /// Absent coordinates default to zero, matching the wire format where
    /// unset numeric fields decode as zero.
    pub(crate) fn into_state(self) -> EntityState {
        EntityState {
            id: self.id,
            x: self.x.unwrap_or(0),
            y: self.y.unwrap_or(0),
            z: self.z.unwrap_or(0),
            kind: self.kind,
            short_id: None,
            direction: self.direction,
            speed: self.speed,
            velocity: self.velocity,
            dynamic_message: self.dynamic_message,
        }
    }
}

/// Positional delta emitted to an observer that saw the target recently
///
/// Carries no raw id and no absolute coordinates; the short id identifies
/// the target and `ix`/`iy` are the signed movement since the last send.
/// Non-positional state fields are copied verbatim from the current record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    pub short_id: ShortId,
    pub kind: EntityKind,
    pub ix: i32,
    pub iy: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_message: Option<Vec<u8>>,
}

impl EntityDelta {
    /// Clone the non-positional public state of `state`, keyed by short id
    pub(crate) fn from_state(state: &EntityState, short_id: ShortId) -> Self {
        Self {
            short_id,
            kind: state.kind,
            ix: 0,
            iy: 0,
            direction: state.direction,
            speed: state.speed,
            velocity: state.velocity,
            dynamic_message: state.dynamic_message.clone(),
        }
    }

    /// Refresh the carried state fields from the current record
    pub(crate) fn refresh_from(&mut self, state: &EntityState) {
        self.kind = state.kind;
        self.direction = state.direction;
        self.speed = state.speed;
        self.velocity = state.velocity;
        self.dynamic_message = state.dynamic_message.clone();
    }
}

/// One result of a neighbor query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NeighborEntry {
    /// Full authoritative state (first sighting, stale re-anchor, or raw mode)
    Full(EntityState),
    /// Compact positional delta for a recently-seen target
    Delta(EntityDelta),
}

impl NeighborEntry {
    pub fn is_delta(&self) -> bool {
        matches!(self, NeighborEntry::Delta(_))
    }

    pub fn short_id(&self) -> Option<ShortId> {
        match self {
            NeighborEntry::Full(state) => state.short_id,
            NeighborEntry::Delta(delta) => Some(delta.short_id),
        }
    }
}
