//! Participant state and duel constants

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum concurrent participants in the session
pub const MAX_PARTICIPANTS: usize = 2;

/// Health at spawn
pub const MAX_HEALTH: u8 = 100;

/// Damage per accepted hit-intent
pub const HIT_DAMAGE: u8 = 10;

/// Time from death to respawn
pub const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// Transport-assigned connection identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable slot held for the lifetime of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub const ALL: [Slot; MAX_PARTICIPANTS] = [Slot::One, Slot::Two];

    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    /// Canonical spawn point for this slot
    pub fn spawn_point(self) -> Position {
        match self {
            Slot::One => Position::new(-5.0, 0.0, 0.0),
            Slot::Two => Position::new(5.0, 0.0, 0.0),
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> Self {
        slot.number()
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Slot::One),
            2 => Ok(Slot::Two),
            other => Err(format!("invalid slot number {other}")),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// World-space position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Participant state in the duel (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub slot: Slot,
    pub position: Position,
    pub health: u8,
    pub is_dead: bool,
}

impl Participant {
    pub fn new(connection_id: ConnectionId, slot: Slot) -> Self {
        Self {
            connection_id,
            slot,
            position: slot.spawn_point(),
            health: MAX_HEALTH,
            is_dead: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }
}
