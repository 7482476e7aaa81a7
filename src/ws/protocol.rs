//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::duel::{ConnectionId, Position, Slot};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Locally predicted body position
    Move { x: f32, y: f32, z: f32 },

    /// Unverified claim that a local ray test hit an opponent
    HitIntent {
        target_connection_id: ConnectionId,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent only to the joining connection
    SlotAssigned {
        slot: Slot,
        /// The joiner's own id, so it can recognise itself in broadcasts
        connection_id: ConnectionId,
    },

    /// Full roster, ordered by slot, broadcast on every join
    Roster { players: Vec<RosterEntry> },

    Moved {
        connection_id: ConnectionId,
        position: Position,
    },

    HealthUpdate {
        connection_id: ConnectionId,
        /// Health (0-100)
        health: u8,
    },

    Died { connection_id: ConnectionId },

    Respawned {
        connection_id: ConnectionId,
        position: Position,
    },

    /// Participant disconnected
    Left { connection_id: ConnectionId },

    /// Join rejected; the socket is closed right after
    SessionFull { max_participants: usize },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// One participant as seen in a roster broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub slot: Slot,
    pub connection_id: ConnectionId,
    pub position: Position,
    pub health: u8,
    pub is_dead: bool,
}
