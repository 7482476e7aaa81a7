//! Authoritative duel: slot registry, combat transitions and the event task

pub mod combat;
pub mod participant;
pub mod registry;
pub mod respawn;
pub mod session;

pub use participant::{ConnectionId, Participant, Position, Slot};
pub use registry::{JoinError, SessionRegistry};
pub use session::{DuelHandle, DuelSession};

use tokio::sync::mpsc;

use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Events processed by the duel task, strictly in arrival order
#[derive(Debug)]
pub enum DuelEvent {
    /// A transport connection was accepted
    Connect {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerMsg>,
    },

    /// A parsed message from a connection
    Message {
        connection_id: ConnectionId,
        msg: ClientMsg,
    },

    /// The transport connection closed
    Disconnect { connection_id: ConnectionId },

    /// A respawn timer expired
    RespawnDue {
        connection_id: ConnectionId,
        ticket: u64,
    },
}
