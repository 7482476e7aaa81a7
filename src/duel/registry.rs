//! Session registry - the implicit two-slot room

use crate::ws::protocol::RosterEntry;

use super::participant::{ConnectionId, Participant, Slot, MAX_PARTICIPANTS};

/// Join errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Session is full ({max} participants)")]
    SessionFull { max: usize },

    #[error("Connection {0} already holds a slot")]
    AlreadyJoined(ConnectionId),
}

/// Holds at most two participants, one per slot
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: [Option<Participant>; MAX_PARTICIPANTS],
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection in the lowest free slot
    pub fn join(&mut self, connection_id: ConnectionId) -> Result<&Participant, JoinError> {
        if self.get(&connection_id).is_some() {
            return Err(JoinError::AlreadyJoined(connection_id));
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(JoinError::SessionFull {
                max: MAX_PARTICIPANTS,
            })?;

        let participant = Participant::new(connection_id, Slot::ALL[index]);
        Ok(&*self.slots[index].insert(participant))
    }

    /// Remove a connection, freeing its slot
    pub fn leave(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        self.slots
            .iter_mut()
            .find(|entry| matches!(entry, Some(p) if p.connection_id == *connection_id))
            .and_then(Option::take)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.iter().find(|p| p.connection_id == *connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Participant> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|p| p.connection_id == *connection_id)
    }

    #[cfg(test)]
    pub fn by_slot(&self, slot: Slot) -> Option<&Participant> {
        self.iter().find(|p| p.slot == slot)
    }

    /// Participants in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.len() == MAX_PARTICIPANTS
    }

    /// Roster snapshot ordered by slot
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.iter()
            .map(|p| RosterEntry {
                slot: p.slot,
                connection_id: p.connection_id,
                position: p.position,
                health: p.health,
                is_dead: p.is_dead,
            })
            .collect()
    }
}
