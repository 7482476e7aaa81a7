//! Inbound relay messages applied to the client state

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::duel::participant::MAX_HEALTH;
use crate::duel::{ConnectionId, Position, Slot};
use crate::util::time::unix_millis;
use crate::ws::protocol::{RosterEntry, ServerMsg};

use super::state::{ClientGameState, GameType, Notification, RemoteMirror};

/// Where a freshly placed camera looks: the middle of the arena
const ARENA_FOCUS: Vec3 = Vec3::new(0.0, 2.0, 0.0);

impl ClientGameState {
    /// Apply one server message. Runs between frames, never concurrently with them.
    pub fn handle_server_msg(&mut self, msg: ServerMsg) -> Vec<Notification> {
        match msg {
            ServerMsg::SlotAssigned {
                slot,
                connection_id,
            } => self.on_slot_assigned(slot, connection_id),
            ServerMsg::Roster { players } => self.on_roster(players),
            ServerMsg::Moved {
                connection_id,
                position,
            } => self.on_moved(connection_id, position),
            ServerMsg::HealthUpdate {
                connection_id,
                health,
            } => self.on_health_update(connection_id, health),
            ServerMsg::Died { connection_id } => self.on_died(connection_id),
            ServerMsg::Respawned {
                connection_id,
                position,
            } => self.on_respawned(connection_id, position),
            ServerMsg::Left { connection_id } => self.on_left(connection_id),
            ServerMsg::SessionFull { max_participants } => self.on_session_full(max_participants),
            ServerMsg::Pong { t } => self.on_pong(t),
        }
    }

    fn on_slot_assigned(&mut self, slot: Slot, connection_id: ConnectionId) -> Vec<Notification> {
        info!(slot = slot.number(), connection_id = %connection_id, "Joined duel");

        self.local.slot = Some(slot);
        self.local.connection_id = Some(connection_id);
        self.local.health = MAX_HEALTH;
        self.local.is_dead = false;
        self.mirrors.remove(&connection_id);

        self.controller.place_at_body(slot.spawn_point().into());
        self.controller.look_at(ARENA_FOCUS);
        self.move_sampler.reset();

        vec![Notification::SlotAssigned { slot }]
    }

    fn on_roster(&mut self, players: Vec<RosterEntry>) -> Vec<Notification> {
        let mut notifications = Vec::new();

        // anyone missing from the roster is gone
        self.mirrors
            .retain(|id, _| players.iter().any(|p| p.connection_id == *id));

        for entry in players {
            if self.is_local(&entry.connection_id) {
                self.local.health = entry.health;
                self.local.is_dead = entry.is_dead;
                continue;
            }

            match self.mirrors.get_mut(&entry.connection_id) {
                Some(mirror) => {
                    mirror.position = entry.position.into();
                    mirror.health = entry.health;
                    mirror.visible = !entry.is_dead;
                }
                None => {
                    debug!(connection_id = %entry.connection_id, slot = entry.slot.number(), "Opponent joined");
                    self.mirrors.insert(
                        entry.connection_id,
                        RemoteMirror {
                            connection_id: entry.connection_id,
                            slot: entry.slot,
                            position: entry.position.into(),
                            visible: !entry.is_dead,
                            health: entry.health,
                        },
                    );
                    notifications.push(Notification::OpponentJoined {
                        connection_id: entry.connection_id,
                        slot: entry.slot,
                    });
                }
            }
        }

        notifications
    }

    fn on_moved(&mut self, connection_id: ConnectionId, position: Position) -> Vec<Notification> {
        // our own echo; local prediction is authoritative for movement
        if self.is_local(&connection_id) {
            return Vec::new();
        }

        match self.mirrors.get_mut(&connection_id) {
            Some(mirror) => {
                mirror.position = position.into();
                vec![Notification::OpponentMoved {
                    connection_id,
                    position: mirror.position,
                }]
            }
            None => {
                debug!(connection_id = %connection_id, "Move for unknown participant");
                Vec::new()
            }
        }
    }

    fn on_health_update(&mut self, connection_id: ConnectionId, health: u8) -> Vec<Notification> {
        let is_local = self.is_local(&connection_id);
        if is_local {
            self.local.health = health;
        } else if let Some(mirror) = self.mirrors.get_mut(&connection_id) {
            mirror.health = health;
        } else {
            return Vec::new();
        }

        vec![Notification::HealthChanged {
            connection_id,
            health,
            is_local,
        }]
    }

    fn on_died(&mut self, connection_id: ConnectionId) -> Vec<Notification> {
        let is_local = self.is_local(&connection_id);
        if is_local {
            info!("Local player died");
            self.local.is_dead = true;
            self.local.health = 0;
        } else if let Some(mirror) = self.mirrors.get_mut(&connection_id) {
            mirror.visible = false;
            mirror.health = 0;
        } else {
            return Vec::new();
        }

        vec![Notification::PlayerDied {
            connection_id,
            is_local,
        }]
    }

    fn on_respawned(&mut self, connection_id: ConnectionId, position: Position) -> Vec<Notification> {
        let position: Vec3 = position.into();
        let is_local = self.is_local(&connection_id);
        if is_local {
            self.local.is_dead = false;
            self.local.health = MAX_HEALTH;
            self.controller.place_at_body(position);
            self.controller.look_at(ARENA_FOCUS);
        } else if let Some(mirror) = self.mirrors.get_mut(&connection_id) {
            mirror.position = position;
            mirror.visible = true;
            mirror.health = MAX_HEALTH;
        } else {
            return Vec::new();
        }

        vec![Notification::PlayerRespawned {
            connection_id,
            position,
            is_local,
        }]
    }

    fn on_left(&mut self, connection_id: ConnectionId) -> Vec<Notification> {
        match self.mirrors.remove(&connection_id) {
            Some(_) => {
                info!(connection_id = %connection_id, "Opponent left");
                vec![Notification::PeerDisconnected { connection_id }]
            }
            None => Vec::new(),
        }
    }

    fn on_session_full(&mut self, max_participants: usize) -> Vec<Notification> {
        warn!(max_participants, "Duel is full, continuing in practice mode");
        if self.game_type == GameType::Duel {
            self.degrade_to_practice();
        }
        vec![Notification::SessionFull]
    }

    fn on_pong(&mut self, sent_at: u64) -> Vec<Notification> {
        let round_trip_ms = unix_millis().saturating_sub(sent_at);
        vec![Notification::Latency { round_trip_ms }]
    }
}
