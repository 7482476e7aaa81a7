//! Duel session task - the single writer of all participant state

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::{CombatSystem, HitOutcome};
use super::participant::{ConnectionId, Position, RESPAWN_DELAY};
use super::registry::{JoinError, SessionRegistry};
use super::respawn::RespawnScheduler;
use super::DuelEvent;

/// Capacity of the inbound event queue
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of each connection's outbound queue
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Error returned when the duel task has stopped
#[derive(Debug, thiserror::Error)]
#[error("Duel session is closed")]
pub struct SessionClosed;

/// Handle to the running duel task
#[derive(Clone)]
pub struct DuelHandle {
    events_tx: mpsc::Sender<DuelEvent>,
    participant_count: Arc<AtomicUsize>,
}

impl DuelHandle {
    pub fn participant_count(&self) -> usize {
        self.participant_count.load(Ordering::Relaxed)
    }

    /// Register a new connection and get its outbound message queue
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
    ) -> Result<mpsc::Receiver<ServerMsg>, SessionClosed> {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        self.send(DuelEvent::Connect {
            connection_id,
            outbound,
        })
        .await?;
        Ok(outbound_rx)
    }

    /// Forward a client message to the duel task
    pub async fn message(
        &self,
        connection_id: ConnectionId,
        msg: ClientMsg,
    ) -> Result<(), SessionClosed> {
        self.send(DuelEvent::Message { connection_id, msg }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), SessionClosed> {
        self.send(DuelEvent::Disconnect { connection_id }).await
    }

    async fn send(&self, event: DuelEvent) -> Result<(), SessionClosed> {
        self.events_tx.send(event).await.map_err(|_| SessionClosed)
    }
}

/// The authoritative duel.
///
/// Every event runs to completion before the next one is taken off the queue,
/// so hits on one target are applied and broadcast in arrival order.
pub struct DuelSession {
    registry: SessionRegistry,
    outbound: HashMap<ConnectionId, mpsc::Sender<ServerMsg>>,
    respawns: RespawnScheduler,
    events_rx: mpsc::Receiver<DuelEvent>,
    participant_count: Arc<AtomicUsize>,
}

impl DuelSession {
    /// Create a new session
    pub fn new() -> (Self, DuelHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let participant_count = Arc::new(AtomicUsize::new(0));

        let respawns = RespawnScheduler::new(RESPAWN_DELAY, &events_tx);
        let handle = DuelHandle {
            events_tx,
            participant_count: participant_count.clone(),
        };

        let session = Self {
            registry: SessionRegistry::new(),
            outbound: HashMap::new(),
            respawns,
            events_rx,
            participant_count,
        };

        (session, handle)
    }

    /// Process events until every handle is dropped and no respawn timer is pending
    pub async fn run(mut self) {
        info!("Duel session started");

        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }

        info!("Duel session stopped");
    }

    fn handle_event(&mut self, event: DuelEvent) {
        match event {
            DuelEvent::Connect {
                connection_id,
                outbound,
            } => self.handle_connect(connection_id, outbound),
            DuelEvent::Message { connection_id, msg } => match msg {
                ClientMsg::Move { x, y, z } => {
                    self.handle_move(connection_id, Position::new(x, y, z))
                }
                ClientMsg::HitIntent {
                    target_connection_id,
                } => self.handle_hit(connection_id, target_connection_id),
                ClientMsg::Ping { t } => self.send_to(&connection_id, ServerMsg::Pong { t }),
            },
            DuelEvent::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            DuelEvent::RespawnDue {
                connection_id,
                ticket,
            } => self.handle_respawn_due(connection_id, ticket),
        }
    }

    /// Handle a new connection
    fn handle_connect(&mut self, connection_id: ConnectionId, outbound: mpsc::Sender<ServerMsg>) {
        let slot = match self.registry.join(connection_id) {
            Ok(participant) => participant.slot,
            Err(JoinError::SessionFull { max }) => {
                warn!(connection_id = %connection_id, "Rejecting connection, session full");
                // Dropping `outbound` afterwards closes the connection's writer.
                let _ = outbound.try_send(ServerMsg::SessionFull {
                    max_participants: max,
                });
                return;
            }
            Err(e @ JoinError::AlreadyJoined(_)) => {
                warn!(connection_id = %connection_id, error = %e, "Duplicate connect");
                return;
            }
        };

        self.outbound.insert(connection_id, outbound);
        self.sync_participant_count();

        self.send_to(
            &connection_id,
            ServerMsg::SlotAssigned {
                slot,
                connection_id,
            },
        );
        self.broadcast(ServerMsg::Roster {
            players: self.registry.roster(),
        });

        info!(
            connection_id = %connection_id,
            slot = %slot,
            participants = self.registry.len(),
            "Participant joined"
        );
    }

    /// Relay a locally predicted position
    fn handle_move(&mut self, connection_id: ConnectionId, position: Position) {
        if !position.is_finite() {
            debug!(connection_id = %connection_id, "Dropping non-finite position");
            return;
        }

        let Some(participant) = self.registry.get_mut(&connection_id) else {
            return;
        };
        if !participant.is_alive() {
            return;
        }

        participant.position = position;
        self.broadcast(ServerMsg::Moved {
            connection_id,
            position,
        });
    }

    /// Apply a hit-intent and broadcast its consequences
    fn handle_hit(&mut self, shooter: ConnectionId, target: ConnectionId) {
        match CombatSystem::apply_hit(&mut self.registry, &shooter, &target) {
            HitOutcome::Ignored => {}
            HitOutcome::Damaged { health } => {
                self.broadcast(ServerMsg::HealthUpdate {
                    connection_id: target,
                    health,
                });
            }
            HitOutcome::Killed => {
                info!(shooter = %shooter, target = %target, "Participant died");
                self.broadcast(ServerMsg::Died {
                    connection_id: target,
                });
                self.broadcast(ServerMsg::HealthUpdate {
                    connection_id: target,
                    health: 0,
                });
                self.respawns.schedule(target);
            }
        }
    }

    /// Handle participant disconnect
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.respawns.cancel(&connection_id);
        self.outbound.remove(&connection_id);

        if let Some(participant) = self.registry.leave(&connection_id) {
            self.sync_participant_count();
            self.broadcast(ServerMsg::Left { connection_id });

            info!(
                connection_id = %connection_id,
                slot = %participant.slot,
                participants = self.registry.len(),
                "Participant left"
            );
        }
    }

    fn handle_respawn_due(&mut self, connection_id: ConnectionId, ticket: u64) {
        if !self.respawns.complete(&connection_id, ticket) {
            debug!(connection_id = %connection_id, ticket, "Stale respawn timer");
            return;
        }

        if let Some(position) = CombatSystem::respawn(&mut self.registry, &connection_id) {
            info!(connection_id = %connection_id, "Participant respawned");
            self.broadcast(ServerMsg::Respawned {
                connection_id,
                position,
            });
        }
    }

    fn sync_participant_count(&self) {
        self.participant_count
            .store(self.registry.len(), Ordering::Relaxed);
    }

    /// Queue a message for one connection without blocking the event loop
    fn send_to(&self, connection_id: &ConnectionId, msg: ServerMsg) {
        let Some(outbound) = self.outbound.get(connection_id) else {
            return;
        };

        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %connection_id, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %connection_id, "Outbound queue closed");
            }
        }
    }

    /// Fan a message out to every participant
    fn broadcast(&self, msg: ServerMsg) {
        for connection_id in self.outbound.keys() {
            self.send_to(connection_id, msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::participant::{Slot, MAX_HEALTH};
    use std::time::Duration;
    use tokio::time::Instant;

    struct Peer {
        id: ConnectionId,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<ServerMsg> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn connect(session: &mut DuelSession) -> Peer {
        let id = ConnectionId::new();
        let (outbound, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        session.handle_event(DuelEvent::Connect {
            connection_id: id,
            outbound,
        });
        Peer { id, rx }
    }

    fn hit(session: &mut DuelSession, shooter: &Peer, target: &Peer) {
        session.handle_event(DuelEvent::Message {
            connection_id: shooter.id,
            msg: ClientMsg::HitIntent {
                target_connection_id: target.id,
            },
        });
    }

    /// Wait for the next timer event and feed it back into the session
    async fn pump_timer(session: &mut DuelSession) {
        let event = session.events_rx.recv().await.expect("event channel closed");
        session.handle_event(event);
    }

    fn count(msgs: &[ServerMsg], pred: impl Fn(&ServerMsg) -> bool) -> usize {
        msgs.iter().filter(|m| pred(m)).count()
    }

    #[tokio::test]
    async fn joiners_get_slots_and_everyone_gets_the_roster() {
        let (mut session, handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let mut b = connect(&mut session);

        let a_msgs = a.drain();
        assert_eq!(
            a_msgs[0],
            ServerMsg::SlotAssigned {
                slot: Slot::One,
                connection_id: a.id
            }
        );
        // a sees its own roster, then the roster after b joined
        assert_eq!(count(&a_msgs, |m| matches!(m, ServerMsg::Roster { .. })), 2);

        let b_msgs = b.drain();
        assert_eq!(
            b_msgs[0],
            ServerMsg::SlotAssigned {
                slot: Slot::Two,
                connection_id: b.id
            }
        );
        let ServerMsg::Roster { players } = &b_msgs[1] else {
            panic!("expected roster, got {:?}", b_msgs[1]);
        };
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].connection_id, a.id);
        assert_eq!(players[0].position, Position::new(-5.0, 0.0, 0.0));
        assert_eq!(players[1].connection_id, b.id);
        assert_eq!(players[1].position, Position::new(5.0, 0.0, 0.0));

        assert_eq!(handle.participant_count(), 2);
    }

    #[tokio::test]
    async fn third_connection_is_rejected_and_duel_is_untouched() {
        let (mut session, handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let mut b = connect(&mut session);
        hit(&mut session, &a, &b);
        a.drain();
        b.drain();

        let mut c = connect(&mut session);

        assert_eq!(
            c.drain(),
            vec![ServerMsg::SessionFull {
                max_participants: 2
            }]
        );
        // outbound sender was dropped, so the writer side sees the queue close
        assert!(c.rx.recv().await.is_none());
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert_eq!(handle.participant_count(), 2);
        assert_eq!(session.registry.get(&b.id).unwrap().health, 90);
        assert_eq!(session.registry.get(&a.id).unwrap().slot, Slot::One);

        // hits from the rejected connection do nothing
        hit(&mut session, &c, &a);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn moves_are_relayed_to_all_participants() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let mut b = connect(&mut session);
        a.drain();
        b.drain();

        session.handle_event(DuelEvent::Message {
            connection_id: a.id,
            msg: ClientMsg::Move {
                x: 1.0,
                y: 0.0,
                z: 2.0,
            },
        });

        let expected = ServerMsg::Moved {
            connection_id: a.id,
            position: Position::new(1.0, 0.0, 2.0),
        };
        assert_eq!(a.drain(), vec![expected.clone()]);
        assert_eq!(b.drain(), vec![expected]);
    }

    #[tokio::test]
    async fn non_finite_moves_are_dropped() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        a.drain();

        session.handle_event(DuelEvent::Message {
            connection_id: a.id,
            msg: ClientMsg::Move {
                x: f32::NAN,
                y: 0.0,
                z: 0.0,
            },
        });

        assert!(a.drain().is_empty());
        assert_eq!(
            session.registry.get(&a.id).unwrap().position,
            Slot::One.spawn_point()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ten_hits_kill_then_respawn_after_three_seconds() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let mut b = connect(&mut session);
        a.drain();
        b.drain();

        session.handle_event(DuelEvent::Message {
            connection_id: b.id,
            msg: ClientMsg::Move {
                x: 3.0,
                y: 0.0,
                z: -4.0,
            },
        });

        for _ in 0..10 {
            hit(&mut session, &a, &b);
        }

        let msgs = b.drain();
        let healths: Vec<u8> = msgs
            .iter()
            .filter_map(|m| match m {
                ServerMsg::HealthUpdate {
                    connection_id,
                    health,
                } if *connection_id == b.id => Some(*health),
                _ => None,
            })
            .collect();
        assert_eq!(healths, vec![90, 80, 70, 60, 50, 40, 30, 20, 10, 0]);
        assert_eq!(count(&msgs, |m| matches!(m, ServerMsg::Died { .. })), 1);
        assert!(msgs.contains(&ServerMsg::Died { connection_id: b.id }));

        assert_eq!(count(&a.drain(), |m| matches!(m, ServerMsg::Died { .. })), 1);

        // shots on the corpse are silent
        hit(&mut session, &a, &b);
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        let died_at = Instant::now();
        pump_timer(&mut session).await;
        assert!(died_at.elapsed() >= Duration::from_secs(3));

        let msgs = b.drain();
        assert_eq!(
            msgs,
            vec![ServerMsg::Respawned {
                connection_id: b.id,
                position: Position::new(5.0, 0.0, 0.0)
            }]
        );
        let revived = session.registry.get(&b.id).unwrap();
        assert_eq!(revived.health, MAX_HEALTH);
        assert!(!revived.is_dead);
        assert_eq!(
            count(&a.drain(), |m| matches!(m, ServerMsg::Respawned { .. })),
            1
        );

        // and the new life takes damage again
        hit(&mut session, &a, &b);
        assert_eq!(
            b.drain(),
            vec![ServerMsg::HealthUpdate {
                connection_id: b.id,
                health: 90
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_respawn_delay_suppresses_respawn() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let b = connect(&mut session);
        for _ in 0..10 {
            hit(&mut session, &a, &b);
        }
        assert!(session.respawns.is_pending(&b.id));

        session.handle_event(DuelEvent::Disconnect { connection_id: b.id });
        assert!(!session.respawns.is_pending(&b.id));
        assert!(a.drain().contains(&ServerMsg::Left { connection_id: b.id }));

        // a newcomer takes slot 2 while the old timer would still be running
        let mut c = connect(&mut session);
        assert_eq!(
            c.drain()[0],
            ServerMsg::SlotAssigned {
                slot: Slot::Two,
                connection_id: c.id
            }
        );
        a.drain();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(session.events_rx.try_recv().is_err());
        assert!(a.drain().is_empty());
        assert!(c.drain().is_empty());

        let newcomer = session.registry.get(&c.id).unwrap();
        assert_eq!(newcomer.health, MAX_HEALTH);
        assert_eq!(newcomer.position, Slot::Two.spawn_point());
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_that_fires_after_disconnect_is_ignored() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let b = connect(&mut session);
        for _ in 0..10 {
            hit(&mut session, &a, &b);
        }

        // the timer fires and queues its event before the disconnect is processed
        tokio::time::sleep(Duration::from_secs(4)).await;
        let due = session.events_rx.recv().await.unwrap();
        session.handle_event(DuelEvent::Disconnect { connection_id: b.id });
        a.drain();

        session.handle_event(due);

        assert!(a.drain().is_empty());
        assert!(session.registry.get(&b.id).is_none());
    }

    #[tokio::test]
    async fn ping_is_answered_only_to_sender() {
        let (mut session, _handle) = DuelSession::new();
        let mut a = connect(&mut session);
        let mut b = connect(&mut session);
        a.drain();
        b.drain();

        session.handle_event(DuelEvent::Message {
            connection_id: b.id,
            msg: ClientMsg::Ping { t: 42 },
        });

        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![ServerMsg::Pong { t: 42 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_serves_handles() {
        let (session, handle) = DuelSession::new();
        tokio::spawn(session.run());

        let a = ConnectionId::new();
        let mut a_rx = handle.connect(a).await.unwrap();
        let b = ConnectionId::new();
        let mut b_rx = handle.connect(b).await.unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMsg::SlotAssigned { slot: Slot::One, .. })
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMsg::SlotAssigned { slot: Slot::Two, .. })
        ));

        handle.disconnect(b).await.unwrap();
        loop {
            match a_rx.recv().await {
                Some(ServerMsg::Left { connection_id }) => {
                    assert_eq!(connection_id, b);
                    break;
                }
                Some(_) => continue,
                None => panic!("session closed"),
            }
        }
        assert_eq!(handle.participant_count(), 1);
    }

    #[tokio::test]
    async fn run_stops_once_every_handle_is_dropped() {
        let (session, handle) = DuelSession::new();
        let task = tokio::spawn(session.run());

        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session kept running without handles")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pending_respawn_outlives_the_last_handle() {
        let (session, handle) = DuelSession::new();
        let task = tokio::spawn(session.run());

        let a = ConnectionId::new();
        let mut a_rx = handle.connect(a).await.unwrap();
        let b = ConnectionId::new();
        let _b_rx = handle.connect(b).await.unwrap();
        for _ in 0..10 {
            handle
                .message(
                    a,
                    ClientMsg::HitIntent {
                        target_connection_id: b,
                    },
                )
                .await
                .unwrap();
        }
        drop(handle);

        let mut respawned = 0;
        while let Some(msg) = a_rx.recv().await {
            if matches!(msg, ServerMsg::Respawned { connection_id, .. } if connection_id == b) {
                respawned += 1;
            }
        }

        assert_eq!(respawned, 1);
        task.await.unwrap();
    }
}
