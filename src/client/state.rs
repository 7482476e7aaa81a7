//! Client game state, owned by the frame loop

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};

use crate::duel::participant::MAX_HEALTH;
use crate::duel::{ConnectionId, Position, Slot};
use crate::ws::protocol::ClientMsg;

use super::combat::{resolve_shot, LocalCombatState, ShotResult, SprayTrigger};
use super::movement::{MoveKeys, MoveSampler, MovementController};
use super::practice::PracticeTarget;
use super::ClientError;

/// Longest accepted timed round
pub const MAX_ROUND_SECONDS: u32 = 300;

/// Practice camera start, facing the target
const PRACTICE_SPAWN: Vec3 = Vec3::new(0.0, 0.0, 15.0);

impl From<Position> for Vec3 {
    fn from(p: Position) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

impl From<Vec3> for Position {
    fn from(v: Vec3) -> Self {
        Position::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameType {
    /// Single player against the wandering target
    Practice,
    /// Connected to the relay
    Duel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Free,
    Timed { seconds: u32 },
}

impl GameMode {
    pub fn timed(seconds: u32) -> Result<Self, ClientError> {
        if (1..=MAX_ROUND_SECONDS).contains(&seconds) {
            Ok(GameMode::Timed { seconds })
        } else {
            Err(ClientError::InvalidRoundLength(seconds))
        }
    }

    fn round_length(self) -> Option<f32> {
        match self {
            GameMode::Free => None,
            GameMode::Timed { seconds } => Some(seconds as f32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementMode {
    #[default]
    Moving,
    /// Aim only, no translation
    Static,
}

/// Shadow of a remote participant, written only by inbound broadcasts
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMirror {
    pub connection_id: ConnectionId,
    pub slot: Slot,
    pub position: Vec3,
    pub visible: bool,
    pub health: u8,
}

/// What the server has told us about ourselves
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayer {
    pub connection_id: Option<ConnectionId>,
    pub slot: Option<Slot>,
    pub health: u8,
    pub is_dead: bool,
}

impl Default for LocalPlayer {
    fn default() -> Self {
        Self {
            connection_id: None,
            slot: None,
            health: MAX_HEALTH,
            is_dead: false,
        }
    }
}

/// State changes for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SlotAssigned { slot: Slot },
    SessionFull,
    OpponentJoined { connection_id: ConnectionId, slot: Slot },
    OpponentMoved { connection_id: ConnectionId, position: Vec3 },
    HealthChanged { connection_id: ConnectionId, health: u8, is_local: bool },
    PlayerDied { connection_id: ConnectionId, is_local: bool },
    PlayerRespawned { connection_id: ConnectionId, position: Vec3, is_local: bool },
    PeerDisconnected { connection_id: ConnectionId },
    ShotFired { result: ShotResult },
    Latency { round_trip_ms: u64 },
    GameOver { score: u32, accuracy: f32 },
}

/// Input sampled for one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInput {
    pub keys: MoveKeys,
    pub jump: bool,
    /// Mouse movement in pixels
    pub look_delta: Vec2,
    pub trigger_pressed: bool,
    pub trigger_held: bool,
}

/// Everything a frame produced
#[derive(Debug, Default)]
pub struct FrameOutput {
    /// Fire-and-forget messages for the relay
    pub outgoing: Vec<ClientMsg>,
    pub notifications: Vec<Notification>,
}

/// The whole client game, passed explicitly to the frame loop and the
/// network handlers
#[derive(Debug)]
pub struct ClientGameState {
    pub game_type: GameType,
    pub mode: GameMode,
    pub movement_mode: MovementMode,
    pub local: LocalPlayer,
    pub controller: MovementController,
    pub mirrors: BTreeMap<ConnectionId, RemoteMirror>,
    pub combat: LocalCombatState,
    pub practice_target: Option<PracticeTarget>,
    pub(crate) trigger: SprayTrigger,
    pub(crate) move_sampler: MoveSampler,
    /// Client clock in seconds, advanced by frame deltas
    clock: f32,
    time_remaining: Option<f32>,
    round_started: bool,
    game_over: bool,
}

impl ClientGameState {
    pub fn new(game_type: GameType, mode: GameMode, movement_mode: MovementMode) -> Self {
        let mut state = Self {
            game_type,
            mode,
            movement_mode,
            local: LocalPlayer::default(),
            controller: MovementController::new(PRACTICE_SPAWN),
            mirrors: BTreeMap::new(),
            combat: LocalCombatState::default(),
            practice_target: None,
            trigger: SprayTrigger::default(),
            move_sampler: MoveSampler::default(),
            clock: 0.0,
            time_remaining: None,
            round_started: false,
            game_over: false,
        };
        state.restart();
        state
    }

    pub fn practice(mode: GameMode) -> Self {
        Self::new(GameType::Practice, mode, MovementMode::Moving)
    }

    pub fn duel(mode: GameMode) -> Self {
        Self::new(GameType::Duel, mode, MovementMode::Moving)
    }

    /// Drop every trace of the relay and continue single player
    pub fn degrade_to_practice(&mut self) {
        self.game_type = GameType::Practice;
        self.local = LocalPlayer::default();
        self.mirrors.clear();
        self.restart();
    }

    /// Reset round state: score, shots, timer, health
    pub fn restart(&mut self) {
        self.combat.reset();
        self.trigger.reset();
        self.move_sampler.reset();
        self.time_remaining = self.mode.round_length();
        self.round_started = false;
        self.game_over = false;
        self.local.health = MAX_HEALTH;
        self.local.is_dead = false;

        match self.game_type {
            GameType::Practice => {
                let target = self.practice_target.get_or_insert_with(PracticeTarget::new);
                target.reset();
                self.controller.place_at_body(PRACTICE_SPAWN);
                self.controller.look_at(target.position);
            }
            GameType::Duel => {
                self.practice_target = None;
                let spawn = self.local.slot.map(Slot::spawn_point).unwrap_or_default();
                self.controller.place_at_body(spawn.into());
                self.controller.look_at(Vec3::new(0.0, 2.0, 0.0));
            }
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn time_remaining(&self) -> Option<f32> {
        self.time_remaining
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn is_local(&self, connection_id: &ConnectionId) -> bool {
        self.local.connection_id.as_ref() == Some(connection_id)
    }

    /// Advance one rendered frame of `dt` seconds
    pub fn frame(&mut self, dt: f32, input: &FrameInput) -> FrameOutput {
        let mut out = FrameOutput::default();
        if self.game_over {
            return out;
        }

        self.clock += dt;
        self.controller.look(input.look_delta);

        if !self.local.is_dead {
            if self.movement_mode == MovementMode::Moving {
                if input.jump {
                    self.controller.jump();
                }
                self.controller.update(dt, input.keys);
            }

            self.sample_movement(&mut out);

            if self
                .trigger
                .poll(self.clock, input.trigger_pressed, input.trigger_held)
            {
                self.fire(&mut out);
            }
        }

        if let Some(target) = self.practice_target.as_mut() {
            target.update(self.clock, dt);
        }

        self.tick_round_timer(dt, &mut out);
        out
    }

    fn sample_movement(&mut self, out: &mut FrameOutput) {
        if self.game_type != GameType::Duel || self.local.slot.is_none() {
            return;
        }

        let body = self.controller.body_position();
        if self.move_sampler.should_send(self.clock, body) {
            out.outgoing.push(ClientMsg::Move {
                x: body.x,
                y: body.y,
                z: body.z,
            });
        }
    }

    fn fire(&mut self, out: &mut FrameOutput) {
        let ray = self.controller.eye_ray();
        let result = match self.game_type {
            GameType::Practice => resolve_shot(&ray, self.practice_target.as_ref(), std::iter::empty()),
            GameType::Duel => resolve_shot(&ray, None, self.mirrors.values()),
        };

        self.combat.record(result);
        match result {
            ShotResult::OpponentHit(target_connection_id) => {
                out.outgoing.push(ClientMsg::HitIntent {
                    target_connection_id,
                });
            }
            ShotResult::PracticeHit | ShotResult::Miss => {}
        }

        // the first shot, hit or miss, starts the round clock and the target
        self.round_started = true;
        if let Some(target) = self.practice_target.as_mut() {
            target.start();
        }

        out.notifications.push(Notification::ShotFired { result });
    }

    fn tick_round_timer(&mut self, dt: f32, out: &mut FrameOutput) {
        if !self.round_started {
            return;
        }
        let Some(remaining) = self.time_remaining.as_mut() else {
            return;
        };

        *remaining -= dt;
        if *remaining <= 0.0 {
            *remaining = 0.0;
            self.game_over = true;
            out.notifications.push(Notification::GameOver {
                score: self.combat.score,
                accuracy: self.combat.accuracy(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    fn fire() -> FrameInput {
        FrameInput {
            trigger_pressed: true,
            trigger_held: true,
            ..Default::default()
        }
    }

    #[test]
    fn timed_mode_bounds() {
        assert!(GameMode::timed(0).is_err());
        assert!(GameMode::timed(301).is_err());
        assert_eq!(GameMode::timed(30).unwrap(), GameMode::Timed { seconds: 30 });
    }

    #[test]
    fn practice_shot_at_target_scores() {
        let mut state = ClientGameState::practice(GameMode::Free);

        let out = state.frame(FRAME, &fire());

        assert!(out.outgoing.is_empty());
        assert_eq!(
            out.notifications,
            vec![Notification::ShotFired {
                result: ShotResult::PracticeHit
            }]
        );
        assert_eq!(state.combat.score, 100);
        assert_eq!(state.combat.accuracy(), 100.0);
        assert!(state.practice_target.as_ref().unwrap().is_moving());
    }

    #[test]
    fn missed_first_shot_still_starts_the_target() {
        let mut state = ClientGameState::practice(GameMode::Free);
        state.controller.look_at(Vec3::new(0.0, 2.0, 100.0));

        let out = state.frame(FRAME, &fire());

        assert_eq!(
            out.notifications,
            vec![Notification::ShotFired {
                result: ShotResult::Miss
            }]
        );
        assert_eq!(state.combat.accuracy(), 0.0);
        assert!(state.practice_target.as_ref().unwrap().is_moving());
    }

    #[test]
    fn practice_never_sends_to_relay() {
        let mut state = ClientGameState::practice(GameMode::Free);
        let input = FrameInput {
            keys: MoveKeys {
                forward: true,
                ..Default::default()
            },
            ..Default::default()
        };

        for _ in 0..30 {
            assert!(state.frame(FRAME, &input).outgoing.is_empty());
        }
    }

    #[test]
    fn static_mode_does_not_translate() {
        let mut state = ClientGameState::new(GameType::Practice, GameMode::Free, MovementMode::Static);
        let before = state.controller.body_position();
        let input = FrameInput {
            keys: MoveKeys {
                left: true,
                ..Default::default()
            },
            ..Default::default()
        };

        state.frame(FRAME, &input);

        assert_eq!(state.controller.body_position(), before);
    }

    #[test]
    fn timed_round_starts_on_first_shot_and_ends() {
        let mut state = ClientGameState::practice(GameMode::timed(1).unwrap());

        for _ in 0..120 {
            state.frame(FRAME, &FrameInput::default());
        }
        assert!(!state.is_game_over());
        assert_eq!(state.time_remaining(), Some(1.0));

        state.frame(FRAME, &fire());
        let mut over = None;
        for _ in 0..70 {
            let out = state.frame(FRAME, &FrameInput::default());
            over = over.or(out
                .notifications
                .into_iter()
                .find(|n| matches!(n, Notification::GameOver { .. })));
        }

        assert!(state.is_game_over());
        assert_eq!(
            over,
            Some(Notification::GameOver {
                score: 100,
                accuracy: 100.0
            })
        );
        // frames after game over do nothing
        assert!(state.frame(FRAME, &fire()).notifications.is_empty());

        state.restart();
        assert!(!state.is_game_over());
        assert_eq!(state.combat, LocalCombatState::default());
    }

    #[test]
    fn degrade_clears_relay_state() {
        let mut state = ClientGameState::duel(GameMode::Free);
        state.local.slot = Some(Slot::One);
        state.local.connection_id = Some(ConnectionId::new());
        let id = ConnectionId::new();
        state.mirrors.insert(
            id,
            RemoteMirror {
                connection_id: id,
                slot: Slot::Two,
                position: Vec3::new(5.0, 0.0, 0.0),
                visible: true,
                health: 100,
            },
        );

        state.degrade_to_practice();

        assert_eq!(state.game_type, GameType::Practice);
        assert!(state.mirrors.is_empty());
        assert_eq!(state.local, LocalPlayer::default());
        assert!(state.practice_target.is_some());
    }
}
