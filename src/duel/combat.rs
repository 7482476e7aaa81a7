//! Combat system - damage, death and respawn transitions

use tracing::debug;

use super::participant::{ConnectionId, Position, HIT_DAMAGE, MAX_HEALTH};
use super::registry::SessionRegistry;

/// Result of applying a hit-intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Stale or invalid target; nothing changed
    Ignored,
    /// Target survived with the given health
    Damaged { health: u8 },
    /// Target reached zero health on this hit
    Killed,
}

/// Combat system for managing damage and life state
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u8, damage: u8) -> (u8, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }

    /// Apply one hit-intent from `shooter` against `target`.
    ///
    /// Unknown shooters, unknown or dead targets and self-hits are silent no-ops.
    /// On a lethal hit health is clamped to zero and the target is marked dead in
    /// the same step.
    pub fn apply_hit(
        registry: &mut SessionRegistry,
        shooter: &ConnectionId,
        target: &ConnectionId,
    ) -> HitOutcome {
        if shooter == target || registry.get(shooter).is_none() {
            debug!(shooter = %shooter, target = %target, "Ignoring hit from invalid shooter");
            return HitOutcome::Ignored;
        }

        let Some(victim) = registry.get_mut(target) else {
            debug!(target = %target, "Ignoring hit on unknown target");
            return HitOutcome::Ignored;
        };

        if !victim.is_alive() {
            debug!(target = %target, "Ignoring hit on dead target");
            return HitOutcome::Ignored;
        }

        let (new_health, killed) = Self::apply_damage(victim.health, HIT_DAMAGE);
        victim.health = new_health;

        if killed {
            victim.is_dead = true;
            HitOutcome::Killed
        } else {
            HitOutcome::Damaged { health: new_health }
        }
    }

    /// Bring a dead participant back at its slot's spawn point.
    ///
    /// Returns `None` when the connection is gone or is not dead, which is the
    /// case for a timer that outlived its participant.
    pub fn respawn(registry: &mut SessionRegistry, target: &ConnectionId) -> Option<Position> {
        let participant = registry.get_mut(target)?;
        if participant.is_alive() {
            return None;
        }

        participant.health = MAX_HEALTH;
        participant.is_dead = false;
        participant.position = participant.slot.spawn_point();
        Some(participant.position)
    }
}
