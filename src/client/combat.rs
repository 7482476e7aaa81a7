//! Local combat resolver - ray tests, trigger timing and accuracy bookkeeping

use glam::Vec3;

use crate::duel::ConnectionId;

use super::practice::PracticeTarget;
use super::state::RemoteMirror;

/// Seconds between shots while the trigger is held
pub const SPRAY_COOLDOWN: f32 = 0.05;

/// Score awarded per practice target hit
pub const PRACTICE_HIT_SCORE: u32 = 100;

/// Opponent body cylinder, approximated by a box
pub const BODY_RADIUS: f32 = 0.3;
pub const BODY_HEIGHT: f32 = 1.5;
/// Opponent head sphere
pub const HEAD_RADIUS: f32 = 0.3;
pub const HEAD_CENTER_HEIGHT: f32 = 2.1;

/// Half-line used for hit tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.normalize_or_zero(),
        }
    }

    /// Distance along the ray to the first sphere intersection
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let to_center = center - self.origin;
        let proj = to_center.dot(self.dir);
        let dist_sq = to_center.length_squared() - proj * proj;
        let radius_sq = radius * radius;
        if dist_sq > radius_sq {
            return None;
        }

        let half_chord = (radius_sq - dist_sq).sqrt();
        let near = proj - half_chord;
        let far = proj + half_chord;
        if far < 0.0 {
            None
        } else {
            Some(near.max(0.0))
        }
    }

    /// Distance along the ray to an axis-aligned box (slab test)
    pub fn intersect_aabb(&self, min: Vec3, max: Vec3) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.dir[axis];
            if dir.abs() < f32::EPSILON {
                if origin < min[axis] || origin > max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (min[axis] - origin) * inv;
            let mut t1 = (max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// Distance to an opponent model standing at `base`
    pub fn intersect_player(&self, base: Vec3) -> Option<f32> {
        let body = self.intersect_aabb(
            base + Vec3::new(-BODY_RADIUS, 0.0, -BODY_RADIUS),
            base + Vec3::new(BODY_RADIUS, BODY_HEIGHT, BODY_RADIUS),
        );
        let head = self.intersect_sphere(base + Vec3::Y * HEAD_CENTER_HEIGHT, HEAD_RADIUS);

        match (body, head) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Outcome of one shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    Miss,
    PracticeHit,
    OpponentHit(ConnectionId),
}

impl ShotResult {
    pub fn is_hit(&self) -> bool {
        !matches!(self, ShotResult::Miss)
    }
}

/// Resolve a shot against the practice target or the visible opponent mirrors.
///
/// The nearest intersected volume wins.
pub fn resolve_shot<'a>(
    ray: &Ray,
    practice_target: Option<&PracticeTarget>,
    mirrors: impl IntoIterator<Item = &'a RemoteMirror>,
) -> ShotResult {
    let mut best: Option<(f32, ShotResult)> = practice_target
        .and_then(|target| target.hit_distance(ray))
        .map(|d| (d, ShotResult::PracticeHit));

    for mirror in mirrors.into_iter().filter(|m| m.visible) {
        if let Some(d) = ray.intersect_player(mirror.position) {
            if best.map_or(true, |(nearest, _)| d < nearest) {
                best = Some((d, ShotResult::OpponentHit(mirror.connection_id)));
            }
        }
    }

    best.map_or(ShotResult::Miss, |(_, result)| result)
}

/// Trigger timing: a press or a held trigger fires at most once per cooldown
#[derive(Debug, Clone)]
pub struct SprayTrigger {
    cooldown: f32,
    last_shot_at: Option<f32>,
}

impl SprayTrigger {
    pub fn new(cooldown: f32) -> Self {
        Self {
            cooldown,
            last_shot_at: None,
        }
    }

    /// Returns true if a shot fires at client time `now`
    pub fn poll(&mut self, now: f32, pressed: bool, held: bool) -> bool {
        if !(pressed || held) {
            return false;
        }
        if let Some(last) = self.last_shot_at {
            if now - last < self.cooldown {
                return false;
            }
        }
        self.last_shot_at = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_shot_at = None;
    }
}

impl Default for SprayTrigger {
    fn default() -> Self {
        Self::new(SPRAY_COOLDOWN)
    }
}

/// Shot statistics for the local player only; never feeds the duel outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCombatState {
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub score: u32,
}

impl LocalCombatState {
    pub fn record(&mut self, result: ShotResult) {
        self.shots_fired += 1;
        if result.is_hit() {
            self.shots_hit += 1;
        }
        if result == ShotResult::PracticeHit {
            self.score += PRACTICE_HIT_SCORE;
        }
    }

    /// Hit percentage, 0 before the first shot
    pub fn accuracy(&self) -> f32 {
        if self.shots_fired == 0 {
            0.0
        } else {
            self.shots_hit as f32 / self.shots_fired as f32 * 100.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
