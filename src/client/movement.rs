//! Local movement prediction

use glam::{Vec2, Vec3};

use super::combat::Ray;

/// Units moved per 1/60 s frame while a key is held
pub const MOVEMENT_SPEED: f32 = 0.1;
/// Downward acceleration per 1/60 s frame
pub const GRAVITY: f32 = 0.3;
/// Upward velocity applied on jump
pub const JUMP_FORCE: f32 = 0.15;
/// Camera height above the body position
pub const EYE_HEIGHT: f32 = 2.0;
/// Radians of rotation per pixel of mouse movement
pub const MOUSE_SENSITIVITY: f32 = 0.002;
/// Minimum seconds between two move samples sent to the relay
pub const MOVE_SAMPLE_INTERVAL: f32 = 1.0 / 30.0;

const FRAME_NORMALIZATION: f32 = 60.0;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Held movement keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveKeys {
    fn axis(positive: bool, negative: bool) -> f32 {
        (positive as i8 - negative as i8) as f32
    }
}

/// First-person controller driven entirely by local input
#[derive(Debug, Clone)]
pub struct MovementController {
    /// Camera position
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    jump_velocity: f32,
    grounded: bool,
}

impl MovementController {
    pub fn new(body: Vec3) -> Self {
        let mut controller = Self {
            eye: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            jump_velocity: 0.0,
            grounded: true,
        };
        controller.place_at_body(body);
        controller
    }

    /// Teleport so the body stands at `body`, cancelling any jump
    pub fn place_at_body(&mut self, body: Vec3) {
        self.eye = Vec3::new(body.x, body.y + EYE_HEIGHT, body.z);
        self.jump_velocity = 0.0;
        self.grounded = true;
    }

    /// Body position: the eye projected to the ground
    pub fn body_position(&self) -> Vec3 {
        Vec3::new(self.eye.x, 0.0, self.eye.z)
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Apply a mouse delta in pixels
    pub fn look(&mut self, delta: Vec2) {
        self.yaw -= delta.x * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - delta.y * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Turn the camera to face `point`
    pub fn look_at(&mut self, point: Vec3) {
        let to = point - self.eye;
        let flat = Vec2::new(to.x, to.z).length();
        if to.length_squared() <= f32::EPSILON {
            return;
        }
        self.yaw = (-to.x).atan2(-to.z);
        self.pitch = to.y.atan2(flat).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn look_direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    /// Ray from the camera through the crosshair
    pub fn eye_ray(&self) -> Ray {
        Ray::new(self.eye, self.look_direction())
    }

    pub fn jump(&mut self) {
        if self.grounded {
            self.jump_velocity = JUMP_FORCE;
            self.grounded = false;
        }
    }

    /// Advance one frame of `dt` seconds
    pub fn update(&mut self, dt: f32, keys: MoveKeys) {
        let scale = dt * FRAME_NORMALIZATION;
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let forward = Vec3::new(-sin_yaw, 0.0, -cos_yaw);
        let right = Vec3::new(cos_yaw, 0.0, -sin_yaw);

        let step = MOVEMENT_SPEED * scale;
        self.eye += forward * MoveKeys::axis(keys.forward, keys.backward) * step;
        self.eye += right * MoveKeys::axis(keys.right, keys.left) * step;

        if !self.grounded {
            self.eye.y += self.jump_velocity;
            self.jump_velocity -= GRAVITY * scale;

            if self.eye.y <= EYE_HEIGHT {
                self.eye.y = EYE_HEIGHT;
                self.jump_velocity = 0.0;
                self.grounded = true;
            }
        }
    }
}

/// Caps how often the predicted position is sent to the relay
#[derive(Debug, Clone)]
pub struct MoveSampler {
    min_interval: f32,
    last_sent_at: Option<f32>,
    last_position: Option<Vec3>,
}

impl MoveSampler {
    pub fn new(min_interval: f32) -> Self {
        Self {
            min_interval,
            last_sent_at: None,
            last_position: None,
        }
    }

    /// Returns true when `position` should be sent at client time `now`
    pub fn should_send(&mut self, now: f32, position: Vec3) -> bool {
        if self.last_position == Some(position) {
            return false;
        }
        if let Some(last) = self.last_sent_at {
            if now - last < self.min_interval {
                return false;
            }
        }
        self.last_sent_at = Some(now);
        self.last_position = Some(position);
        true
    }

    pub fn reset(&mut self) {
        self.last_sent_at = None;
        self.last_position = None;
    }
}

impl Default for MoveSampler {
    fn default() -> Self {
        Self::new(MOVE_SAMPLE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn forward_moves_along_negative_z_at_zero_yaw() {
        let mut controller = MovementController::new(Vec3::ZERO);
        let keys = MoveKeys {
            forward: true,
            ..Default::default()
        };

        for _ in 0..10 {
            controller.update(FRAME, keys);
        }

        assert!(approx(controller.body_position(), Vec3::new(0.0, 0.0, -1.0)));
        assert_eq!(controller.eye.y, EYE_HEIGHT);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut controller = MovementController::new(Vec3::new(3.0, 0.0, 1.0));
        let keys = MoveKeys {
            forward: true,
            backward: true,
            left: true,
            right: true,
        };

        controller.update(FRAME, keys);

        assert!(approx(controller.body_position(), Vec3::new(3.0, 0.0, 1.0)));
    }

    #[test]
    fn movement_scales_with_frame_time() {
        let mut slow = MovementController::new(Vec3::ZERO);
        let mut fast = MovementController::new(Vec3::ZERO);
        let keys = MoveKeys {
            right: true,
            ..Default::default()
        };

        slow.update(2.0 * FRAME, keys);
        fast.update(FRAME, keys);
        fast.update(FRAME, keys);

        assert!(approx(slow.body_position(), fast.body_position()));
        assert!(approx(slow.body_position(), Vec3::new(0.2, 0.0, 0.0)));
    }

    #[test]
    fn jump_rises_then_lands() {
        let mut controller = MovementController::new(Vec3::ZERO);
        controller.jump();
        assert!(!controller.is_grounded());

        controller.update(FRAME, MoveKeys::default());
        assert!(controller.eye.y > EYE_HEIGHT);

        for _ in 0..10 {
            controller.update(FRAME, MoveKeys::default());
        }
        assert!(controller.is_grounded());
        assert_eq!(controller.eye.y, EYE_HEIGHT);
    }

    #[test]
    fn look_at_points_the_ray_at_the_target() {
        let mut controller = MovementController::new(Vec3::new(-5.0, 0.0, 0.0));
        let target = Vec3::new(5.0, 2.0, 3.0);

        controller.look_at(target);

        let expected = (target - controller.eye).normalize();
        assert!(approx(controller.look_direction(), expected));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut controller = MovementController::new(Vec3::ZERO);
        controller.look(Vec2::new(0.0, -100_000.0));
        assert!(controller.pitch < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn sampler_skips_unchanged_and_too_frequent_samples() {
        let mut sampler = MoveSampler::new(0.1);
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 0.0, 0.0);

        assert!(sampler.should_send(0.0, a));
        assert!(!sampler.should_send(0.05, b));
        assert!(sampler.should_send(0.5, b));
        assert!(!sampler.should_send(1.0, b));

        sampler.reset();
        assert!(sampler.should_send(1.01, b));
    }
}
