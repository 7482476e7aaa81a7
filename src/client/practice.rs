//! Single-player practice target

use std::f32::consts::FRAC_PI_4;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::combat::Ray;

pub const TARGET_RADIUS: f32 = 1.0;
pub const TARGET_HEIGHT: f32 = 9.0;
/// Half-size of the box the target wanders in
pub const TARGET_BOUNDARY: f32 = 8.0;
/// Units per 1/60 s frame
pub const TARGET_SPEED: f32 = 0.075;
pub const MIN_DIRECTION_TIME: f32 = 1.0;
pub const MAX_DIRECTION_TIME: f32 = 3.0;

const FRAME_NORMALIZATION: f32 = 60.0;

/// A sphere that drifts on one of eight compass headings once shot at
#[derive(Debug, Clone)]
pub struct PracticeTarget {
    pub position: Vec3,
    pub speed: f32,
    moving: bool,
    heading: f32,
    next_heading_change: f32,
    rng: StdRng,
}

impl PracticeTarget {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            position: Self::home(),
            speed: TARGET_SPEED,
            moving: false,
            heading: 0.0,
            next_heading_change: 0.0,
            rng,
        }
    }

    fn home() -> Vec3 {
        Vec3::new(0.0, TARGET_HEIGHT, 0.0)
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Begin wandering; a no-op once started
    pub fn start(&mut self) {
        self.moving = true;
    }

    pub fn reset(&mut self) {
        self.position = Self::home();
        self.moving = false;
        self.next_heading_change = 0.0;
    }

    pub fn hit_distance(&self, ray: &Ray) -> Option<f32> {
        ray.intersect_sphere(self.position, TARGET_RADIUS)
    }

    /// Advance one frame at client time `now`
    pub fn update(&mut self, now: f32, dt: f32) {
        if !self.moving {
            return;
        }

        if now >= self.next_heading_change {
            self.reroll_heading(now);
        }

        let step = self.speed * dt * FRAME_NORMALIZATION;
        let (sin, cos) = self.heading.sin_cos();
        let next_x = self.position.x + cos * step;
        let next_y = self.position.y + sin * step;

        if Self::in_bounds(next_x, next_y) {
            self.position = Vec3::new(next_x, next_y, 0.0);
        } else {
            self.reroll_heading(now);
        }
    }

    fn in_bounds(x: f32, y: f32) -> bool {
        x.abs() <= TARGET_BOUNDARY && (y - TARGET_HEIGHT).abs() <= TARGET_BOUNDARY
    }

    fn reroll_heading(&mut self, now: f32) {
        self.heading = self.rng.gen_range(0..8) as f32 * FRAC_PI_4;
        self.next_heading_change = now + self.rng.gen_range(MIN_DIRECTION_TIME..MAX_DIRECTION_TIME);
    }
}

impl Default for PracticeTarget {
    fn default() -> Self {
        Self::new()
    }
}
