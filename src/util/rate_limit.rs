//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default cap on relayed movement samples per connection
pub const MOVE_RATE_LIMIT: u32 = 30;

/// Per-connection movement sampler
#[derive(Clone)]
pub struct MoveRateLimiter {
    limiter: Arc<Limiter>,
}

impl MoveRateLimiter {
    pub fn new(moves_per_second: u32) -> Self {
        Self {
            limiter: create_limiter(moves_per_second),
        }
    }

    /// Check if a move sample may be relayed (returns true if allowed)
    pub fn check_move(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for MoveRateLimiter {
    fn default() -> Self {
        Self::new(MOVE_RATE_LIMIT)
    }
}
