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

/// Per-connection inbound frame limiter.
///
/// Clients stream their own state every render frame, so the quota sits well
/// above the tick rate; it only exists to stop a runaway client from flooding
/// the match task queue.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    input_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(frames_per_second: u32) -> Self {
        Self {
            input_limiter: create_limiter(frames_per_second),
        }
    }

    /// Check if an inbound frame is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_above_quota_is_rejected() {
        let limiter = ConnectionRateLimiter::new(3);
        let allowed = (0..10).filter(|_| limiter.check_input()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_quota_still_admits_one() {
        let limiter = ConnectionRateLimiter::new(0);
        assert!(limiter.check_input());
    }
}
