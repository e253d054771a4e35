//! Login rate limiting

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter keyed by an arbitrary string (email, IP, ...)
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Create a keyed limiter allowing `per_minute` attempts per key
pub fn create_keyed_limiter(per_minute: u32) -> Arc<KeyedLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Login attempts per email
#[derive(Clone)]
pub struct LoginRateLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl LoginRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            limiter: create_keyed_limiter(per_minute),
        }
    }

    /// `false` once the key has used up its quota
    pub fn check(&self, email: &str) -> bool {
        self.limiter
            .check_key(&email.trim().to_lowercase())
            .is_ok()
    }

    /// Drop state for keys whose quota has fully replenished
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
