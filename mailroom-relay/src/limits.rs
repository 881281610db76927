//! Rate pacing for transport calls.
//!
//! The provider throttles both per-chat and globally, so the relay
//! paces itself on the same two axes before every transport call:
//! a direct limiter for aggregate throughput and a keyed limiter per
//! destination user. Both use the governor crate, the keyed one backed
//! by DashMap.
//!
//! Unlike an admission check, pacing *waits*: inbound events are never
//! rejected for arriving too fast, they queue on their per-user lock.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use mailroom_types::UserId;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate pacers for outbound transport calls.
#[derive(Clone)]
pub struct RateLimits {
    /// Caps aggregate calls across all users.
    global_limiter: Arc<DirectLimiter>,

    /// Caps calls concerning a single user's mailbox.
    ///
    /// Configured via `limits.per_user_per_minute`.
    user_limiter: Arc<KeyedLimiter<UserId>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("global_limiter", &"DirectLimiter")
            .field("user_limiter", &"KeyedLimiter<UserId>")
            .finish()
    }
}

impl RateLimits {
    /// Create rate pacers from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured values are zero.
    pub fn new(config: &LimitsConfig) -> Self {
        let global_per_minute = NonZeroU32::new(config.global_per_minute)
            .expect("global_per_minute must be > 0");
        let global_quota = Quota::per_minute(global_per_minute);

        let per_user_per_minute = NonZeroU32::new(config.per_user_per_minute)
            .expect("per_user_per_minute must be > 0");
        let user_quota = Quota::per_minute(per_user_per_minute);

        Self {
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
            user_limiter: Arc::new(RateLimiter::keyed(user_quota)),
        }
    }

    /// Wait until one transport call concerning `user` is allowed.
    pub async fn acquire(&self, user: UserId) {
        self.global_limiter.until_ready().await;
        self.user_limiter.until_key_ready(&user).await;
    }

    /// Get the number of tracked user keys (for diagnostics).
    pub fn user_keys_count(&self) -> usize {
        self.user_limiter.len()
    }

    /// Evict per-user limiter entries that have fully recharged.
    ///
    /// Long-idle users leave entries in the DashMap; call this
    /// periodically to keep it bounded.
    pub fn shrink(&self) {
        self.user_limiter.retain_recent();
    }
}
