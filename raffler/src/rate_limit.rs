//! Per-actor cooldown guard.
//!
//! Not scoped to any entity: an actor that just joined one giveaway is
//! throttled for all of them until its cooldown passes.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use raffler_core::ActorId;
use tokio::time::Instant;

/// Remembers when each actor last got through.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_allowed: DashMap<ActorId, Instant>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the attempt if `actor` has not been
    /// allowed within the last `cooldown`; returns `false` otherwise.
    ///
    /// A rejected attempt does not extend the window.
    pub fn allow(&self, actor: &ActorId, cooldown: Duration) -> bool {
        let now = Instant::now();
        match self.last_allowed.entry(actor.clone()) {
            Entry::Occupied(mut slot) => {
                if now.duration_since(*slot.get()) < cooldown {
                    return false;
                }
                slot.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Drops entries older than `max_cooldown`.
    ///
    /// Absence is indistinguishable from "never seen", so this never
    /// changes an `allow` decision made with a cooldown up to `max_cooldown`.
    pub fn evict_expired(&self, max_cooldown: Duration) {
        let now = Instant::now();
        self.last_allowed
            .retain(|_, last| now.duration_since(*last) < max_cooldown);
    }

    /// Number of actors currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_allowed.len()
    }

    /// Returns `true` if no actor is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_allowed.is_empty()
    }
}
