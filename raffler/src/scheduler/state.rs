//! Per-entity timer slot.
//!
//! The scheduler keeps one [`EntitySlot`] for every entity with a live
//! timer. The slot is the serialization point for that entity: join,
//! leave, cancel and finalize all hold its lock, and the lifecycle state
//! only leaves `Active` through [`EntitySlot::try_transition`].

use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use raffler_core::EntityState;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Transient handle for one live entity.
pub struct EntitySlot {
    /// Encoded [`EntityState`], advanced via CAS
    state: AtomicU8,
    /// Orders operations on this entity
    lock: Mutex<()>,
    /// Stops this entity's timer task
    timer: CancellationToken,
    /// Deadline the timer was armed for
    end_time: DateTime<Utc>,
}

impl EntitySlot {
    /// Creates an `Active` slot whose timer stops when `parent` is
    /// cancelled or when [`cancel_timer`](Self::cancel_timer) is called.
    #[must_use]
    pub fn new(parent: &CancellationToken, end_time: DateTime<Utc>) -> Self {
        Self {
            state: AtomicU8::new(EntityState::Active.as_u8()),
            lock: Mutex::new(()),
            timer: parent.child_token(),
            end_time,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        EntityState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Returns `true` while the entity is `Active`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == EntityState::Active
    }

    /// Atomically moves from `from` to `to`.
    ///
    /// Returns `true` only for the caller that performed the transition.
    pub fn try_transition(&self, from: EntityState, to: EntityState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Waits for exclusive access to the entity.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Stops the timer task, if it is still waiting.
    pub fn cancel_timer(&self) {
        self.timer.cancel();
    }

    /// Resolves once the timer has been stopped.
    pub async fn timer_cancelled(&self) {
        self.timer.cancelled().await;
    }

    /// Deadline this slot was armed for.
    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }
}

impl std::fmt::Debug for EntitySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySlot")
            .field("state", &self.state())
            .field("end_time", &self.end_time)
            .finish_non_exhaustive()
    }
}
