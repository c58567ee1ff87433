//! Lifecycle scheduler.
//!
//! The `LifecycleScheduler` owns the transient side of every live entity:
//! one [`EntitySlot`] and one timer task each. The [`EntityStore`] owns
//! the durable side. Every mutating operation on an entity runs under its
//! slot lock, and a transition out of `Active` happens only after the
//! store write that backs it has succeeded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use raffler_core::{ActorId, CreateParams, Entity, EntityId, EntityState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainStep, PhaseChainManager};
use crate::clock::{Clock, SystemClock};
use crate::config::schema::{ChainConfig, SchedulerConfig};
use crate::error::{NotifyError, SchedulerError};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics::{self, FinalizeKind};
use crate::rate_limit::RateLimiter;
use crate::selector::{self, DEFAULT_WEIGHT};
use crate::store::EntityStore;

use super::notify::{NoTickets, Notifier, TicketSource};
use super::state::EntitySlot;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Delay before a timer retries a finalize that failed on storage.
const FINALIZE_RETRY_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a join or leave request that was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// The actor was added
    Joined,
    /// The actor was already a participant; nothing changed
    AlreadyJoined,
    /// The actor was removed
    Left,
    /// The actor was not a participant; nothing changed
    NotParticipant,
}

/// What a successful finalize did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// A standalone giveaway drew these winners
    Winners(Vec<ActorId>),
    /// A chain phase handed its qualifiers to the next phase
    ChainAdvanced {
        /// The phase now running
        next: EntityId,
        /// Its participants
        qualifiers: Vec<ActorId>,
    },
    /// A chain ended with these overall winners (empty if it ran dry)
    ChainCompleted(Vec<ActorId>),
}

// ============================================================================
// Options
// ============================================================================

/// Construction options for [`LifecycleScheduler`].
pub struct SchedulerOptions {
    /// Timer, cooldown and draw settings
    pub scheduler: SchedulerConfig,
    /// Tournament phase table
    pub chain: ChainConfig,
    /// Wall-clock source for deadlines
    pub clock: Arc<dyn Clock>,
    /// Reward collaborator
    pub tickets: Arc<dyn TicketSource>,
    /// Lifecycle event sink
    pub events: Arc<EventEmitter>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            chain: ChainConfig::default(),
            clock: Arc::new(SystemClock),
            tickets: Arc::new(NoTickets),
            events: Arc::new(EventEmitter::noop()),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Drives entities from `Active` to a terminal state.
pub struct LifecycleScheduler {
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    tickets: Arc<dyn TicketSource>,
    clock: Arc<dyn Clock>,
    events: Arc<EventEmitter>,
    rng: StdMutex<StdRng>,
    config: SchedulerConfig,
    chain: PhaseChainManager,
    slots: DashMap<EntityId, Arc<EntitySlot>>,
    limiter: RateLimiter,
    cancel: CancellationToken,
    ready: AtomicBool,
}

impl LifecycleScheduler {
    /// Creates a scheduler. It refuses creates until
    /// [`open_for_creates`](Self::open_for_creates) is called, which
    /// recovery does once it has re-armed persisted entities.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        notifier: Arc<dyn Notifier>,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        let rng = options
            .scheduler
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        Arc::new(Self {
            store,
            notifier,
            tickets: options.tickets,
            clock: options.clock,
            events: options.events,
            rng: StdMutex::new(rng),
            config: options.scheduler,
            chain: PhaseChainManager::new(options.chain),
            slots: DashMap::new(),
            limiter: RateLimiter::new(),
            cancel: CancellationToken::new(),
            ready: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Validates `params`, persists a new `Active` entity and arms its
    /// timer. An `end_time` already in the past fires immediately.
    ///
    /// # Errors
    ///
    /// - `NotReady` before recovery has finished
    /// - `Validation` if the parameters break a creation invariant
    /// - `Storage` if the row could not be written; nothing is armed
    pub async fn create(self: &Arc<Self>, params: CreateParams) -> Result<EntityId> {
        if !self.is_ready() {
            return Err(SchedulerError::NotReady);
        }
        params.validate(self.chain.max_phases())?;

        let entity = Entity::from_params(params);
        self.store.put(&entity).await?;
        self.announce_created(&entity);
        self.arm(&entity);
        Ok(entity.id)
    }

    /// Cancels an `Active` entity on behalf of `actor`.
    ///
    /// Returns `Ok(false)` if the entity reached a terminal state first.
    /// Once this returns, no timer can finalize the entity.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity is not live
    /// - `Storage` if the row could not be deleted; the entity stays `Active`
    pub async fn cancel(&self, id: &EntityId, actor: &ActorId) -> Result<bool> {
        let slot = self.slot(id)?;
        let guard = slot.lock().await;
        if !slot.is_active() {
            return Ok(false);
        }

        let entity = self.store.get(id).await?;
        self.store.delete(id).await?;
        if !slot.try_transition(EntityState::Active, EntityState::Cancelled) {
            return Ok(false);
        }
        self.release(id, &slot);
        drop(guard);

        metrics::record_cancelled();
        info!(entity_id = %id, cancelled_by = %actor, "entity cancelled");
        self.events.emit(Event::EntityCancelled {
            timestamp: self.clock.now(),
            entity_id: id.clone(),
            cancelled_by: actor.clone(),
        });

        if let Some(mut entity) = entity {
            entity.state = EntityState::Cancelled;
            report("cancelled", self.notifier.notify_cancelled(&entity, actor).await);
        }
        Ok(true)
    }

    /// Adds `actor` to the participants.
    ///
    /// # Errors
    ///
    /// - `RateLimited` inside the actor's cooldown
    /// - `NotFound` if the entity is not live
    /// - `JoinClosed` for tournament phases after the first
    /// - `Closed` once the deadline has passed
    /// - `Storage` if the change could not be persisted
    pub async fn join(&self, id: &EntityId, actor: &ActorId) -> Result<Membership> {
        self.change_membership(id, actor, |entity, actor| {
            if entity.participants.insert(actor.clone()) {
                Membership::Joined
            } else {
                Membership::AlreadyJoined
            }
        })
        .await
    }

    /// Removes `actor` from the participants.
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub async fn leave(&self, id: &EntityId, actor: &ActorId) -> Result<Membership> {
        self.change_membership(id, actor, |entity, actor| {
            if entity.participants.shift_remove(actor) {
                Membership::Left
            } else {
                Membership::NotParticipant
            }
        })
        .await
    }

    async fn change_membership(
        &self,
        id: &EntityId,
        actor: &ActorId,
        apply: impl FnOnce(&mut Entity, &ActorId) -> Membership,
    ) -> Result<Membership> {
        if !self.limiter.allow(actor, self.config.join_cooldown.get()) {
            metrics::record_rate_limited();
            return Err(SchedulerError::RateLimited(actor.to_string()));
        }

        let slot = self.slot(id)?;
        let guard = slot.lock().await;
        if !slot.is_active() {
            return Err(SchedulerError::NotFound(id.clone()));
        }
        let mut entity = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;

        if !entity.accepts_joins() {
            return Err(SchedulerError::JoinClosed(id.clone()));
        }
        if entity.is_expired(self.clock.now()) {
            return Err(SchedulerError::Closed(id.clone()));
        }

        let outcome = apply(&mut entity, actor);
        if matches!(outcome, Membership::Joined | Membership::Left) {
            self.store.put(&entity).await?;
        }
        drop(guard);

        debug!(entity_id = %id, %actor, ?outcome, "membership request");
        report("status", self.notifier.render_status(&entity).await);
        Ok(outcome)
    }

    // ========================================================================
    // Finalize
    // ========================================================================

    /// Finalizes an entity whose deadline has passed.
    ///
    /// Exactly-once: returns `Ok(None)` if the entity is not live or was
    /// already finalized or cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the terminal write failed. The entity then
    /// stays `Active` and a later finalize can retry.
    pub async fn finalize(self: &Arc<Self>, id: &EntityId) -> Result<Option<FinalizeOutcome>> {
        let Some(slot) = self.slots.get(id).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        let guard = slot.lock().await;
        if !slot.is_active() {
            return Ok(None);
        }

        let Some(mut entity) = self.store.get(id).await? else {
            warn!(entity_id = %id, "live entity has no stored row, dropping timer");
            slot.try_transition(EntityState::Active, EntityState::Ended);
            self.release(id, &slot);
            return Ok(None);
        };

        entity.ticket_weights = self.snapshot_weights(&entity).await;
        let winners = self.draw(&entity);

        // Durable side first; the in-memory transition follows it.
        let step = if entity.is_chain_phase() && !entity.is_final_phase() {
            Some(
                self.chain
                    .on_phase_finalized(self.store.as_ref(), self.clock.now(), &entity, &winners)
                    .await?,
            )
        } else {
            self.store.delete(id).await?;
            None
        };

        if !slot.try_transition(EntityState::Active, EntityState::Ended) {
            return Ok(None);
        }
        self.release(id, &slot);
        drop(guard);

        entity.state = EntityState::Ended;
        let now = self.clock.now();

        let outcome = match step {
            None if entity.is_chain_phase() => {
                self.complete_chain(&entity, winners.clone(), now).await;
                FinalizeOutcome::ChainCompleted(winners)
            }
            None => {
                metrics::record_finalized(FinalizeKind::Winners);
                info!(entity_id = %id, winners = winners.len(), "entity finalized");
                self.events.emit(Event::EntityFinalized {
                    timestamp: now,
                    entity_id: id.clone(),
                    winners: winners.clone(),
                });
                report("terminal", self.notifier.notify_terminal(&entity, &winners).await);
                FinalizeOutcome::Winners(winners)
            }
            Some(ChainStep::Exhausted) => {
                self.complete_chain(&entity, Vec::new(), now).await;
                FinalizeOutcome::ChainCompleted(Vec::new())
            }
            Some(ChainStep::Advanced { next }) => {
                let qualifiers: Vec<ActorId> = next.participants.iter().cloned().collect();
                entity.qualified_users = next.participants.clone();
                self.announce_created(&next);
                self.arm(&next);

                metrics::record_finalized(FinalizeKind::Advanced);
                if let Some(chain_id) = entity.chain_id.clone() {
                    self.events.emit(Event::ChainAdvanced {
                        timestamp: now,
                        chain_id,
                        finished: id.clone(),
                        next: next.id.clone(),
                        qualifiers: qualifiers.clone(),
                    });
                }
                report(
                    "chain_advanced",
                    self.notifier
                        .notify_chain_advanced(&entity, &next, &qualifiers)
                        .await,
                );
                FinalizeOutcome::ChainAdvanced {
                    next: next.id,
                    qualifiers,
                }
            }
        };

        Ok(Some(outcome))
    }

    async fn complete_chain(
        &self,
        last: &Entity,
        winners: Vec<ActorId>,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        metrics::record_finalized(FinalizeKind::ChainCompleted);
        info!(entity_id = %last.id, winners = winners.len(), "tournament completed");
        if let Some(chain_id) = last.chain_id.clone() {
            self.events.emit(Event::ChainCompleted {
                timestamp: now,
                chain_id,
                winners: winners.clone(),
            });
        }
        report(
            "chain_terminal",
            self.notifier.notify_chain_terminal(last, &winners).await,
        );
    }

    /// Pulls a weight for every participant, clamped to
    /// `[1, max_ticket_weight]`.
    async fn snapshot_weights(&self, entity: &Entity) -> BTreeMap<ActorId, u32> {
        let cap = self.config.max_ticket_weight.max(DEFAULT_WEIGHT);
        let mut weights = BTreeMap::new();
        for actor in &entity.participants {
            let weight = self
                .tickets
                .ticket_weight(actor)
                .await
                .unwrap_or(DEFAULT_WEIGHT)
                .clamp(DEFAULT_WEIGHT, cap);
            weights.insert(actor.clone(), weight);
        }
        weights
    }

    fn draw(&self, entity: &Entity) -> Vec<ActorId> {
        let count = usize::try_from(entity.winner_count).unwrap_or(usize::MAX);
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        selector::select_winners(&entity.participants, &entity.ticket_weights, count, &mut *rng)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Registers a live slot for `entity` without starting a timer.
    ///
    /// Any previous slot for the same id has its timer stopped.
    pub(crate) fn register(&self, entity: &Entity) -> Arc<EntitySlot> {
        let slot = Arc::new(EntitySlot::new(&self.cancel, entity.end_time));
        if let Some(previous) = self.slots.insert(entity.id.clone(), Arc::clone(&slot)) {
            previous.cancel_timer();
        }
        metrics::set_live_entities(self.slots.len());
        slot
    }

    /// Registers `entity` and spawns its timer task.
    pub(crate) fn arm(self: &Arc<Self>, entity: &Entity) {
        let slot = self.register(entity);
        let delay = (entity.end_time - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(entity_id = %entity.id, ?delay, "timer armed");

        let scheduler = Arc::clone(self);
        let id = entity.id.clone();
        tokio::spawn(async move {
            let mut wait = delay;
            loop {
                tokio::select! {
                    () = slot.timer_cancelled() => {
                        debug!(entity_id = %id, "timer cancelled");
                        break;
                    }
                    () = tokio::time::sleep(wait) => {}
                }

                match scheduler.finalize(&id).await {
                    Err(SchedulerError::Storage(e)) => {
                        error!(entity_id = %id, error = %e, "finalize failed, will retry");
                        wait = FINALIZE_RETRY_DELAY;
                    }
                    Err(e) => {
                        error!(entity_id = %id, error = %e, "finalize failed");
                        break;
                    }
                    Ok(_) => break,
                }
            }
        });
    }

    fn release(&self, id: &EntityId, slot: &Arc<EntitySlot>) {
        slot.cancel_timer();
        self.slots
            .remove_if(id, |_, current| Arc::ptr_eq(current, slot));
        metrics::set_live_entities(self.slots.len());
    }

    fn slot(&self, id: &EntityId) -> Result<Arc<EntitySlot>> {
        self.slots
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    fn announce_created(&self, entity: &Entity) {
        metrics::record_created();
        info!(
            entity_id = %entity.id,
            phase = entity.phase_index,
            of = entity.total_phases,
            end_time = %entity.end_time,
            "entity scheduled"
        );
        self.events.emit(Event::EntityCreated {
            timestamp: self.clock.now(),
            entity_id: entity.id.clone(),
            chain_id: entity.chain_id.clone(),
            phase_index: entity.phase_index,
            end_time: entity.end_time,
        });
    }

    // ========================================================================
    // Status refresh
    // ========================================================================

    /// Spawns the periodic status refresh.
    ///
    /// Every `status_interval` each live entity is re-read and passed to
    /// [`Notifier::render_status`], and stale rate-limiter entries are
    /// evicted. Stops on [`shutdown`](Self::shutdown).
    pub fn start_status_task(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.status_interval.get());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = scheduler.cancel.cancelled() => {
                        debug!("status task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.refresh_all().await;
                    }
                }
            }
        })
    }

    async fn refresh_all(&self) {
        self.limiter.evict_expired(self.config.join_cooldown.get());
        for id in self.live_ids() {
            match self.store.get(&id).await {
                Ok(Some(entity)) if entity.state == EntityState::Active => {
                    report("status", self.notifier.render_status(&entity).await);
                }
                Ok(_) => {}
                Err(e) => warn!(entity_id = %id, error = %e, "status refresh skipped"),
            }
        }
    }

    // ========================================================================
    // Lifecycle & Introspection
    // ========================================================================

    /// Starts accepting creates.
    pub fn open_for_creates(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once creates are accepted.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stops every timer and the status task. Stored rows are kept and
    /// picked up by the next recovery.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        info!(live = self.slots.len(), "scheduler stopped");
    }

    /// Deadline of a live entity.
    #[must_use]
    pub fn deadline(&self, id: &EntityId) -> Option<chrono::DateTime<chrono::Utc>> {
        self.slots.get(id).map(|s| s.end_time())
    }

    /// Number of entities with a live slot.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    /// Ids of all live entities.
    #[must_use]
    pub fn live_ids(&self) -> Vec<EntityId> {
        self.slots.iter().map(|s| s.key().clone()).collect()
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub(crate) fn events(&self) -> &EventEmitter {
        &self.events
    }
}

impl std::fmt::Debug for LifecycleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleScheduler")
            .field("live", &self.slots.len())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Logs and counts a failed notification. The transition stands.
fn report(kind: &'static str, result: std::result::Result<(), NotifyError>) {
    if let Err(e) = result {
        metrics::record_notify_failure(kind);
        warn!(kind, error = %e, "notification failed");
    }
}
