//! Startup recovery.
//!
//! Runs once, before the scheduler accepts creates, and reconciles the
//! store (durable truth) with the scheduler (live timers):
//!
//! - rows already terminal are deleted
//! - chain phases superseded by a later persisted phase are deleted
//! - rows whose external context cannot be resolved are deleted
//! - overdue rows are finalized on the spot, without a timer
//! - everything else gets its timer re-armed for the stored deadline

use std::collections::HashMap;
use std::sync::Arc;

use raffler_core::{ChainId, Entity};
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::observability::events::Event;
use crate::scheduler::LifecycleScheduler;
use crate::store::StoredRow;

/// Counts from one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Overdue entities finalized immediately
    pub finalized: usize,
    /// Entities whose timers were re-armed
    pub rearmed: usize,
    /// Rows deleted as stale or unresolvable, plus overdue rows that
    /// vanished before they could be finalized
    pub dropped: usize,
    /// Rows left in place because they could not be decoded
    pub corrupt: usize,
}

/// Reconciles persisted entities with live timers.
#[derive(Debug)]
pub struct RecoveryManager {
    scheduler: Arc<LifecycleScheduler>,
}

impl RecoveryManager {
    /// Creates a recovery pass for `scheduler`.
    #[must_use]
    pub const fn new(scheduler: Arc<LifecycleScheduler>) -> Self {
        Self { scheduler }
    }

    /// Runs recovery and opens the scheduler for creates.
    ///
    /// Per-entity failures never abort the pass.
    ///
    /// # Errors
    ///
    /// Returns `Storage` only if the stored rows cannot be enumerated at
    /// all; the scheduler then stays closed.
    pub async fn recover(&self) -> Result<RecoveryReport, SchedulerError> {
        let store = Arc::clone(self.scheduler.store());
        let notifier = Arc::clone(self.scheduler.notifier());
        let rows = store.list_all().await?;

        let mut report = RecoveryReport::default();
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                StoredRow::Loaded(entity) => entities.push(entity),
                StoredRow::Corrupt { key, error } => {
                    warn!(key, %error, "skipping unreadable row");
                    report.corrupt += 1;
                }
            }
        }

        let latest = latest_phases(&entities);
        entities.sort_by_key(|e| e.end_time);
        let now = self.scheduler.now();

        for entity in entities {
            if let Some(reason) = stale_reason(&entity, &latest) {
                debug!(entity_id = %entity.id, reason, "dropping row");
                self.drop_row(&entity, &mut report).await;
                continue;
            }

            if let Err(e) = notifier.resolve_context(&entity).await {
                warn!(entity_id = %entity.id, error = %e, "context gone, dropping entity");
                self.drop_row(&entity, &mut report).await;
                continue;
            }

            if entity.is_expired(now) {
                self.scheduler.register(&entity);
                match self.scheduler.finalize(&entity.id).await {
                    Ok(Some(_)) => report.finalized += 1,
                    Ok(None) => {
                        debug!(entity_id = %entity.id, "row vanished before finalize");
                        report.dropped += 1;
                    }
                    Err(e) => {
                        warn!(entity_id = %entity.id, error = %e, "overdue finalize failed, arming retry");
                        self.scheduler.arm(&entity);
                        report.rearmed += 1;
                    }
                }
            } else {
                self.scheduler.arm(&entity);
                report.rearmed += 1;
            }
        }

        info!(
            finalized = report.finalized,
            rearmed = report.rearmed,
            dropped = report.dropped,
            corrupt = report.corrupt,
            "recovery complete"
        );
        self.scheduler.events().emit(Event::RecoveryCompleted {
            timestamp: self.scheduler.now(),
            finalized: report.finalized,
            rearmed: report.rearmed,
            dropped: report.dropped,
            corrupt: report.corrupt,
        });
        self.scheduler.open_for_creates();
        Ok(report)
    }

    async fn drop_row(&self, entity: &Entity, report: &mut RecoveryReport) {
        if let Err(e) = self.scheduler.store().delete(&entity.id).await {
            warn!(entity_id = %entity.id, error = %e, "could not delete dropped row");
        }
        report.dropped += 1;
    }
}

/// Highest persisted phase index per chain.
fn latest_phases(entities: &[Entity]) -> HashMap<ChainId, u32> {
    let mut latest: HashMap<ChainId, u32> = HashMap::new();
    for entity in entities {
        if let Some(chain_id) = &entity.chain_id {
            let slot = latest.entry(chain_id.clone()).or_default();
            *slot = (*slot).max(entity.phase_index);
        }
    }
    latest
}

fn stale_reason(entity: &Entity, latest: &HashMap<ChainId, u32>) -> Option<&'static str> {
    if entity.state.is_terminal() {
        return Some("terminal");
    }
    let superseded = entity
        .chain_id
        .as_ref()
        .and_then(|c| latest.get(c))
        .is_some_and(|max| *max > entity.phase_index);
    superseded.then_some("superseded by a later phase")
}
