//! Tournament phase chains.
//!
//! A tournament is a chain of entities sharing one [`ChainId`]. When a
//! non-final phase finalizes, its winners become the qualifiers of the
//! next phase, which is created here and handed back to the scheduler to
//! arm. Phase `n` (for `n >= 2`) draws
//! `max(1, ceil(ratio_n × winners of phase 1))` winners and runs for the
//! configured duration.

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexSet;
use raffler_core::{ActorId, ChainId, Entity};
use tracing::{debug, info, warn};

use crate::config::schema::{ChainConfig, PhaseConfig};
use crate::error::StoreError;
use crate::store::EntityStore;

/// What happened after a non-final phase finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// `next` has been persisted and must be armed.
    Advanced {
        /// The follow-up phase, `Active`
        next: Entity,
    },
    /// Nobody qualified; the chain ends here with no overall winners.
    Exhausted,
}

/// Builds follow-up phases from the configured phase table.
#[derive(Debug, Clone)]
pub struct PhaseChainManager {
    config: ChainConfig,
}

impl PhaseChainManager {
    /// Creates a manager for the given phase table.
    #[must_use]
    pub const fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    /// Longest chain accepted at create.
    #[must_use]
    pub fn max_phases(&self) -> u32 {
        self.config.max_phases()
    }

    /// Winner count of a later phase in a chain whose first phase drew
    /// `base` winners.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn next_winner_count(base: u32, ratio: f64) -> u32 {
        let scaled = (f64::from(base) * ratio).ceil();
        // `as` saturates; NaN becomes 0 and is lifted by the floor.
        (scaled as u32).clamp(1, base.max(1))
    }

    /// Settings for `phase_index`.
    ///
    /// Chains recovered from an older, longer table reuse its last entry.
    fn phase_settings(&self, phase_index: u32) -> Option<&PhaseConfig> {
        self.config
            .phase(phase_index)
            .or_else(|| self.config.phases.last())
    }

    /// Hands a finished non-final phase over to its successor.
    ///
    /// If the successor already exists (a previous attempt crashed after
    /// persisting it) it is reused untouched. Otherwise a new phase is
    /// built from `finished` with `qualifiers` as its participants. The
    /// successor is written before the finished phase is deleted, so a
    /// crash in between leaves both rows and recovery keeps the later one.
    ///
    /// # Errors
    ///
    /// Returns the first store failure; nothing is deleted in that case.
    pub async fn on_phase_finalized(
        &self,
        store: &dyn EntityStore,
        now: DateTime<Utc>,
        finished: &Entity,
        qualifiers: &[ActorId],
    ) -> Result<ChainStep, StoreError> {
        let Some(chain_id) = finished.chain_id.as_ref() else {
            return Ok(ChainStep::Exhausted);
        };
        let next_index = finished.phase_index + 1;

        if let Some(existing) = store.find_phase(chain_id, next_index).await? {
            if existing.state.is_terminal() {
                warn!(%chain_id, phase = next_index, "successor phase already terminal");
            } else {
                debug!(%chain_id, phase = next_index, "reusing persisted successor phase");
                store.delete(&finished.id).await?;
                return Ok(ChainStep::Advanced { next: existing });
            }
        }

        if qualifiers.is_empty() {
            info!(%chain_id, phase = finished.phase_index, "no qualifiers, tournament ends early");
            store.delete(&finished.id).await?;
            return Ok(ChainStep::Exhausted);
        }

        let Some(next) = self.build_next(chain_id, finished, now, qualifiers) else {
            store.delete(&finished.id).await?;
            return Ok(ChainStep::Exhausted);
        };

        store.put(&next).await?;
        store.delete(&finished.id).await?;

        info!(
            %chain_id,
            phase = next.phase_index,
            winner_count = next.winner_count,
            qualifiers = qualifiers.len(),
            end_time = %next.end_time,
            "tournament phase scheduled"
        );
        Ok(ChainStep::Advanced { next })
    }

    fn build_next(
        &self,
        chain_id: &ChainId,
        finished: &Entity,
        now: DateTime<Utc>,
        qualifiers: &[ActorId],
    ) -> Option<Entity> {
        let next_index = finished.phase_index + 1;
        let Some(settings) = self.phase_settings(next_index) else {
            warn!(%chain_id, phase = next_index, "no phase table configured, ending tournament");
            return None;
        };

        let winner_count =
            Self::next_winner_count(finished.chain_base_winner_count(), settings.ratio);
        let duration = TimeDelta::from_std(settings.duration.get()).unwrap_or(TimeDelta::MAX);
        let end_time = now
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let qualifiers: IndexSet<ActorId> = qualifiers.iter().cloned().collect();
        finished.next_phase(winner_count, now, end_time, &qualifiers)
    }
}
