//! Collaborator seams.
//!
//! The scheduler never renders anything or talks to a chat platform
//! itself. It calls a [`Notifier`] after each committed transition and
//! pulls ticket weights from a [`TicketSource`] at finalize time.

use raffler_core::{ActorId, Entity};
use tracing::info;

use crate::error::NotifyError;

/// Result of a notifier call.
pub type NotifyResult = std::result::Result<(), NotifyError>;

/// Presentation and messaging collaborator.
///
/// Every terminal callback is invoked at most once per entity, after the
/// transition has been committed to the store. Errors are logged and
/// counted; they never undo the transition and are not retried.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Refreshes the live display of an active entity.
    async fn render_status(&self, entity: &Entity) -> NotifyResult;

    /// A standalone giveaway ended with `winners` (possibly empty).
    async fn notify_terminal(&self, entity: &Entity, winners: &[ActorId]) -> NotifyResult;

    /// `entity` was cancelled by `cancelled_by`.
    async fn notify_cancelled(&self, entity: &Entity, cancelled_by: &ActorId) -> NotifyResult;

    /// A chain phase ended and `next` now runs with `qualifiers`.
    async fn notify_chain_advanced(
        &self,
        finished: &Entity,
        next: &Entity,
        qualifiers: &[ActorId],
    ) -> NotifyResult;

    /// The last phase of a chain ended with the tournament's `winners`.
    ///
    /// `winners` is empty when an earlier phase had nobody left to
    /// qualify.
    async fn notify_chain_terminal(&self, last: &Entity, winners: &[ActorId]) -> NotifyResult;

    /// Re-establishes the external context of a recovered entity (its
    /// display surface, its channel).
    ///
    /// An error makes recovery drop the entity instead of re-arming it.
    async fn resolve_context(&self, _entity: &Entity) -> NotifyResult {
        Ok(())
    }
}

/// Reward collaborator queried for ticket weights at finalize.
#[async_trait::async_trait]
pub trait TicketSource: Send + Sync {
    /// Weight for `actor`, or `None` if the reward system has no answer.
    async fn ticket_weight(&self, actor: &ActorId) -> Option<u32>;
}

/// A reward system that never answers; everyone draws with weight 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTickets;

#[async_trait::async_trait]
impl TicketSource for NoTickets {
    async fn ticket_weight(&self, _actor: &ActorId) -> Option<u32> {
        None
    }
}

/// Notifier that reports every callback through `tracing`.
///
/// Used by `raffler run` when no presentation layer is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

fn names(actors: &[ActorId]) -> String {
    actors
        .iter()
        .map(ActorId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn render_status(&self, entity: &Entity) -> NotifyResult {
        tracing::debug!(
            entity_id = %entity.id,
            participants = entity.participants.len(),
            end_time = %entity.end_time,
            "status"
        );
        Ok(())
    }

    async fn notify_terminal(&self, entity: &Entity, winners: &[ActorId]) -> NotifyResult {
        if winners.is_empty() {
            info!(entity_id = %entity.id, prize = %entity.prize, "giveaway ended without participants");
        } else {
            info!(
                entity_id = %entity.id,
                prize = %entity.prize,
                winners = %names(winners),
                "giveaway ended"
            );
        }
        Ok(())
    }

    async fn notify_cancelled(&self, entity: &Entity, cancelled_by: &ActorId) -> NotifyResult {
        info!(entity_id = %entity.id, %cancelled_by, "giveaway cancelled");
        Ok(())
    }

    async fn notify_chain_advanced(
        &self,
        finished: &Entity,
        next: &Entity,
        qualifiers: &[ActorId],
    ) -> NotifyResult {
        info!(
            finished = %finished.id,
            next = %next.id,
            phase = next.phase_index,
            of = next.total_phases,
            qualifiers = %names(qualifiers),
            "tournament advanced"
        );
        Ok(())
    }

    async fn notify_chain_terminal(&self, last: &Entity, winners: &[ActorId]) -> NotifyResult {
        info!(
            entity_id = %last.id,
            prize = %last.prize,
            winners = %names(winners),
            "tournament finished"
        );
        Ok(())
    }
}
