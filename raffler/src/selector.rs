//! Weighted winner selection.
//!
//! Every participant contributes `weight` ticket units to a pool. A draw
//! picks one unit uniformly at random; its owner wins and *all* of the
//! owner's remaining units leave the pool, so nobody can win twice.

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use raffler_core::ActorId;

/// Weight used for participants without an entry (or with a zero entry).
pub const DEFAULT_WEIGHT: u32 = 1;

/// Draws up to `winner_count` distinct winners from `participants`.
///
/// Missing or zero weights count as [`DEFAULT_WEIGHT`]. Duplicate
/// participants are ignored after their first occurrence. The result has
/// `min(winner_count, distinct participants)` entries in draw order.
pub fn select_winners<'a, R>(
    participants: impl IntoIterator<Item = &'a ActorId>,
    weights: &BTreeMap<ActorId, u32>,
    winner_count: usize,
    rng: &mut R,
) -> Vec<ActorId>
where
    R: Rng + ?Sized,
{
    let mut seen = HashSet::new();
    let mut pool: Vec<(&ActorId, u64)> = Vec::new();
    for actor in participants {
        if !seen.insert(actor) {
            continue;
        }
        let weight = weights
            .get(actor)
            .copied()
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_WEIGHT);
        pool.push((actor, u64::from(weight)));
    }

    let mut total: u64 = pool.iter().map(|(_, w)| w).sum();
    let target = winner_count.min(pool.len());
    let mut winners = Vec::with_capacity(target);

    while winners.len() < target && total > 0 {
        let mut ticket = rng.random_range(0..total);
        let index = pool
            .iter()
            .position(|(_, weight)| {
                if ticket < *weight {
                    true
                } else {
                    ticket -= weight;
                    false
                }
            })
            .unwrap_or(pool.len() - 1);

        let (actor, weight) = pool.swap_remove(index);
        total -= weight;
        winners.push(actor.clone());
    }

    winners
}
