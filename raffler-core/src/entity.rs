//! Entity record and identifier types
//!
//! An entity is one giveaway or one tournament phase. The record defined
//! here is exactly what gets persisted: one row per entity keyed by
//! [`EntityId`], with typed collections instead of encoded string blobs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wraps an existing identifier string.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a user (participant, organizer, canceller).
    ActorId
);

string_id!(
    /// Stable identifier of one entity for its whole lifetime.
    EntityId
);

string_id!(
    /// Groups the phase entities of one tournament.
    ChainId
);

impl EntityId {
    /// Generates a fresh random identifier for a standalone entity.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Deterministic identifier of phase `phase_index` of a chain.
    ///
    /// Re-creating the same phase after a crash therefore upserts the same
    /// row instead of producing a duplicate.
    #[must_use]
    pub fn for_phase(chain_id: &ChainId, phase_index: u32) -> Self {
        Self(format!("{chain_id}-p{phase_index}"))
    }
}

impl ChainId {
    /// Generates a fresh random chain identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state of an entity.
///
/// The only transitions are `Active → Cancelled` and `Active → Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Accepting participants and waiting for its deadline
    #[default]
    Active,
    /// Stopped by an explicit cancel
    Cancelled,
    /// Finalized after its deadline passed
    Ended,
}

impl EntityState {
    /// Returns `true` for `Cancelled` and `Ended`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Encodes the state for storage in an atomic.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Cancelled => 1,
            Self::Ended => 2,
        }
    }

    /// Decodes a state previously encoded with [`as_u8`](Self::as_u8).
    ///
    /// Unknown values decode as `Ended` so a corrupted slot can never be
    /// mistaken for a live one.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Cancelled,
            _ => Self::Ended,
        }
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Entity Record
// ============================================================================

/// One giveaway or one tournament phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Entity {
    /// Unique id, stable for the entity's lifetime
    pub id: EntityId,

    /// Present only for tournament phases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,

    /// 1-based index of this phase within its chain (1 for giveaways)
    pub phase_index: u32,

    /// Number of phases in the chain (1 for giveaways)
    pub total_phases: u32,

    /// Prize description, opaque to the core
    pub prize: String,

    /// Number of winners (or qualifiers) drawn at finalize
    pub winner_count: u32,

    /// Winner count of phase 1; later phases scale from it.
    /// Rows written without it read as 0 and fall back to `winner_count`.
    #[serde(default)]
    pub base_winner_count: u32,

    /// When the entity opened
    pub start_time: DateTime<Utc>,

    /// Deadline at which the entity is finalized
    pub end_time: DateTime<Utc>,

    /// Role a participant must hold, enforced by the command layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_role_id: Option<String>,

    /// Who created the entity
    pub organizer_id: ActorId,

    /// Free-form organizer comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Image shown by the presentation layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Participants in join order, without duplicates
    #[serde(default)]
    pub participants: IndexSet<ActorId>,

    /// Winners of a finished chain phase, seeded into the next phase
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub qualified_users: IndexSet<ActorId>,

    /// Lifecycle state
    #[serde(default)]
    pub state: EntityState,

    /// Ticket weights snapshotted from the reward system at finalize
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ticket_weights: BTreeMap<ActorId, u32>,
}

impl Entity {
    /// Builds a fresh `Active` entity from validated creation parameters.
    ///
    /// Multi-phase requests get a new chain id and the deterministic id of
    /// their first phase; single-phase requests get a random id.
    #[must_use]
    pub fn from_params(params: CreateParams) -> Self {
        let (id, chain_id) = if params.total_phases > 1 {
            let chain_id = ChainId::generate();
            (EntityId::for_phase(&chain_id, 1), Some(chain_id))
        } else {
            (EntityId::generate(), None)
        };

        Self {
            id,
            chain_id,
            phase_index: 1,
            total_phases: params.total_phases,
            prize: params.prize,
            winner_count: params.winner_count,
            base_winner_count: params.winner_count,
            start_time: params.start_time,
            end_time: params.end_time,
            required_role_id: params.required_role_id,
            organizer_id: params.organizer_id,
            comment: params.comment,
            image_ref: params.image_ref,
            participants: params.participants.into_iter().collect(),
            qualified_users: IndexSet::new(),
            state: EntityState::Active,
            ticket_weights: BTreeMap::new(),
        }
    }

    /// Returns `true` if this entity is a phase of a tournament chain.
    #[must_use]
    pub const fn is_chain_phase(&self) -> bool {
        self.chain_id.is_some()
    }

    /// Returns `true` if no phase follows this one.
    #[must_use]
    pub const fn is_final_phase(&self) -> bool {
        self.phase_index >= self.total_phases
    }

    /// Only the first phase of a chain is open to new participants.
    #[must_use]
    pub const fn accepts_joins(&self) -> bool {
        self.phase_index <= 1
    }

    /// Winner count of the chain's first phase.
    #[must_use]
    pub const fn chain_base_winner_count(&self) -> u32 {
        if self.base_winner_count == 0 {
            self.winner_count
        } else {
            self.base_winner_count
        }
    }

    /// Returns `true` once `now` has reached the deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// Builds the `Active` follow-up phase seeded with `qualifiers`.
    ///
    /// Returns `None` for standalone entities and final phases.
    #[must_use]
    pub fn next_phase(
        &self,
        winner_count: u32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        qualifiers: &IndexSet<ActorId>,
    ) -> Option<Self> {
        let chain_id = self.chain_id.clone()?;
        if self.is_final_phase() {
            return None;
        }
        let phase_index = self.phase_index + 1;

        Some(Self {
            id: EntityId::for_phase(&chain_id, phase_index),
            chain_id: Some(chain_id),
            phase_index,
            total_phases: self.total_phases,
            prize: self.prize.clone(),
            winner_count,
            base_winner_count: self.chain_base_winner_count(),
            start_time,
            end_time,
            required_role_id: self.required_role_id.clone(),
            organizer_id: self.organizer_id.clone(),
            comment: self.comment.clone(),
            image_ref: self.image_ref.clone(),
            participants: qualifiers.clone(),
            qualified_users: IndexSet::new(),
            state: EntityState::Active,
            ticket_weights: BTreeMap::new(),
        })
    }
}

// ============================================================================
// Creation Parameters
// ============================================================================

/// Parameters supplied by the command layer when creating an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParams {
    /// Prize description
    pub prize: String,
    /// Winners to draw (phase 1 qualifiers for tournaments)
    pub winner_count: u32,
    /// Opening time
    pub start_time: DateTime<Utc>,
    /// Deadline; may already be in the past, in which case the entity
    /// finalizes immediately
    pub end_time: DateTime<Utc>,
    /// 1 for a giveaway, >1 for a tournament chain
    pub total_phases: u32,
    /// Creator
    pub organizer_id: ActorId,
    /// Required role, opaque
    pub required_role_id: Option<String>,
    /// Organizer comment
    pub comment: Option<String>,
    /// Image reference
    pub image_ref: Option<String>,
    /// Pre-seeded participants
    pub participants: Vec<ActorId>,
}

impl CreateParams {
    /// Creates parameters for a single-phase giveaway.
    #[must_use]
    pub fn new(
        prize: impl Into<String>,
        organizer_id: ActorId,
        winner_count: u32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            prize: prize.into(),
            winner_count,
            start_time,
            end_time,
            total_phases: 1,
            organizer_id,
            required_role_id: None,
            comment: None,
            image_ref: None,
            participants: Vec::new(),
        }
    }

    /// Turns the request into a tournament of `total_phases` phases.
    #[must_use]
    pub const fn with_phases(mut self, total_phases: u32) -> Self {
        self.total_phases = total_phases;
        self
    }

    /// Seeds the initial participant list.
    #[must_use]
    pub fn with_participants(mut self, participants: impl IntoIterator<Item = ActorId>) -> Self {
        self.participants = participants.into_iter().collect();
        self
    }

    /// Checks the creation invariants.
    ///
    /// `max_phases` is the longest chain the phase table can drive.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self, max_phases: u32) -> Result<(), ValidationError> {
        if self.winner_count == 0 {
            return Err(ValidationError::ZeroWinners);
        }
        if self.end_time <= self.start_time {
            return Err(ValidationError::NonPositiveDuration {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.total_phases == 0 {
            return Err(ValidationError::ZeroPhases);
        }
        if self.total_phases > max_phases {
            return Err(ValidationError::TooManyPhases {
                requested: self.total_phases,
                max: max_phases,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params(winners: u32) -> CreateParams {
        let start = Utc::now();
        CreateParams::new("prize", ActorId::new("org"), winners, start, start + Duration::hours(1))
    }

    #[test]
    fn test_state_encoding_round_trips() {
        for state in [EntityState::Active, EntityState::Cancelled, EntityState::Ended] {
            assert_eq!(EntityState::from_u8(state.as_u8()), state);
        }
        assert_eq!(EntityState::from_u8(200), EntityState::Ended);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EntityState::Active.is_terminal());
        assert!(EntityState::Cancelled.is_terminal());
        assert!(EntityState::Ended.is_terminal());
    }

    #[test]
    fn test_validate_rejects_zero_winners() {
        assert_eq!(params(0).validate(3), Err(ValidationError::ZeroWinners));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut p = params(1);
        p.end_time = p.start_time;
        assert!(matches!(
            p.validate(3),
            Err(ValidationError::NonPositiveDuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_long_chain() {
        let p = params(4).with_phases(4);
        assert_eq!(
            p.validate(3),
            Err(ValidationError::TooManyPhases {
                requested: 4,
                max: 3
            })
        );
        assert_eq!(params(1).with_phases(0).validate(3), Err(ValidationError::ZeroPhases));
    }

    #[test]
    fn test_from_params_standalone() {
        let entity = Entity::from_params(params(2));
        assert!(entity.chain_id.is_none());
        assert_eq!(entity.phase_index, 1);
        assert_eq!(entity.total_phases, 1);
        assert!(entity.is_final_phase());
        assert_eq!(entity.state, EntityState::Active);
    }

    #[test]
    fn test_from_params_chain_uses_phase_id() {
        let entity = Entity::from_params(params(10).with_phases(3));
        let chain_id = entity.chain_id.clone().unwrap();
        assert_eq!(entity.id, EntityId::for_phase(&chain_id, 1));
        assert!(!entity.is_final_phase());
    }

    #[test]
    fn test_participants_deduplicate_and_keep_order() {
        let p = params(1).with_participants(["c", "a", "c", "b"].map(ActorId::from));
        let entity = Entity::from_params(p);
        let order: Vec<&str> = entity.participants.iter().map(ActorId::as_str).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_next_phase_seeds_qualifiers() {
        let first = Entity::from_params(params(10).with_phases(2));
        let qualifiers: IndexSet<ActorId> = ["x", "y"].map(ActorId::from).into_iter().collect();
        let now = Utc::now();
        let next = first
            .next_phase(1, now, now + Duration::minutes(30), &qualifiers)
            .unwrap();
        assert_eq!(next.phase_index, 2);
        assert_eq!(next.chain_id, first.chain_id);
        assert_eq!(next.participants, qualifiers);
        assert!(next.qualified_users.is_empty());
        assert_eq!(next.winner_count, 1);
        assert_eq!(next.chain_base_winner_count(), 10);
        assert!(!next.accepts_joins());
        assert!(next.is_final_phase());

        let now = Utc::now();
        assert!(next.next_phase(1, now, now, &qualifiers).is_none());
    }

    #[test]
    fn test_json_keeps_participant_order() {
        let p = params(1).with_participants(["zed", "amy", "bob"].map(ActorId::from));
        let mut entity = Entity::from_params(p);
        entity.ticket_weights.insert(ActorId::new("amy"), 3);

        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
        let order: Vec<&str> = back.participants.iter().map(ActorId::as_str).collect();
        assert_eq!(order, vec!["zed", "amy", "bob"]);
    }

    #[test]
    fn test_rows_without_base_count_fall_back_to_winner_count() {
        let entity = Entity::from_params(params(4));
        let mut value = serde_json::to_value(&entity).unwrap();
        value.as_object_mut().unwrap().remove("base_winner_count");
        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back.base_winner_count, 0);
        assert_eq!(back.chain_base_winner_count(), 4);
    }

    #[test]
    fn test_json_duplicate_participants_collapse() {
        let entity = Entity::from_params(params(1));
        let mut value = serde_json::to_value(&entity).unwrap();
        value["participants"] = serde_json::json!(["a", "b", "a"]);
        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back.participants.len(), 2);
    }
}
