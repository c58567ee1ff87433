//! `raffler` Core - shared entity model and validation types
//!
//! This crate provides the entity record, identifier newtypes, and the
//! validation errors shared across `raffler` (scheduler/CLI) and anything
//! else that needs to read or write persisted entity records.

pub mod entity;
pub mod error;

pub use entity::{ActorId, ChainId, CreateParams, Entity, EntityId, EntityState};
pub use error::ValidationError;
