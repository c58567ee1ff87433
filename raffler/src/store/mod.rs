//! Entity store abstraction.
//!
//! Provides the [`EntityStore`] trait for durable, keyed storage of
//! entity records. The store owns the durable truth; it carries no
//! business logic. Every operation is atomic per id and no multi-entity
//! transactions exist.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use raffler_core::{ChainId, Entity, EntityId};

use crate::config::schema::{StoreConfig, StoreKind};
use crate::error::StoreError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One row returned by [`EntityStore::list_all`].
#[derive(Debug)]
pub enum StoredRow {
    /// A readable entity record
    Loaded(Entity),
    /// A row that exists but could not be decoded
    Corrupt {
        /// Storage key of the row (file stem for the file backend)
        key: String,
        /// Why it could not be read
        error: StoreError,
    },
}

/// Async keyed storage for entity records.
///
/// `put` is an idempotent last-write-wins upsert and must only return
/// `Ok` once the row is durable. `delete` of a missing id succeeds.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Upserts one row keyed by `entity.id`.
    async fn put(&self, entity: &Entity) -> Result<()>;

    /// Returns the row for `id`, or `None` if there is none.
    async fn get(&self, id: &EntityId) -> Result<Option<Entity>>;

    /// Removes the row for `id`; deleting twice is not an error.
    async fn delete(&self, id: &EntityId) -> Result<()>;

    /// Returns every persisted row. Used only by startup recovery.
    ///
    /// An `Err` means the row set itself could not be enumerated;
    /// individual unreadable rows come back as [`StoredRow::Corrupt`].
    async fn list_all(&self) -> Result<Vec<StoredRow>>;

    /// Finds phase `phase_index` of a tournament chain.
    async fn find_phase(&self, chain_id: &ChainId, phase_index: u32) -> Result<Option<Entity>> {
        let entity = self.get(&EntityId::for_phase(chain_id, phase_index)).await?;
        Ok(entity.filter(|e| {
            e.chain_id.as_ref() == Some(chain_id) && e.phase_index == phase_index
        }))
    }
}

/// Opens the store selected by configuration.
///
/// # Errors
///
/// Returns an error if the file backend's data directory cannot be created.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn EntityStore>> {
    match config.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::File => Ok(Arc::new(FileStore::open(&config.path).await?)),
    }
}
