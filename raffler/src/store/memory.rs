//! In-memory entity store.

use dashmap::DashMap;
use raffler_core::{Entity, EntityId};

use super::{EntityStore, Result, StoredRow};

/// `DashMap`-backed store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: DashMap<EntityId, Entity>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn put(&self, entity: &Entity) -> Result<()> {
        self.rows.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        self.rows.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredRow>> {
        Ok(self
            .rows
            .iter()
            .map(|row| StoredRow::Loaded(row.value().clone()))
            .collect())
    }
}
