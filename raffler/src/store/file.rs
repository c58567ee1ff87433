//! JSON-file entity store.
//!
//! One pretty-printed JSON document per entity, named `<id>.json`, inside
//! a data directory. Writes go to a temporary sibling first, are synced,
//! and then renamed over the target so a crash never leaves a half-written
//! row behind. The directory is synced after each rename or removal so the
//! new directory entry survives power loss.

use std::path::{Path, PathBuf};

use raffler_core::{Entity, EntityId};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;

use super::{EntityStore, Result, StoredRow};

const ROW_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the data directory at `dir`.
    ///
    /// Temporary files left behind by an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created or read.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await.map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let store = Self {
            dir: dir.to_path_buf(),
        };
        store.remove_stale_temp_files().await?;
        debug!(dir = %dir.display(), "file store opened");
        Ok(store)
    }

    /// Returns the data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps an id to its row path, refusing ids that could escape the
    /// data directory.
    fn row_path(&self, id: &EntityId) -> Option<PathBuf> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{id}.{ROW_EXTENSION}")))
    }

    async fn remove_stale_temp_files(&self) -> Result<()> {
        let mut entries = self.read_dir().await?;
        while let Some(entry) = next_entry(&mut entries, &self.dir).await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                warn!(path = %path.display(), "removing interrupted write");
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(())
    }

    async fn read_dir(&self) -> Result<tokio::fs::ReadDir> {
        tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })
    }
}

async fn next_entry(
    entries: &mut tokio::fs::ReadDir,
    dir: &Path,
) -> Result<Option<tokio::fs::DirEntry>> {
    entries.next_entry().await.map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

async fn read_row(path: &Path, key: &str) -> Result<Entity> {
    let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
        id: key.to_string(),
        source,
    })
}

#[async_trait::async_trait]
impl EntityStore for FileStore {
    async fn put(&self, entity: &Entity) -> Result<()> {
        let Some(path) = self.row_path(&entity.id) else {
            return Err(StoreError::Io {
                path: self.dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("entity id '{}' is not a valid file name", entity.id),
                ),
            });
        };

        let bytes =
            serde_json::to_vec_pretty(entity).map_err(|source| StoreError::Serialization {
                id: entity.id.to_string(),
                source,
            })?;

        let suffix: u32 = rand::random();
        let temp_path = path.with_extension(format!("{suffix:08x}.{TEMP_EXTENSION}"));
        let io_err = |source| StoreError::Io {
            path: temp_path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        if let Err(source) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::Io { path, source });
        }
        sync_dir(&self.dir).await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        let Some(path) = self.row_path(id) else {
            return Ok(None);
        };
        match tokio::fs::try_exists(&path).await {
            Ok(true) => read_row(&path, id.as_str()).await.map(Some),
            Ok(false) => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        let Some(path) = self.row_path(id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => sync_dir(&self.dir).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn list_all(&self) -> Result<Vec<StoredRow>> {
        let mut rows = Vec::new();
        let mut entries = self.read_dir().await?;

        while let Some(entry) = next_entry(&mut entries, &self.dir).await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != ROW_EXTENSION) {
                continue;
            }
            let key = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            match read_row(&path, &key).await {
                Ok(entity) => rows.push(StoredRow::Loaded(entity)),
                Err(error) => {
                    warn!(key, %error, "unreadable entity row");
                    rows.push(StoredRow::Corrupt { key, error });
                }
            }
        }

        Ok(rows)
    }
}

/// Flushes directory metadata so a completed rename or removal is durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    tokio::fs::File::open(dir)
        .await
        .map_err(io_err)?
        .sync_all()
        .await
        .map_err(io_err)
}

/// Directory handles cannot be synced here; renames are durable once the
/// file itself is.
#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
