//! `raffler list`
//!
//! Read-only view of a file store. Safe to run next to a live scheduler.

use std::path::Path;

use raffler_core::Entity;

use crate::cli::args::{ListArgs, OutputFormat};
use crate::error::{RafflerError, StoreError};
use crate::store::{EntityStore, FileStore, StoredRow};

/// List persisted entities.
///
/// # Errors
///
/// Returns a store error if the data directory does not exist or cannot
/// be read.
pub async fn run(args: &ListArgs) -> Result<(), RafflerError> {
    let (mut entities, corrupt) = load(&args.data_dir).await?;
    entities.sort_by(|a, b| a.end_time.cmp(&b.end_time).then_with(|| a.id.cmp(&b.id)));

    match args.format {
        OutputFormat::Human => {
            if entities.is_empty() {
                println!("no entities in {}", args.data_dir.display());
            }
            for e in &entities {
                println!("{}", summary_line(e));
            }
            for key in &corrupt {
                println!("{key}  <unreadable>");
            }
        }
        OutputFormat::Json => {
            let out = serde_json::json!({ "entities": entities, "corrupt": corrupt });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

async fn load(dir: &Path) -> Result<(Vec<Entity>, Vec<String>), StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such data directory"),
        });
    }
    let store = FileStore::open(dir).await?;

    let mut entities = Vec::new();
    let mut corrupt = Vec::new();
    for row in store.list_all().await? {
        match row {
            StoredRow::Loaded(entity) => entities.push(entity),
            StoredRow::Corrupt { key, .. } => corrupt.push(key),
        }
    }
    Ok((entities, corrupt))
}

fn summary_line(e: &Entity) -> String {
    format!(
        "{}  {}  phase {}/{}  {} joined  {} winner(s)  ends {}  {}",
        e.id,
        e.state,
        e.phase_index,
        e.total_phases,
        e.participants.len(),
        e.winner_count,
        e.end_time.to_rfc3339(),
        e.prize
    )
}
