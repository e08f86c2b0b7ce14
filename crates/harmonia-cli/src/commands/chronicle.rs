use std::path::Path;

use harmonia_core::clock::Cursor;
use harmonia_core::db::{ChronicleRepository, SqliteChronicleRepository};
use harmonia_core::models::{ChronicleDelta, ChronicleEntry, ChronicleOperation, ChronicleReference};
use harmonia_core::CollectionId;

use crate::commands::common::{open_database, require_collection};
use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChronicleView {
    /// Net effect per entity
    Delta,
    /// Every recorded operation, oldest first
    Entries,
}

pub fn run_chronicle(
    collection_id: CollectionId,
    since: Option<&str>,
    view: ChronicleView,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let collection = require_collection(&db, collection_id)?;
    let repo = SqliteChronicleRepository::new(db.connection());

    match view {
        ChronicleView::Delta => {
            let delta = repo.delta(collection.id, since, None, 0)?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&delta)?);
            } else {
                print_lines(format_delta_lines(&delta));
            }
        }
        ChronicleView::Entries => {
            let since = Cursor::decode(since).unwrap_or_default();
            let entries = repo.entries(collection.id, since)?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_lines(format_entry_lines(&entries));
            }
        }
    }
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

pub fn format_delta_lines(delta: &ChronicleDelta) -> Vec<String> {
    let line = |mark: char, reference: &ChronicleReference| {
        format!("{mark} {:<6}  {}", reference.entity_id.to_string(), reference.entity_uuid)
    };

    let mut lines = Vec::with_capacity(delta.len() + 1);
    lines.extend(delta.additions.iter().map(|reference| line('+', reference)));
    lines.extend(delta.modifications.iter().map(|reference| line('~', reference)));
    lines.extend(delta.deletions.iter().map(|reference| line('-', reference)));
    lines.push(format!("cursor {}", delta.cursor));
    lines
}

pub fn format_entry_lines(entries: &[ChronicleEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let operation = match entry.operation {
                ChronicleOperation::Created => "created",
                ChronicleOperation::Modified => "modified",
                ChronicleOperation::Deleted => "deleted",
            };
            format!(
                "{}  {operation:<8}  {:<6}  {}",
                entry.clock,
                entry.entity_id.to_string(),
                entry.entity_uuid
            )
        })
        .collect()
}
