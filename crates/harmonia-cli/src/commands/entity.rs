use std::path::Path;

use harmonia_core::db::{
    CollectionRepository, Database, EntityRepository, SqliteCollectionRepository,
    SqliteEntityRepository,
};
use harmonia_core::models::TaskStatus;
use harmonia_core::{
    Collection, CollectionId, CollectionKind, Contact, Entity, EntityId, Event, Payload, Task,
};

use crate::cli::EntityCommands;
use crate::commands::common::{
    format_timestamp, open_database, preview, read_payload, require_collection,
};
use crate::error::CliError;

/// One-line human summary of a payload
pub trait Describe {
    fn describe(&self) -> String;
}

impl Describe for Contact {
    fn describe(&self) -> String {
        if let Some(name) = self.display_name.as_deref() {
            return name.to_string();
        }
        let name = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            return name;
        }
        self.emails
            .first()
            .map_or_else(|| "(unnamed)".to_string(), |email| email.address.clone())
    }
}

impl Describe for Event {
    fn describe(&self) -> String {
        let summary = self.summary.as_deref().unwrap_or("(untitled)");
        match self.starts_on {
            Some(starts_on) if self.all_day => {
                format!("{summary} @ {}", starts_on.format("%Y-%m-%d"))
            }
            Some(starts_on) => format!("{summary} @ {}", starts_on.format("%Y-%m-%d %H:%M UTC")),
            None => summary.to_string(),
        }
    }
}

impl Describe for Task {
    fn describe(&self) -> String {
        let mark = match self.status {
            TaskStatus::NeedsAction => "[ ]",
            TaskStatus::InProgress => "[~]",
            TaskStatus::Completed => "[x]",
            TaskStatus::Cancelled => "[-]",
        };
        let summary = self.summary.as_deref().unwrap_or("(untitled)");
        match self.due_on {
            Some(due_on) => format!("{mark} {summary} (due {})", due_on.format("%Y-%m-%d")),
            None => format!("{mark} {summary}"),
        }
    }
}

pub fn run_entity(command: EntityCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;

    match command {
        EntityCommands::Add { collection, file } => {
            let collection = require_collection(&db, collection)?;
            let raw = read_payload(&file)?;
            let id = match collection.kind {
                CollectionKind::Contacts => add_entity::<Contact>(&db, collection.id, &raw)?.id,
                CollectionKind::Events => add_entity::<Event>(&db, collection.id, &raw)?.id,
                CollectionKind::Tasks => add_entity::<Task>(&db, collection.id, &raw)?.id,
            };
            println!("{id}");
        }
        EntityCommands::Edit { id, file } => {
            let collection = collection_of(&db, id)?;
            let raw = read_payload(&file)?;
            match collection.kind {
                CollectionKind::Contacts => edit_entity::<Contact>(&db, id, &raw)?,
                CollectionKind::Events => edit_entity::<Event>(&db, id, &raw)?,
                CollectionKind::Tasks => edit_entity::<Task>(&db, id, &raw)?,
            }
            println!("{id}");
        }
        EntityCommands::Delete { id } => {
            let collection = collection_of(&db, id)?;
            match collection.kind {
                CollectionKind::Contacts => delete_entity::<Contact>(&db, id)?,
                CollectionKind::Events => delete_entity::<Event>(&db, id)?,
                CollectionKind::Tasks => delete_entity::<Task>(&db, id)?,
            }
            println!("{id}");
        }
        EntityCommands::List { collection, json } => {
            let collection = require_collection(&db, collection)?;
            match collection.kind {
                CollectionKind::Contacts => print_entities::<Contact>(&db, collection.id, json)?,
                CollectionKind::Events => print_entities::<Event>(&db, collection.id, json)?,
                CollectionKind::Tasks => print_entities::<Task>(&db, collection.id, json)?,
            }
        }
    }

    Ok(())
}

fn collection_of(db: &Database, id: EntityId) -> Result<Collection, CliError> {
    SqliteCollectionRepository::new(db.connection())
        .fetch_by_entity(id)?
        .ok_or(CliError::EntityNotFound(id))
}

pub fn add_entity<P: Payload>(
    db: &Database,
    collection_id: CollectionId,
    raw: &str,
) -> Result<Entity<P>, CliError> {
    let payload: P = serde_json::from_str(raw)?;
    Ok(SqliteEntityRepository::new(db.connection()).create(collection_id, &payload)?)
}

/// Replace an entity's payload, keeping the server id it already carries.
pub fn edit_entity<P: Payload>(db: &Database, id: EntityId, raw: &str) -> Result<(), CliError> {
    let repo = SqliteEntityRepository::<P>::new(db.connection());
    let mut entity = repo.fetch(id)?.ok_or(CliError::EntityNotFound(id))?;

    let mut payload: P = serde_json::from_str(raw)?;
    if payload.remote_id().is_none() {
        payload.set_remote_id(entity.payload.remote_id().map(ToString::to_string));
    }
    if payload == entity.payload {
        return Ok(());
    }

    entity.payload = payload;
    repo.modify(&entity)?;
    Ok(())
}

pub fn delete_entity<P: Payload>(db: &Database, id: EntityId) -> Result<(), CliError> {
    let repo = SqliteEntityRepository::<P>::new(db.connection());
    let entity = repo.fetch(id)?.ok_or(CliError::EntityNotFound(id))?;
    repo.delete(&entity)?;
    Ok(())
}

fn print_entities<P: Payload + Describe>(
    db: &Database,
    collection_id: CollectionId,
    as_json: bool,
) -> Result<(), CliError> {
    let entities =
        SqliteEntityRepository::<P>::new(db.connection()).list_by_collection(collection_id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        for line in format_entity_lines(&entities) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_entity_lines<P: Describe>(entities: &[Entity<P>]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let uuid = entity.uuid.to_string();
            let short_uuid = uuid.chars().take(13).collect::<String>();
            format!(
                "{:<6}  {short_uuid:<13}  {:<50}  {}",
                entity.id.to_string(),
                preview(&entity.payload.describe(), 50),
                format_timestamp(entity.modified_on)
            )
        })
        .collect()
}
