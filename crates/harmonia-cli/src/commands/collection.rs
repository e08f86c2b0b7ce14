use std::path::Path;

use harmonia_core::db::{
    CollectionRepository, ServiceRepository, SqliteCollectionRepository, SqliteServiceRepository,
};
use harmonia_core::Collection;

use crate::cli::CollectionCommands;
use crate::commands::common::{format_optional_timestamp, open_database, preview};
use crate::error::CliError;

pub fn run_collection(command: CollectionCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let repo = SqliteCollectionRepository::new(db.connection());

    match command {
        CollectionCommands::Confirm {
            service,
            kind,
            external_id,
            label,
        } => {
            SqliteServiceRepository::new(db.connection())
                .fetch(service)?
                .ok_or(CliError::ServiceNotFound(service))?;
            let collection = repo.confirm(service, kind, &external_id, label.as_deref())?;
            println!("{}", collection.id);
        }
        CollectionCommands::List { service, json } => {
            let collections = repo.list_by_service(service)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&collections)?);
            } else {
                for line in format_collection_lines(&collections) {
                    println!("{line}");
                }
            }
        }
        CollectionCommands::Delete { id } => {
            repo.delete(id)?;
            println!("{id}");
        }
    }

    Ok(())
}

pub fn format_collection_lines(collections: &[Collection]) -> Vec<String> {
    collections
        .iter()
        .map(|collection| {
            let external_id = collection.remote_id().unwrap_or("(orphaned)");
            let status = match &collection.last_error {
                Some(error) => format!("failed: {}", preview(error, 60)),
                None if collection.lock_held => "harmonizing".to_string(),
                None => "ok".to_string(),
            };
            format!(
                "{:<5}  {:<8}  {:<24}  last run {}  {status}",
                collection.id.to_string(),
                collection.kind.as_str(),
                external_id,
                format_optional_timestamp(collection.harmonized_on)
            )
        })
        .collect()
}
