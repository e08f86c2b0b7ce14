use std::path::Path;

use harmonia_core::db::{ServiceRepository, SqliteServiceRepository};
use harmonia_core::ServiceAccount;

use crate::cli::ServiceCommands;
use crate::commands::common::{format_optional_timestamp, open_database};
use crate::error::CliError;

pub fn run_service(command: ServiceCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let repo = SqliteServiceRepository::new(db.connection());

    match command {
        ServiceCommands::Add {
            user,
            label,
            location,
        } => {
            let account = repo.create(&user, &label, &location)?;
            println!("{}", account.id);
        }
        ServiceCommands::List { user, json } => {
            let accounts = repo.list_by_user(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                for line in format_service_lines(&accounts) {
                    println!("{line}");
                }
            }
        }
        ServiceCommands::Enable { id } => {
            repo.set_enabled(id, true)?;
            println!("{id}");
        }
        ServiceCommands::Disable { id } => {
            repo.set_enabled(id, false)?;
            println!("{id}");
        }
    }

    Ok(())
}

pub fn format_service_lines(accounts: &[ServiceAccount]) -> Vec<String> {
    accounts
        .iter()
        .map(|account| {
            let state = if account.enabled { "enabled" } else { "disabled" };
            format!(
                "{:<5}  {:<20}  {:<8}  last run {}  {}",
                account.id.to_string(),
                account.label,
                state,
                format_optional_timestamp(account.harmonization_finished_on),
                account.location
            )
        })
        .collect()
}
