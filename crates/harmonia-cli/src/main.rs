//! Harmonia CLI - Command-line interface for two-way harmonization
//!
//! Registers service accounts, confirms collections, edits the local cache and
//! runs the harmonization scheduler once or on an interval.

mod cli;
mod commands;
mod error;

use std::time::Duration;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::chronicle::{run_chronicle, ChronicleView};
use crate::commands::collection::run_collection;
use crate::commands::common::{load_config, resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::entity::run_entity;
use crate::commands::harmonize::{run_harmonize, HarmonizeOptions, HarmonizeTarget};
use crate::commands::service::run_service;
use crate::error::CliError;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "harmonia=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Service { command } => run_service(command, &db_path)?,
        Commands::Collection { command } => run_collection(command, &db_path)?,
        Commands::Entity { command } => run_entity(command, &db_path)?,
        Commands::Chronicle {
            collection,
            since,
            entries,
            json,
        } => {
            let view = if entries {
                ChronicleView::Entries
            } else {
                ChronicleView::Delta
            };
            run_chronicle(collection, since.as_deref(), view, json, &db_path)?;
        }
        Commands::Harmonize {
            user,
            service,
            watch,
            interval,
            json,
        } => {
            let target =
                HarmonizeTarget::resolve(user, service, std::env::var("HARMONIA_USER").ok())?;
            let config = load_config(&config_path)?;
            let options = HarmonizeOptions {
                target,
                watch,
                interval: Duration::from_secs(interval),
                as_json: json,
            };
            run_harmonize(options, config, &db_path).await?;
        }
        Commands::Config { command } => run_config(command, &config_path)?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
