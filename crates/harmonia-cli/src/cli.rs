use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use harmonia_core::{CollectionId, CollectionKind, EntityId, ServiceId};

#[derive(Parser)]
#[command(name = "harmonia")]
#[command(about = "Two-way harmonization of contacts, events and tasks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to harmonizer config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage remote service accounts
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
    /// Manage harmonized collections
    Collection {
        #[command(subcommand)]
        command: CollectionCommands,
    },
    /// Edit local entities
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },
    /// Show the local changes of a collection since a cursor
    Chronicle {
        /// Collection ID
        #[arg(long)]
        collection: CollectionId,
        /// Cursor returned by a previous call (initial sync when omitted)
        #[arg(long, value_name = "CURSOR")]
        since: Option<String>,
        /// Print raw log entries instead of the net delta
        #[arg(long)]
        entries: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Harmonize collections with their remote services
    Harmonize {
        /// Harmonize every enabled account of this user
        #[arg(long, value_name = "USER", conflicts_with = "service")]
        user: Option<String>,
        /// Harmonize a single service account
        #[arg(long, value_name = "ID")]
        service: Option<ServiceId>,
        /// Keep running on an interval
        #[arg(long)]
        watch: bool,
        /// Seconds between runs in watch mode
        #[arg(long, default_value = "300", value_name = "SECS")]
        interval: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or create the harmonizer config
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Register a remote account
    Add {
        /// Owning user
        #[arg(long)]
        user: String,
        /// Display label
        #[arg(long)]
        label: String,
        /// Remote location (a directory for the bundled connector)
        #[arg(long)]
        location: String,
    },
    /// List accounts of a user
    List {
        #[arg(long)]
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resume harmonization of an account
    Enable { id: ServiceId },
    /// Pause harmonization of an account
    Disable { id: ServiceId },
}

#[derive(Subcommand)]
pub enum CollectionCommands {
    /// Opt a remote collection in to harmonization
    Confirm {
        #[arg(long)]
        service: ServiceId,
        #[arg(long)]
        kind: CollectionKind,
        /// Remote collection identifier
        #[arg(long)]
        external_id: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// List collections of an account
    List {
        #[arg(long)]
        service: ServiceId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stop harmonizing a collection and drop its local data
    Delete { id: CollectionId },
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Create an entity from a JSON payload
    Add {
        #[arg(long)]
        collection: CollectionId,
        /// Payload file, `-` for stdin
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Replace an entity's payload
    Edit {
        id: EntityId,
        /// Payload file, `-` for stdin
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Delete an entity
    Delete { id: EntityId },
    /// List entities of a collection
    List {
        #[arg(long)]
        collection: CollectionId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective config
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
