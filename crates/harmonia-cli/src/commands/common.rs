use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use harmonia_core::db::{CollectionRepository, Database, SqliteCollectionRepository};
use harmonia_core::{Collection, CollectionId, HarmonizerConfig};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "harmonia.json";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("HARMONIA_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harmonia")
        .join("harmonia.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("HARMONIA_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harmonia")
        .join(CONFIG_FILE_NAME)
}

/// Config file contents with `HARMONIA_*` environment overrides applied
pub fn load_config(path: &Path) -> Result<HarmonizerConfig, CliError> {
    let config = HarmonizerConfig::load_from_path(path)?.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

pub fn require_collection(db: &Database, id: CollectionId) -> Result<Collection, CliError> {
    SqliteCollectionRepository::new(db.connection())
        .fetch(id)?
        .ok_or(CliError::CollectionNotFound(id))
}

/// Read a payload from `path`, or from piped stdin when `path` is `-`.
pub fn read_payload(path: &Path) -> Result<String, CliError> {
    let raw = if path == Path::new("-") {
        read_piped_stdin()?
    } else {
        Some(fs::read_to_string(path)?)
    };

    raw.and_then(|raw| normalize_content(&raw))
        .ok_or(CliError::EmptyPayload)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_optional_timestamp(timestamp_ms: Option<i64>) -> String {
    timestamp_ms.map_or_else(|| "never".to_string(), format_timestamp)
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
