use std::path::Path;

use harmonia_core::HarmonizerConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::load_config;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = load_config(config_path)?;
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Init { force } => {
            run_config_init(config_path, force)?;
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

pub fn run_config_init(config_path: &Path, force: bool) -> Result<(), CliError> {
    if config_path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        )));
    }
    HarmonizerConfig::default().save_to_path(config_path)?;
    Ok(())
}
