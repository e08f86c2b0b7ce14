use std::io;

use harmonia_core::{CollectionId, EntityId, ServiceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] harmonia_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No payload provided")]
    EmptyPayload,
    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),
    #[error("Collection not found: {0}")]
    CollectionNotFound(CollectionId),
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),
    #[error("Pass --user or --service (or set HARMONIA_USER) to choose what to harmonize")]
    MissingTarget,
    #[error("Background task failed: {0}")]
    Task(String),
}
