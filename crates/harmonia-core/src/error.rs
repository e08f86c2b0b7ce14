//! Error types for harmonia-core

use thiserror::Error;

/// Result type alias using harmonia-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in harmonia-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A collection or entity vanished on either side
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote side lacks a capability (e.g. native delta queries)
    #[error("Capability unsupported: {0}")]
    CapabilityUnsupported(String),

    /// Network or storage failure; the pass is abandoned and retried next cycle
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Another worker took over a collection lock this worker held
    #[error("Lock lost: {0}")]
    LockLost(String),

    /// Stored state could not be decoded (e.g. a rejected cursor)
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error reports a vanished collection or entity.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error means "use the fallback path" rather than a failure.
    pub const fn is_capability_unsupported(&self) -> bool {
        matches!(self, Self::CapabilityUnsupported(_))
    }

    /// Whether a later retry of the same pass may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Io(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_taxonomy() {
        assert!(Error::NotFound("c1".into()).is_not_found());
        assert!(Error::CapabilityUnsupported("delta".into()).is_capability_unsupported());
        assert!(Error::Transient("timeout".into()).is_transient());
        assert!(!Error::DataIntegrity("cursor".into()).is_transient());
        assert!(!Error::InvalidInput("payload".into()).is_not_found());
        assert!(!Error::LockLost("collection 3".into()).is_transient());
    }

    #[test]
    fn display_includes_detail() {
        let error = Error::NotFound("collection 7".into());
        assert_eq!(error.to_string(), "Not found: collection 7");
    }
}
