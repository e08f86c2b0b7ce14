//! Collection model

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::{CollectionId, ServiceId};
use crate::error::Error;

/// Domain of the entities held by a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Address book
    Contacts,
    /// Calendar
    Events,
    /// Task list
    Tasks,
}

impl CollectionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Events => "events",
            Self::Tasks => "tasks",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contacts" | "contact" => Ok(Self::Contacts),
            "events" | "event" => Ok(Self::Events),
            "tasks" | "task" => Ok(Self::Tasks),
            other => Err(Error::InvalidInput(format!("unknown collection kind '{other}'"))),
        }
    }
}

impl ToSql for CollectionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CollectionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// One synchronized folder, calendar or address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Local identifier
    pub id: CollectionId,
    /// Owning service account
    pub service_id: ServiceId,
    /// Entity domain
    pub kind: CollectionKind,
    /// Remote collection identifier; empty means orphaned
    pub external_id: Option<String>,
    /// Display label
    pub label: Option<String>,
    /// Last chronicle position pushed to the remote side
    pub local_cursor: Option<String>,
    /// Remote delta state token
    pub remote_cursor: Option<String>,
    /// Baseline for last-modified comparisons in full-list reconciliation (Unix ms)
    pub last_observed_on: Option<i64>,
    /// Whether a worker currently owns harmonization of this collection
    pub lock_held: bool,
    /// Identifier of the owning worker
    pub lock_owner: Option<String>,
    /// Last heartbeat of the owning worker (Unix ms)
    pub lock_heartbeat: Option<i64>,
    /// Completion of the last harmonization attempt (Unix ms)
    pub harmonized_on: Option<i64>,
    /// Error text of the last failed harmonization, cleared on success
    pub last_error: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_on: i64,
}

impl Collection {
    /// Remote collection identifier, if the collection is not orphaned.
    pub fn remote_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Orphaned collections must be deleted, never harmonized.
    pub fn is_orphaned(&self) -> bool {
        self.remote_id().is_none()
    }

    /// Whether the last harmonization attempt failed.
    pub const fn last_harmonization_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(external_id: Option<&str>) -> Collection {
        Collection {
            id: CollectionId(1),
            service_id: ServiceId(1),
            kind: CollectionKind::Contacts,
            external_id: external_id.map(ToString::to_string),
            label: None,
            local_cursor: None,
            remote_cursor: None,
            last_observed_on: None,
            lock_held: false,
            lock_owner: None,
            lock_heartbeat: None,
            harmonized_on: None,
            last_error: None,
            created_on: 0,
        }
    }

    #[test]
    fn blank_external_id_is_orphaned() {
        assert!(collection(None).is_orphaned());
        assert!(collection(Some("  ")).is_orphaned());
        assert!(!collection(Some("addressbook")).is_orphaned());
        assert_eq!(collection(Some(" ab ")).remote_id(), Some("ab"));
    }

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("Events".parse::<CollectionKind>().unwrap(), CollectionKind::Events);
        assert_eq!("task".parse::<CollectionKind>().unwrap(), CollectionKind::Tasks);
        assert!("notes".parse::<CollectionKind>().is_err());
    }
}
