//! Database layer for Harmonia

mod chronicle_repository;
mod collection_repository;
mod connection;
mod correlation_repository;
mod entity_repository;
mod migrations;
mod service_repository;

pub use chronicle_repository::{ChronicleRepository, SqliteChronicleRepository};
pub use collection_repository::{CollectionRepository, SqliteCollectionRepository};
pub use connection::Database;
pub use correlation_repository::{CorrelationRepository, SqliteCorrelationRepository};
pub use entity_repository::{EntityRepository, SqliteEntityRepository};
pub use service_repository::{ServiceRepository, SqliteServiceRepository};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Begin a transaction that takes the write lock up front so a concurrent
/// writer waits out the busy timeout instead of failing a lock upgrade.
fn write_transaction(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

/// Read a UUID stored as text
fn uuid_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(error))
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::{Collection, CollectionKind, ServiceAccount};

    pub fn database() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn service(db: &Database) -> ServiceAccount {
        SqliteServiceRepository::new(db.connection())
            .create("user-1", "Work server", "memory://work")
            .unwrap()
    }

    pub fn collection(db: &Database, kind: CollectionKind, external_id: &str) -> Collection {
        let service = service(db);
        SqliteCollectionRepository::new(db.connection())
            .confirm(service.id, kind, external_id, None)
            .unwrap()
    }
}
