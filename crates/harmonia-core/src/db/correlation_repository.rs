//! Correlation repository implementation

use crate::error::{Error, Result};
use crate::models::{CollectionId, Correlation, CorrelationDraft, EntityId};
use crate::util::now_millis;
use rusqlite::{params, Connection, OptionalExtension};

use super::{uuid_column, write_transaction};

const CORRELATION_COLUMNS: &str = "id, collection_id, local_entity_id, local_uuid, local_signature, remote_collection_id, remote_entity_id, remote_signature, correlated_on";

/// Trait for correlation index operations
pub trait CorrelationRepository {
    /// Correlation of a local entity within a remote collection
    fn find_by_local(
        &self,
        collection_id: CollectionId,
        local_entity_id: EntityId,
        remote_collection_id: &str,
    ) -> Result<Option<Correlation>>;

    /// Correlation of a remote entity within a local collection
    fn find_by_remote(
        &self,
        collection_id: CollectionId,
        remote_collection_id: &str,
        remote_entity_id: &str,
    ) -> Result<Option<Correlation>>;

    /// Every correlation of a local collection
    fn list_by_collection(&self, collection_id: CollectionId) -> Result<Vec<Correlation>>;

    /// Create or refresh the correlation of a local entity, displacing any
    /// other entity of the same collection linked to the same remote entity
    fn put(&self, draft: &CorrelationDraft) -> Result<Correlation>;

    /// Drop a correlation
    fn delete(&self, id: i64) -> Result<()>;

    /// Drop every correlation of a local collection
    fn purge(&self, collection_id: CollectionId) -> Result<usize>;
}

/// `SQLite` implementation of `CorrelationRepository`
pub struct SqliteCorrelationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCorrelationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a correlation from a database row
    fn parse_correlation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Correlation> {
        Ok(Correlation {
            id: row.get(0)?,
            collection_id: row.get(1)?,
            local_entity_id: row.get(2)?,
            local_uuid: uuid_column(row, 3)?,
            local_signature: row.get(4)?,
            remote_collection_id: row.get(5)?,
            remote_entity_id: row.get(6)?,
            remote_signature: row.get(7)?,
            correlated_on: row.get(8)?,
        })
    }
}

impl CorrelationRepository for SqliteCorrelationRepository<'_> {
    fn find_by_local(
        &self,
        collection_id: CollectionId,
        local_entity_id: EntityId,
        remote_collection_id: &str,
    ) -> Result<Option<Correlation>> {
        let correlation = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CORRELATION_COLUMNS} FROM correlations
                     WHERE collection_id = ? AND local_entity_id = ? AND remote_collection_id = ?"
                ),
                params![collection_id, local_entity_id, remote_collection_id],
                Self::parse_correlation,
            )
            .optional()?;
        Ok(correlation)
    }

    fn find_by_remote(
        &self,
        collection_id: CollectionId,
        remote_collection_id: &str,
        remote_entity_id: &str,
    ) -> Result<Option<Correlation>> {
        let correlation = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CORRELATION_COLUMNS} FROM correlations
                     WHERE collection_id = ? AND remote_collection_id = ? AND remote_entity_id = ?"
                ),
                params![collection_id, remote_collection_id, remote_entity_id],
                Self::parse_correlation,
            )
            .optional()?;
        Ok(correlation)
    }

    fn list_by_collection(&self, collection_id: CollectionId) -> Result<Vec<Correlation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CORRELATION_COLUMNS} FROM correlations WHERE collection_id = ? ORDER BY id ASC"
        ))?;

        let correlations = stmt
            .query_map(params![collection_id], Self::parse_correlation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(correlations)
    }

    fn put(&self, draft: &CorrelationDraft) -> Result<Correlation> {
        let tx = write_transaction(self.conn)?;
        tx.execute(
            "DELETE FROM correlations
             WHERE collection_id = ? AND remote_collection_id = ? AND remote_entity_id = ?
               AND local_entity_id <> ?",
            params![
                draft.collection_id,
                draft.remote_collection_id,
                draft.remote_entity_id,
                draft.local_entity_id
            ],
        )?;
        tx.execute(
            "INSERT INTO correlations (collection_id, local_entity_id, local_uuid, local_signature,
                 remote_collection_id, remote_entity_id, remote_signature, correlated_on)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (collection_id, local_entity_id, remote_collection_id) DO UPDATE SET
                 local_uuid = excluded.local_uuid,
                 local_signature = excluded.local_signature,
                 remote_entity_id = excluded.remote_entity_id,
                 remote_signature = excluded.remote_signature,
                 correlated_on = excluded.correlated_on",
            params![
                draft.collection_id,
                draft.local_entity_id,
                draft.local_uuid.to_string(),
                draft.local_signature,
                draft.remote_collection_id,
                draft.remote_entity_id,
                draft.remote_signature,
                now_millis()
            ],
        )?;
        tx.commit()?;

        self.find_by_local(
            draft.collection_id,
            draft.local_entity_id,
            &draft.remote_collection_id,
        )?
            .ok_or_else(|| {
                Error::NotFound(format!("correlation of entity {}", draft.local_entity_id))
            })
    }

    fn delete(&self, id: i64) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM correlations WHERE id = ?", params![id])?;
        if rows == 0 {
            return Err(Error::NotFound(format!("correlation {id}")));
        }
        Ok(())
    }

    fn purge(&self, collection_id: CollectionId) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM correlations WHERE collection_id = ?",
            params![collection_id],
        )?;
        Ok(rows)
    }
}
