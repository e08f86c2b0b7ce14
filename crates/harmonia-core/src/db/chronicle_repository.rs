//! Chronicle repository implementation

use crate::clock::{tick_after, Cursor};
use crate::error::{Error, Result};
use crate::models::{
    ChronicleDelta, ChronicleEntry, ChronicleOperation, ChronicleReference, CollectionId, EntityId,
};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::uuid_column;

/// Trait for chronicle operations
pub trait ChronicleRepository {
    /// Record one entity-level operation and return the cursor just past it
    fn append(
        &self,
        collection_id: CollectionId,
        entity_id: EntityId,
        entity_uuid: Uuid,
        operation: ChronicleOperation,
    ) -> Result<Cursor>;

    /// Latest clock recorded for a collection, or the origin when empty
    fn apex(&self, collection_id: CollectionId) -> Result<Cursor>;

    /// Net changes since `since`; an absent or undecodable cursor yields
    /// every live entity as an addition
    fn delta(
        &self,
        collection_id: CollectionId,
        since: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<ChronicleDelta>;

    /// Raw entries after `since`, oldest first
    fn entries(&self, collection_id: CollectionId, since: Cursor) -> Result<Vec<ChronicleEntry>>;

    /// Drop every entry of a collection
    fn purge(&self, collection_id: CollectionId) -> Result<usize>;
}

/// `SQLite` implementation of `ChronicleRepository`
pub struct SqliteChronicleRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteChronicleRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn ensure_collection(&self, collection_id: CollectionId) -> Result<()> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM collections WHERE id = ?",
                params![collection_id],
                |_| Ok(()),
            )
            .optional()?;
        exists.ok_or_else(|| Error::NotFound(format!("collection {collection_id}")))
    }

    /// Parse an entry from a database row
    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ChronicleEntry, i64)> {
        let rank: i64 = row.get(4)?;
        Ok((
            ChronicleEntry {
                id: row.get(0)?,
                collection_id: row.get(1)?,
                entity_id: row.get(2)?,
                entity_uuid: uuid_column(row, 3)?,
                operation: ChronicleOperation::Created,
                clock: row.get(5)?,
            },
            rank,
        ))
    }
}

fn max_clock(conn: &Connection, collection_id: CollectionId) -> Result<i64> {
    let clock = conn.query_row(
        "SELECT COALESCE(MAX(clock), 0) FROM chronicle WHERE collection_id = ?",
        params![collection_id],
        |row| row.get(0),
    )?;
    Ok(clock)
}

/// Append an entry on `conn`, which may be inside the caller's transaction.
pub(crate) fn append_entry(
    conn: &Connection,
    collection_id: CollectionId,
    entity_id: EntityId,
    entity_uuid: Uuid,
    operation: ChronicleOperation,
) -> Result<Cursor> {
    let clock = tick_after(max_clock(conn, collection_id)?);
    conn.execute(
        "INSERT INTO chronicle (collection_id, entity_id, entity_uuid, operation, clock) VALUES (?, ?, ?, ?, ?)",
        params![
            collection_id,
            entity_id,
            entity_uuid.to_string(),
            operation.rank(),
            clock
        ],
    )?;
    Ok(Cursor::from_clock(clock))
}

impl ChronicleRepository for SqliteChronicleRepository<'_> {
    fn append(
        &self,
        collection_id: CollectionId,
        entity_id: EntityId,
        entity_uuid: Uuid,
        operation: ChronicleOperation,
    ) -> Result<Cursor> {
        self.ensure_collection(collection_id)?;
        append_entry(self.conn, collection_id, entity_id, entity_uuid, operation)
    }

    fn apex(&self, collection_id: CollectionId) -> Result<Cursor> {
        self.ensure_collection(collection_id)?;
        Ok(Cursor::from_clock(max_clock(self.conn, collection_id)?))
    }

    fn delta(
        &self,
        collection_id: CollectionId,
        since: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<ChronicleDelta> {
        let apex = self.apex(collection_id)?;
        let limit = limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let mut delta = ChronicleDelta {
            cursor: apex,
            ..ChronicleDelta::default()
        };

        // Initial sync lists live entities only; a window keeps the highest
        // ranked operation per entity
        let (since, initial) = match Cursor::decode(since) {
            Some(cursor) => (cursor.clock(), false),
            None => (0, true),
        };
        let having = if initial { "HAVING MAX(operation) < 3" } else { "" };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT entity_id, MAX(entity_uuid), MAX(operation) FROM chronicle
             WHERE collection_id = ? AND clock > ? AND clock <= ?
             GROUP BY entity_id {having}
             ORDER BY MIN(clock) ASC, entity_id ASC
             LIMIT ? OFFSET ?"
        ))?;

        let rows = stmt
            .query_map(
                params![collection_id, since, apex.clock(), limit, offset],
                |row| {
                    Ok((
                        ChronicleReference {
                            entity_id: row.get(0)?,
                            entity_uuid: uuid_column(row, 1)?,
                        },
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (reference, rank) in rows {
            let operation = if initial {
                ChronicleOperation::Created
            } else {
                ChronicleOperation::from_rank(rank)?
            };
            delta.push(reference, operation);
        }

        Ok(delta)
    }

    fn entries(&self, collection_id: CollectionId, since: Cursor) -> Result<Vec<ChronicleEntry>> {
        self.ensure_collection(collection_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, collection_id, entity_id, entity_uuid, operation, clock FROM chronicle
             WHERE collection_id = ? AND clock > ? ORDER BY clock ASC",
        )?;

        let rows = stmt
            .query_map(params![collection_id, since.clock()], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut entry, rank)| {
                entry.operation = ChronicleOperation::from_rank(rank)?;
                Ok(entry)
            })
            .collect()
    }

    fn purge(&self, collection_id: CollectionId) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM chronicle WHERE collection_id = ?",
            params![collection_id],
        )?;
        Ok(rows)
    }
}
