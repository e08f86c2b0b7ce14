//! Entity repository implementation
//!
//! The local store. Every create, modify and delete appends exactly one
//! chronicle entry inside the same transaction as the row change.

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::models::{
    ChronicleOperation, CollectionId, CollectionKind, Entity, EntityId, Payload,
};
use crate::util::now_millis;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::chronicle_repository::append_entry;
use super::{uuid_column, write_transaction};

const ENTITY_COLUMNS: &str =
    "e.id, e.collection_id, e.uuid, e.signature, e.payload, e.created_on, e.modified_on";

/// Trait for local entity storage operations
pub trait EntityRepository<P: Payload> {
    /// Get an entity by ID
    fn fetch(&self, id: EntityId) -> Result<Option<Entity<P>>>;

    /// Store a new entity with a fresh UUID
    fn create(&self, collection_id: CollectionId, payload: &P) -> Result<Entity<P>>;

    /// Replace an entity's payload, keeping its UUID
    fn modify(&self, entity: &Entity<P>) -> Result<Entity<P>>;

    /// Delete an entity
    fn delete(&self, entity: &Entity<P>) -> Result<()>;

    /// Find the local entity correlated with a remote entity
    fn fetch_by_correlation(
        &self,
        collection_id: CollectionId,
        remote_collection_id: &str,
        remote_entity_id: &str,
    ) -> Result<Option<Entity<P>>>;

    /// List entities of a collection
    fn list_by_collection(&self, collection_id: CollectionId) -> Result<Vec<Entity<P>>>;
}

/// `SQLite` implementation of `EntityRepository`
pub struct SqliteEntityRepository<'a, P> {
    conn: &'a Connection,
    payload: PhantomData<fn() -> P>,
}

impl<'a, P: Payload> SqliteEntityRepository<'a, P> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            payload: PhantomData,
        }
    }

    /// Parse an entity from a database row
    fn parse_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity<P>> {
        let payload: String = row.get(4)?;
        let payload = serde_json::from_str(&payload).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(error))
        })?;

        Ok(Entity {
            id: row.get(0)?,
            collection_id: row.get(1)?,
            uuid: uuid_column(row, 2)?,
            signature: row.get(3)?,
            payload,
            created_on: row.get(5)?,
            modified_on: row.get(6)?,
        })
    }

    fn collection_kind(&self, collection_id: CollectionId) -> Result<CollectionKind> {
        self.conn
            .query_row(
                "SELECT kind FROM collections WHERE id = ?",
                params![collection_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("collection {collection_id}")))
    }

    /// Collection and UUID of a stored entity of this kind
    fn identity(conn: &Connection, id: EntityId) -> Result<(CollectionId, Uuid)> {
        conn.query_row(
            "SELECT collection_id, uuid FROM entities WHERE id = ? AND kind = ?",
            params![id, P::KIND],
            |row| Ok((row.get(0)?, uuid_column(row, 1)?)),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("{} entity {id}", P::KIND)))
    }

    fn require(&self, id: EntityId) -> Result<Entity<P>> {
        self.fetch(id)?
            .ok_or_else(|| Error::NotFound(format!("{} entity {id}", P::KIND)))
    }
}

impl<P: Payload> EntityRepository<P> for SqliteEntityRepository<'_, P> {
    fn fetch(&self, id: EntityId) -> Result<Option<Entity<P>>> {
        let entity = self
            .conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ? AND e.kind = ?"),
                params![id, P::KIND],
                Self::parse_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn create(&self, collection_id: CollectionId, payload: &P) -> Result<Entity<P>> {
        let kind = self.collection_kind(collection_id)?;
        if kind != P::KIND {
            return Err(Error::InvalidInput(format!(
                "collection {collection_id} holds {kind}, not {}",
                P::KIND
            )));
        }

        let uuid = Uuid::now_v7();
        let signature = payload.signature()?;
        let json = serde_json::to_string(payload)?;
        let now = now_millis();

        let tx = write_transaction(self.conn)?;
        tx.execute(
            "INSERT INTO entities (collection_id, kind, uuid, signature, payload, created_on, modified_on)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![collection_id, P::KIND, uuid.to_string(), signature, json, now, now],
        )?;
        let id = EntityId(tx.last_insert_rowid());
        append_entry(&tx, collection_id, id, uuid, ChronicleOperation::Created)?;
        tx.commit()?;

        self.require(id)
    }

    fn modify(&self, entity: &Entity<P>) -> Result<Entity<P>> {
        let signature = entity.payload.signature()?;
        let json = serde_json::to_string(&entity.payload)?;

        let tx = write_transaction(self.conn)?;
        let (collection_id, uuid) = Self::identity(&tx, entity.id)?;
        tx.execute(
            "UPDATE entities SET signature = ?, payload = ?, modified_on = ? WHERE id = ?",
            params![signature, json, now_millis(), entity.id],
        )?;
        append_entry(&tx, collection_id, entity.id, uuid, ChronicleOperation::Modified)?;
        tx.commit()?;

        self.require(entity.id)
    }

    fn delete(&self, entity: &Entity<P>) -> Result<()> {
        let tx = write_transaction(self.conn)?;
        let (collection_id, uuid) = Self::identity(&tx, entity.id)?;
        tx.execute("DELETE FROM entities WHERE id = ?", params![entity.id])?;
        append_entry(&tx, collection_id, entity.id, uuid, ChronicleOperation::Deleted)?;
        tx.commit()?;
        Ok(())
    }

    fn fetch_by_correlation(
        &self,
        collection_id: CollectionId,
        remote_collection_id: &str,
        remote_entity_id: &str,
    ) -> Result<Option<Entity<P>>> {
        let entity = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities e
                     JOIN correlations c
                       ON c.local_entity_id = e.id AND c.collection_id = e.collection_id
                     WHERE e.collection_id = ? AND e.kind = ?
                       AND c.remote_collection_id = ? AND c.remote_entity_id = ?"
                ),
                params![collection_id, P::KIND, remote_collection_id, remote_entity_id],
                Self::parse_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn list_by_collection(&self, collection_id: CollectionId) -> Result<Vec<Entity<P>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e
             WHERE e.collection_id = ? AND e.kind = ? ORDER BY e.id ASC"
        ))?;

        let entities = stmt
            .query_map(params![collection_id, P::KIND], Self::parse_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entities)
    }
}
