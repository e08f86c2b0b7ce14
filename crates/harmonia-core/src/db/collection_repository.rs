//! Collection repository implementation

use crate::clock::Cursor;
use crate::error::{Error, Result};
use crate::models::{Collection, CollectionId, CollectionKind, EntityId, ServiceId};
use crate::util::{compact_text, normalize_text_option, now_millis};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    ChronicleRepository, CorrelationRepository, SqliteChronicleRepository,
    SqliteCorrelationRepository, write_transaction,
};

const COLLECTION_COLUMNS: &str = "id, service_id, kind, external_id, label, local_cursor, remote_cursor, last_observed_on, lock_held, lock_owner, lock_heartbeat, harmonized_on, last_error, created_on";

/// Trait for collection storage operations
pub trait CollectionRepository {
    /// Insert a collection; `external_id` may be unresolved
    fn create(
        &self,
        service_id: ServiceId,
        kind: CollectionKind,
        external_id: Option<&str>,
        label: Option<&str>,
    ) -> Result<Collection>;

    /// Opt a remote collection in to harmonization, returning the existing
    /// row when it was already confirmed
    fn confirm(
        &self,
        service_id: ServiceId,
        kind: CollectionKind,
        external_id: &str,
        label: Option<&str>,
    ) -> Result<Collection>;

    /// Get a collection by ID
    fn fetch(&self, id: CollectionId) -> Result<Option<Collection>>;

    /// Collection holding a local entity
    fn fetch_by_entity(&self, entity_id: EntityId) -> Result<Option<Collection>>;

    /// List collections of a service account
    fn list_by_service(&self, service_id: ServiceId) -> Result<Vec<Collection>>;

    /// Delete a collection with its entities, correlations and chronicle
    fn delete(&self, id: CollectionId) -> Result<()>;

    /// Persist the chronicle position pushed to the remote side
    fn update_local_cursor(&self, id: CollectionId, cursor: Cursor) -> Result<()>;

    /// Persist the remote delta state
    fn update_remote_cursor(&self, id: CollectionId, state: Option<&str>) -> Result<()>;

    /// Persist the full-list reconciliation baseline
    fn update_observed_on(&self, id: CollectionId, observed_on: i64) -> Result<()>;

    /// Record the result of a harmonization attempt; `None` clears the error
    fn record_outcome(
        &self,
        id: CollectionId,
        harmonized_on: i64,
        last_error: Option<&str>,
    ) -> Result<()>;
}

/// `SQLite` implementation of `CollectionRepository`
pub struct SqliteCollectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCollectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a collection from a database row
    fn parse_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
        Ok(Collection {
            id: row.get(0)?,
            service_id: row.get(1)?,
            kind: row.get(2)?,
            external_id: row.get(3)?,
            label: row.get(4)?,
            local_cursor: row.get(5)?,
            remote_cursor: row.get(6)?,
            last_observed_on: row.get(7)?,
            lock_held: row.get::<_, i32>(8)? != 0,
            lock_owner: row.get(9)?,
            lock_heartbeat: row.get(10)?,
            harmonized_on: row.get(11)?,
            last_error: row.get(12)?,
            created_on: row.get(13)?,
        })
    }

    fn fetch_by_external_id(
        &self,
        service_id: ServiceId,
        external_id: &str,
    ) -> Result<Option<Collection>> {
        let collection = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLLECTION_COLUMNS} FROM collections WHERE service_id = ? AND external_id = ?"
                ),
                params![service_id, external_id],
                Self::parse_collection,
            )
            .optional()?;
        Ok(collection)
    }

    fn require_updated(rows: usize, id: CollectionId) -> Result<()> {
        if rows == 0 {
            return Err(Error::NotFound(format!("collection {id}")));
        }
        Ok(())
    }
}

impl CollectionRepository for SqliteCollectionRepository<'_> {
    fn create(
        &self,
        service_id: ServiceId,
        kind: CollectionKind,
        external_id: Option<&str>,
        label: Option<&str>,
    ) -> Result<Collection> {
        let external_id = normalize_text_option(external_id.map(ToString::to_string));
        let label = normalize_text_option(label.map(ToString::to_string));

        self.conn.execute(
            "INSERT INTO collections (service_id, kind, external_id, label, created_on) VALUES (?, ?, ?, ?, ?)",
            params![service_id, kind, external_id, label, now_millis()],
        )?;

        let id = CollectionId(self.conn.last_insert_rowid());
        self.fetch(id)?
            .ok_or_else(|| Error::NotFound(format!("collection {id}")))
    }

    fn confirm(
        &self,
        service_id: ServiceId,
        kind: CollectionKind,
        external_id: &str,
        label: Option<&str>,
    ) -> Result<Collection> {
        let external_id = normalize_text_option(Some(external_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("external collection id must not be empty".into()))?;

        let Some(existing) = self.fetch_by_external_id(service_id, &external_id)? else {
            return self.create(service_id, kind, Some(&external_id), label);
        };

        if existing.kind != kind {
            return Err(Error::InvalidInput(format!(
                "collection {external_id} is already confirmed as {}",
                existing.kind
            )));
        }

        if let Some(label) = normalize_text_option(label.map(ToString::to_string)) {
            self.conn.execute(
                "UPDATE collections SET label = ? WHERE id = ?",
                params![label, existing.id],
            )?;
            return self
                .fetch(existing.id)?
                .ok_or_else(|| Error::NotFound(format!("collection {}", existing.id)));
        }

        Ok(existing)
    }

    fn fetch(&self, id: CollectionId) -> Result<Option<Collection>> {
        let collection = self
            .conn
            .query_row(
                &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?"),
                params![id],
                Self::parse_collection,
            )
            .optional()?;
        Ok(collection)
    }

    fn fetch_by_entity(&self, entity_id: EntityId) -> Result<Option<Collection>> {
        let collection = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLLECTION_COLUMNS} FROM collections
                     WHERE id = (SELECT collection_id FROM entities WHERE id = ?)"
                ),
                params![entity_id],
                Self::parse_collection,
            )
            .optional()?;
        Ok(collection)
    }

    fn list_by_service(&self, service_id: ServiceId) -> Result<Vec<Collection>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE service_id = ? ORDER BY id ASC"
        ))?;

        let collections = stmt
            .query_map(params![service_id], Self::parse_collection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(collections)
    }

    fn delete(&self, id: CollectionId) -> Result<()> {
        let tx = write_transaction(self.conn)?;
        SqliteChronicleRepository::new(&tx).purge(id)?;
        SqliteCorrelationRepository::new(&tx).purge(id)?;
        tx.execute("DELETE FROM entities WHERE collection_id = ?", params![id])?;
        let rows = tx.execute("DELETE FROM collections WHERE id = ?", params![id])?;
        Self::require_updated(rows, id)?;
        tx.commit()?;
        Ok(())
    }

    fn update_local_cursor(&self, id: CollectionId, cursor: Cursor) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE collections SET local_cursor = ? WHERE id = ?",
            params![cursor.encode(), id],
        )?;
        Self::require_updated(rows, id)
    }

    fn update_remote_cursor(&self, id: CollectionId, state: Option<&str>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE collections SET remote_cursor = ? WHERE id = ?",
            params![state, id],
        )?;
        Self::require_updated(rows, id)
    }

    fn update_observed_on(&self, id: CollectionId, observed_on: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE collections SET last_observed_on = ? WHERE id = ?",
            params![observed_on, id],
        )?;
        Self::require_updated(rows, id)
    }

    fn record_outcome(
        &self,
        id: CollectionId,
        harmonized_on: i64,
        last_error: Option<&str>,
    ) -> Result<()> {
        // A retired collection is already gone; nothing to record
        self.conn.execute(
            "UPDATE collections SET harmonized_on = ?, last_error = ? WHERE id = ?",
            params![harmonized_on, last_error.map(compact_text), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, EntityRepository, SqliteEntityRepository};
    use crate::models::{Contact, CorrelationDraft};

    #[test]
    fn test_confirm_is_idempotent() {
        let db = fixtures::database();
        let service = fixtures::service(&db);
        let repo = SqliteCollectionRepository::new(db.connection());

        let first = repo
            .confirm(service.id, CollectionKind::Contacts, " ab-1 ", Some("People"))
            .unwrap();
        let second = repo
            .confirm(service.id, CollectionKind::Contacts, "ab-1", None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.external_id.as_deref(), Some("ab-1"));
        assert_eq!(second.label.as_deref(), Some("People"));
        assert!(!second.lock_held);
        assert_eq!(repo.list_by_service(service.id).unwrap().len(), 1);
    }

    #[test]
    fn test_confirm_rejects_kind_change() {
        let db = fixtures::database();
        let service = fixtures::service(&db);
        let repo = SqliteCollectionRepository::new(db.connection());

        repo.confirm(service.id, CollectionKind::Events, "cal", None)
            .unwrap();
        let error = repo
            .confirm(service.id, CollectionKind::Tasks, "cal", None)
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[test]
    fn test_create_orphan() {
        let db = fixtures::database();
        let service = fixtures::service(&db);
        let repo = SqliteCollectionRepository::new(db.connection());

        let orphan = repo
            .create(service.id, CollectionKind::Tasks, Some("  "), None)
            .unwrap();
        assert!(orphan.is_orphaned());
    }

    #[test]
    fn test_cursor_and_outcome_updates() {
        let db = fixtures::database();
        let collection = fixtures::collection(&db, CollectionKind::Contacts, "ab");
        let repo = SqliteCollectionRepository::new(db.connection());

        repo.update_local_cursor(collection.id, Cursor::from_clock(55))
            .unwrap();
        repo.update_remote_cursor(collection.id, Some("state-9"))
            .unwrap();
        repo.update_observed_on(collection.id, 1234).unwrap();
        repo.record_outcome(collection.id, 99, Some("remote timed out"))
            .unwrap();

        let fetched = repo.fetch(collection.id).unwrap().unwrap();
        assert_eq!(fetched.local_cursor.as_deref(), Some("55"));
        assert_eq!(fetched.remote_cursor.as_deref(), Some("state-9"));
        assert_eq!(fetched.last_observed_on, Some(1234));
        assert!(fetched.last_harmonization_failed());

        repo.record_outcome(collection.id, 100, None).unwrap();
        let fetched = repo.fetch(collection.id).unwrap().unwrap();
        assert!(!fetched.last_harmonization_failed());
        assert_eq!(fetched.harmonized_on, Some(100));
    }

    #[test]
    fn test_delete_purges_dependents() {
        let db = fixtures::database();
        let collection = fixtures::collection(&db, CollectionKind::Contacts, "ab");
        let entity = SqliteEntityRepository::<Contact>::new(db.connection())
            .create(collection.id, &Contact::named("Ada"))
            .unwrap();
        let correlations = SqliteCorrelationRepository::new(db.connection());
        correlations
            .put(&CorrelationDraft {
                collection_id: collection.id,
                local_entity_id: entity.id,
                local_uuid: entity.uuid,
                local_signature: entity.signature.clone(),
                remote_collection_id: "ab".into(),
                remote_entity_id: "alice".into(),
                remote_signature: entity.signature.clone(),
            })
            .unwrap();
        let repo = SqliteCollectionRepository::new(db.connection());

        assert_eq!(
            repo.fetch_by_entity(entity.id).unwrap().map(|found| found.id),
            Some(collection.id)
        );

        repo.delete(collection.id).unwrap();
        assert!(correlations.list_by_collection(collection.id).unwrap().is_empty());
        assert!(repo.fetch(collection.id).unwrap().is_none());
        assert!(repo.fetch_by_entity(entity.id).unwrap().is_none());
        let chronicle_rows: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM chronicle WHERE collection_id = ?",
                params![collection.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(chronicle_rows, 0);
    }

    #[test]
    fn test_delete_missing_collection() {
        let db = fixtures::database();
        let repo = SqliteCollectionRepository::new(db.connection());
        assert!(matches!(
            repo.delete(CollectionId(404)),
            Err(Error::NotFound(_))
        ));
    }
}
