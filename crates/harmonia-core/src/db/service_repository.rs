//! Service account repository implementation

use crate::error::{Error, Result};
use crate::models::{ServiceAccount, ServiceId};
use crate::util::{normalize_text_option, now_millis};
use rusqlite::{params, Connection, OptionalExtension};

const SERVICE_COLUMNS: &str = "id, user_id, label, location, enabled, created_on, harmonization_started_on, harmonization_finished_on";

/// Trait for service account storage operations
pub trait ServiceRepository {
    /// Register a remote account for a user
    fn create(&self, user_id: &str, label: &str, location: &str) -> Result<ServiceAccount>;

    /// Get an account by ID
    fn fetch(&self, id: ServiceId) -> Result<Option<ServiceAccount>>;

    /// List every account of a user, oldest first
    fn list_by_user(&self, user_id: &str) -> Result<Vec<ServiceAccount>>;

    /// Enable or disable harmonization for an account
    fn set_enabled(&self, id: ServiceId, enabled: bool) -> Result<()>;

    /// Record the boundaries of a harmonization run
    fn record_harmonization(&self, id: ServiceId, started_on: i64, finished_on: i64)
        -> Result<()>;
}

/// `SQLite` implementation of `ServiceRepository`
pub struct SqliteServiceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteServiceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an account from a database row
    fn parse_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceAccount> {
        Ok(ServiceAccount {
            id: row.get(0)?,
            user_id: row.get(1)?,
            label: row.get(2)?,
            location: row.get(3)?,
            enabled: row.get::<_, i32>(4)? != 0,
            created_on: row.get(5)?,
            harmonization_started_on: row.get(6)?,
            harmonization_finished_on: row.get(7)?,
        })
    }
}

impl ServiceRepository for SqliteServiceRepository<'_> {
    fn create(&self, user_id: &str, label: &str, location: &str) -> Result<ServiceAccount> {
        let user_id = normalize_text_option(Some(user_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("user id must not be empty".into()))?;
        let location = normalize_text_option(Some(location.to_string()))
            .ok_or_else(|| Error::InvalidInput("service location must not be empty".into()))?;

        self.conn.execute(
            "INSERT INTO services (user_id, label, location, enabled, created_on) VALUES (?, ?, ?, 1, ?)",
            params![user_id, label.trim(), location, now_millis()],
        )?;

        let id = ServiceId(self.conn.last_insert_rowid());
        self.fetch(id)?
            .ok_or_else(|| Error::NotFound(format!("service {id}")))
    }

    fn fetch(&self, id: ServiceId) -> Result<Option<ServiceAccount>> {
        let service = self
            .conn
            .query_row(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"),
                params![id],
                Self::parse_service,
            )
            .optional()?;
        Ok(service)
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<ServiceAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE user_id = ? ORDER BY id ASC"
        ))?;

        let services = stmt
            .query_map(params![user_id.trim()], Self::parse_service)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(services)
    }

    fn set_enabled(&self, id: ServiceId, enabled: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE services SET enabled = ? WHERE id = ?",
            params![i32::from(enabled), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("service {id}")));
        }
        Ok(())
    }

    fn record_harmonization(
        &self,
        id: ServiceId,
        started_on: i64,
        finished_on: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE services SET harmonization_started_on = ?, harmonization_finished_on = ? WHERE id = ?",
            params![started_on, finished_on, id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_fetch() {
        let db = setup();
        let repo = SqliteServiceRepository::new(db.connection());

        let service = repo.create(" alice ", "Work", "/srv/dav/alice").unwrap();
        assert_eq!(service.user_id, "alice");
        assert!(service.enabled);
        assert!(service.harmonization_started_on.is_none());

        let fetched = repo.fetch(service.id).unwrap().unwrap();
        assert_eq!(fetched, service);
    }

    #[test]
    fn test_create_rejects_blank_location() {
        let db = setup();
        let repo = SqliteServiceRepository::new(db.connection());
        assert!(matches!(
            repo.create("alice", "Work", "  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_list_by_user() {
        let db = setup();
        let repo = SqliteServiceRepository::new(db.connection());

        repo.create("alice", "Work", "/srv/a").unwrap();
        repo.create("alice", "Home", "/srv/b").unwrap();
        repo.create("bob", "Work", "/srv/c").unwrap();

        let services = repo.list_by_user("alice").unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].label, "Work");
    }

    #[test]
    fn test_set_enabled_and_record_run() {
        let db = setup();
        let repo = SqliteServiceRepository::new(db.connection());

        let service = repo.create("alice", "Work", "/srv/a").unwrap();
        repo.set_enabled(service.id, false).unwrap();
        repo.record_harmonization(service.id, 10, 20).unwrap();

        let fetched = repo.fetch(service.id).unwrap().unwrap();
        assert!(!fetched.enabled);
        assert_eq!(fetched.harmonization_started_on, Some(10));
        assert_eq!(fetched.harmonization_finished_on, Some(20));

        assert!(repo.set_enabled(ServiceId(999), true).is_err());
    }
}
