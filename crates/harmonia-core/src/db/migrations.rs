//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, V1)?;
    }
    if version < 2 {
        apply(conn, 2, V2)?;
    }
    if version < 3 {
        apply(conn, 3, V3)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Run one migration's statements atomically and record its version
fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}

/// Version 1: accounts, collections, entities and the chronicle
const V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS services (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        label TEXT NOT NULL,
        location TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_on INTEGER NOT NULL,
        harmonization_started_on INTEGER,
        harmonization_finished_on INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_services_user ON services(user_id)",
    "CREATE TABLE IF NOT EXISTS collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        external_id TEXT,
        label TEXT,
        local_cursor TEXT,
        remote_cursor TEXT,
        last_observed_on INTEGER,
        lock_held INTEGER NOT NULL DEFAULT 0,
        lock_owner TEXT,
        lock_heartbeat INTEGER,
        created_on INTEGER NOT NULL,
        UNIQUE (service_id, external_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_collections_service ON collections(service_id)",
    // AUTOINCREMENT keeps entity ids unique for the chronicle's lifetime
    "CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        uuid TEXT NOT NULL UNIQUE,
        signature TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_on INTEGER NOT NULL,
        modified_on INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_entities_collection ON entities(collection_id)",
    "CREATE TABLE IF NOT EXISTS chronicle (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL,
        entity_id INTEGER NOT NULL,
        entity_uuid TEXT NOT NULL,
        operation INTEGER NOT NULL CHECK (operation IN (1, 2, 3)),
        clock INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chronicle_collection_clock ON chronicle(collection_id, clock)",
    "CREATE INDEX IF NOT EXISTS idx_chronicle_entity ON chronicle(collection_id, entity_id)",
];

/// Version 2: correlation index
///
/// Correlations outlive their local entity so a local deletion can still be
/// pushed to the remote side. Every key is scoped to the local collection:
/// two accounts may reuse the same remote collection and entity ids.
const V2: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS correlations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        local_entity_id INTEGER NOT NULL,
        local_uuid TEXT NOT NULL,
        local_signature TEXT NOT NULL,
        remote_collection_id TEXT NOT NULL,
        remote_entity_id TEXT NOT NULL,
        remote_signature TEXT NOT NULL,
        correlated_on INTEGER NOT NULL,
        UNIQUE (collection_id, local_entity_id, remote_collection_id),
        UNIQUE (collection_id, remote_collection_id, remote_entity_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_correlations_collection ON correlations(collection_id)",
];

/// Version 3: harmonization status on collections
const V3: &[&str] = &[
    "ALTER TABLE collections ADD COLUMN harmonized_on INTEGER",
    "ALTER TABLE collections ADD COLUMN last_error TEXT",
];
