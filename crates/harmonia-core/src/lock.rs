//! Collection lock and heartbeat.
//!
//! Advisory, row-level mutual exclusion over a collection's harmonization.
//! Acquisition is one conditional `UPDATE`, so concurrent workers sharing the
//! database race on SQLite's write lock and exactly one wins. A lock whose
//! heartbeat is older than the stale threshold is reclaimed by the next
//! worker that asks.

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::HarmonizerConfig;
use crate::error::{Error, Result};
use crate::models::CollectionId;
use crate::util::now_millis;

/// Lock operations over the `collections` table
#[derive(Clone, Copy)]
pub struct CollectionLock<'a> {
    conn: &'a Connection,
    stale_after_ms: i64,
    dry_run: bool,
}

impl<'a> CollectionLock<'a> {
    pub fn new(conn: &'a Connection, stale_after: Duration, dry_run: bool) -> Self {
        Self {
            conn,
            stale_after_ms: i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX),
            dry_run,
        }
    }

    pub fn from_config(conn: &'a Connection, config: &HarmonizerConfig) -> Self {
        Self::new(conn, config.stale_lock_threshold(), config.dry_run_locks)
    }

    /// Take the lock for `owner`.
    ///
    /// Returns `false` when another worker holds a fresh lock. In dry-run
    /// mode `lock_held` is never set but owner and heartbeat are recorded.
    pub fn acquire(&self, id: CollectionId, owner: &str) -> Result<bool> {
        let previous: Option<(bool, Option<String>)> = self
            .conn
            .query_row(
                "SELECT lock_held, lock_owner FROM collections WHERE id = ?",
                params![id],
                |row| Ok((row.get::<_, i32>(0)? != 0, row.get(1)?)),
            )
            .optional()?;
        let Some((was_held, previous_owner)) = previous else {
            return Err(Error::NotFound(format!("collection {id}")));
        };

        let now = now_millis();
        let stale_before = now.saturating_sub(self.stale_after_ms);
        let rows = self.conn.execute(
            "UPDATE collections SET lock_held = ?, lock_owner = ?, lock_heartbeat = ?
             WHERE id = ? AND (lock_held = 0 OR lock_heartbeat IS NULL OR lock_heartbeat < ?)",
            params![i32::from(!self.dry_run), owner, now, id, stale_before],
        )?;

        if rows == 0 {
            tracing::debug!(
                "Collection {id} is locked by {}",
                previous_owner.as_deref().unwrap_or("unknown")
            );
            return Ok(false);
        }

        if was_held {
            tracing::warn!(
                "Reclaimed stale lock on collection {id} from {}",
                previous_owner.as_deref().unwrap_or("unknown")
            );
        }
        Ok(true)
    }

    /// Refresh the heartbeat so a long pass is not mistaken for a dead worker.
    ///
    /// Fails with [`Error::LockLost`] once another worker has reclaimed the
    /// lock from `owner`.
    pub fn heartbeat(&self, id: CollectionId, owner: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE collections SET lock_heartbeat = ?
             WHERE id = ? AND lock_owner = ? AND (lock_held = 1 OR ?)",
            params![now_millis(), id, owner, self.dry_run],
        )?;
        if rows > 0 {
            return Ok(());
        }

        let holder: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT lock_owner FROM collections WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match holder {
            None => Err(Error::NotFound(format!("collection {id}"))),
            Some(holder) => Err(Error::LockLost(format!(
                "collection {id} is held by {}",
                holder.as_deref().unwrap_or("nobody")
            ))),
        }
    }

    /// Give the lock up if `owner` still holds it.
    ///
    /// Returns `false` when the collection is gone or another worker has
    /// taken the lock over; that worker's lock is left untouched.
    pub fn release(&self, id: CollectionId, owner: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE collections SET lock_held = 0, lock_owner = NULL
             WHERE id = ? AND lock_owner = ?",
            params![id, owner],
        )?;
        if rows == 0 {
            tracing::debug!("Lock on collection {id} no longer belongs to {owner}");
        }
        Ok(rows > 0)
    }

    /// Acquire and wrap the lock in a guard that releases on drop.
    pub fn acquire_guard(&self, id: CollectionId, owner: &str) -> Result<Option<LockGuard<'a>>> {
        if self.acquire(id, owner)? {
            Ok(Some(LockGuard {
                lock: *self,
                id,
                owner: owner.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Held collection lock; released on every exit path
pub struct LockGuard<'a> {
    lock: CollectionLock<'a>,
    id: CollectionId,
    owner: String,
    released: bool,
}

impl LockGuard<'_> {
    pub const fn collection_id(&self) -> CollectionId {
        self.id
    }

    pub fn heartbeat(&self) -> Result<()> {
        self.lock.heartbeat(self.id, &self.owner)
    }

    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.lock.release(self.id, &self.owner)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.lock.release(self.id, &self.owner) {
            tracing::warn!("Failed to release lock on collection {}: {error}", self.id);
        }
    }
}
