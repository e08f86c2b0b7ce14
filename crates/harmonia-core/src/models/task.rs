//! Task payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Payload};

/// Progress state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    InProgress,
    Completed,
    Cancelled,
}

/// A to-do item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    /// Server-assigned identifier
    pub id: Option<String>,
    /// Server creation timestamp (Unix ms)
    pub created_on: Option<i64>,
    /// Server modification timestamp (Unix ms)
    pub modified_on: Option<i64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub starts_on: Option<DateTime<Utc>>,
    pub due_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    /// 1 (highest) to 9 (lowest)
    pub priority: Option<u8>,
    /// Percent complete
    pub progress: Option<u8>,
    pub status: TaskStatus,
    pub categories: Vec<String>,
}

impl Payload for Task {
    const KIND: CollectionKind = CollectionKind::Tasks;

    fn remote_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_remote_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn modified_on(&self) -> Option<i64> {
        self.modified_on
    }

    fn touch(&mut self, now: i64) {
        self.created_on.get_or_insert(now);
        self.modified_on = Some(now);
    }

    fn strip_bookkeeping(&mut self) {
        self.id = None;
        self.created_on = None;
        self.modified_on = None;
    }
}
