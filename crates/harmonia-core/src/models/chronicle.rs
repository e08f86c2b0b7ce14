//! Chronicle models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionId, EntityId};
use crate::clock::Cursor;
use crate::error::{Error, Result};

/// Entity-level operation recorded in the chronicle.
///
/// Variants are ordered by rank: within one delta window the highest ranked
/// operation observed for an entity is its net effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChronicleOperation {
    Created = 1,
    Modified = 2,
    Deleted = 3,
}

impl ChronicleOperation {
    pub const fn rank(self) -> i64 {
        self as i64
    }

    pub fn from_rank(rank: i64) -> Result<Self> {
        match rank {
            1 => Ok(Self::Created),
            2 => Ok(Self::Modified),
            3 => Ok(Self::Deleted),
            other => Err(Error::DataIntegrity(format!(
                "unknown chronicle operation rank {other}"
            ))),
        }
    }
}

/// Immutable log record of one entity-level operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub id: i64,
    pub collection_id: CollectionId,
    pub entity_id: EntityId,
    pub entity_uuid: Uuid,
    pub operation: ChronicleOperation,
    /// Logical clock value (microseconds)
    pub clock: i64,
}

/// Entity named by a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChronicleReference {
    pub entity_id: EntityId,
    pub entity_uuid: Uuid,
}

/// Net changes of a collection since a cursor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChronicleDelta {
    pub additions: Vec<ChronicleReference>,
    pub modifications: Vec<ChronicleReference>,
    pub deletions: Vec<ChronicleReference>,
    /// Apex of the collection when the delta was computed
    #[serde(with = "cursor_string")]
    pub cursor: Cursor,
}

impl ChronicleDelta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.additions.len() + self.modifications.len() + self.deletions.len()
    }

    pub(crate) fn push(&mut self, reference: ChronicleReference, operation: ChronicleOperation) {
        match operation {
            ChronicleOperation::Created => self.additions.push(reference),
            ChronicleOperation::Modified => self.modifications.push(reference),
            ChronicleOperation::Deleted => self.deletions.push(reference),
        }
    }
}

mod cursor_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::clock::Cursor;

    pub fn serialize<S: Serializer>(cursor: &Cursor, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&cursor.encode())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cursor, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Cursor::decode(Some(&raw)).unwrap_or_default())
    }
}
