//! Entity model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionId, EntityId};

/// One logical record belonging to exactly one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity<P> {
    /// Local identifier
    pub id: EntityId,
    /// Owning collection
    pub collection_id: CollectionId,
    /// Stable logical identity, survives edits and remote overwrites
    pub uuid: Uuid,
    /// Signature of `payload`, recomputed on every write
    pub signature: String,
    /// Domain payload
    pub payload: P,
    /// Creation timestamp (Unix ms)
    pub created_on: i64,
    /// Last modification timestamp (Unix ms)
    pub modified_on: i64,
}
