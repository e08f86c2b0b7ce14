//! Correlation model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionId, EntityId};

/// Durable link between a local entity and its remote counterpart, with the
/// content signatures both sides had when they were last harmonized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub id: i64,
    pub collection_id: CollectionId,
    pub local_entity_id: EntityId,
    pub local_uuid: Uuid,
    /// Local signature at the last harmonization
    pub local_signature: String,
    pub remote_collection_id: String,
    pub remote_entity_id: String,
    /// Remote signature at the last harmonization
    pub remote_signature: String,
    /// Last time either signature was recorded (Unix ms)
    pub correlated_on: i64,
}

/// Values written by `CorrelationRepository::put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationDraft {
    pub collection_id: CollectionId,
    pub local_entity_id: EntityId,
    pub local_uuid: Uuid,
    pub local_signature: String,
    pub remote_collection_id: String,
    pub remote_entity_id: String,
    pub remote_signature: String,
}
