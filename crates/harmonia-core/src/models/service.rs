//! Service account model

use serde::{Deserialize, Serialize};

use super::ServiceId;

/// A connected remote account owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Local identifier
    pub id: ServiceId,
    /// Owning user or tenant
    pub user_id: String,
    /// Human readable label
    pub label: String,
    /// Where the remote lives (URL or directory, interpreted by the connector)
    pub location: String,
    /// Disabled accounts are skipped by the scheduler
    pub enabled: bool,
    /// Creation timestamp (Unix ms)
    pub created_on: i64,
    /// Start of the most recent harmonization run (Unix ms)
    pub harmonization_started_on: Option<i64>,
    /// End of the most recent harmonization run (Unix ms)
    pub harmonization_finished_on: Option<i64>,
}
