//! Remote-side contracts.
//!
//! The real protocol client lives outside this crate. Harmonization talks to
//! the remote server through [`RemoteStore`], one per domain, handed out by a
//! [`RemoteSession`] that a [`RemoteConnector`] builds fresh for each
//! collection pass.

mod directory;
mod memory;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Contact, Event, Payload, ServiceAccount, Task};

pub use directory::{DirectoryConnector, DirectoryRemote, DirectorySession};
pub use memory::{MemoryConnector, MemoryRemote, MemorySession};

/// A remote collection as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCollection {
    pub id: String,
    pub label: Option<String>,
    /// Current delta state, when the server exposes one
    pub state: Option<String>,
}

/// Remote entity ids changed since a state token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDelta {
    pub additions: Vec<String>,
    pub modifications: Vec<String>,
    pub deletions: Vec<String>,
    /// Token to pass on the next request
    pub state: Option<String>,
}

impl RemoteDelta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }
}

/// One entry of a full remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListItem {
    pub id: String,
    /// Server last-modified timestamp (Unix ms)
    pub modified_on: Option<i64>,
}

/// Full remote listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub items: Vec<RemoteListItem>,
    pub state: Option<String>,
}

/// Entity operations against one remote domain.
///
/// Missing collections and entities are reported as [`crate::Error::NotFound`].
pub trait RemoteStore<P: Payload> {
    /// Fetch collection properties
    fn collection_fetch(&mut self, collection: &str) -> Result<RemoteCollection>;

    /// Fetch an entity, or `None` when it does not exist
    fn entity_fetch(&mut self, collection: &str, id: &str) -> Result<Option<P>>;

    /// Create an entity; the returned payload carries its server id
    fn entity_create(&mut self, collection: &str, payload: &P) -> Result<P>;

    /// Replace an entity's content
    fn entity_modify(&mut self, collection: &str, id: &str, payload: &P) -> Result<P>;

    /// Delete an entity
    fn entity_delete(&mut self, collection: &str, id: &str) -> Result<()>;

    /// Changes since `since`.
    ///
    /// Servers without native delta support return
    /// [`crate::Error::CapabilityUnsupported`]; an unusable state token is
    /// reported as [`crate::Error::DataIntegrity`].
    fn entity_delta(&mut self, collection: &str, since: Option<&str>) -> Result<RemoteDelta>;

    /// Every entity id in the collection
    fn entity_list(&mut self, collection: &str) -> Result<RemoteListing>;
}

/// Per-pass connection to one service account
pub trait RemoteSession {
    fn contacts(&mut self) -> &mut dyn RemoteStore<Contact>;
    fn events(&mut self) -> &mut dyn RemoteStore<Event>;
    fn tasks(&mut self) -> &mut dyn RemoteStore<Task>;
}

/// Builds sessions for service accounts.
///
/// Shared across the worker threads of a concurrent run.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, account: &ServiceAccount) -> Result<Box<dyn RemoteSession>>;
}
