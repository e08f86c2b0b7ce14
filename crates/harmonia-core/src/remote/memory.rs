//! In-process remote server.
//!
//! Keeps entities per collection with a versioned change log so it can answer
//! native delta queries. Delta support can be switched off to exercise the
//! full-list fallback, and writes can be made to fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{
    RemoteCollection, RemoteConnector, RemoteDelta, RemoteListItem, RemoteListing, RemoteSession,
    RemoteStore,
};
use crate::error::{Error, Result};
use crate::models::{Contact, Event, Payload, ServiceAccount, ServiceId, Task};
use crate::util::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug)]
struct MemoryCollection<P> {
    label: Option<String>,
    entities: BTreeMap<String, P>,
    log: Vec<(u64, String, Change)>,
}

impl<P> MemoryCollection<P> {
    fn version(&self) -> u64 {
        self.log.last().map_or(0, |(version, _, _)| *version)
    }

    fn record(&mut self, id: &str, change: Change) {
        let version = self.version() + 1;
        self.log.push((version, id.to_string(), change));
    }
}

#[derive(Debug)]
struct MemoryState<P> {
    collections: BTreeMap<String, MemoryCollection<P>>,
    supports_delta: bool,
    fail_writes: bool,
    writes: usize,
    last_stamp: i64,
}

impl<P> MemoryState<P> {
    fn stamp(&mut self) -> i64 {
        self.last_stamp = now_millis().max(self.last_stamp + 1);
        self.last_stamp
    }

    fn collection(&mut self, collection: &str) -> Result<&mut MemoryCollection<P>> {
        self.collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("remote collection {collection}")))
    }

    fn check_write(&mut self) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Transient("remote rejected the write".into()));
        }
        self.writes += 1;
        Ok(())
    }
}

/// Shared handle to an in-memory remote domain
#[derive(Debug)]
pub struct MemoryRemote<P> {
    state: Arc<Mutex<MemoryState<P>>>,
}

impl<P> Clone for MemoryRemote<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<P: Payload> Default for MemoryRemote<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> MemoryRemote<P> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                collections: BTreeMap::new(),
                supports_delta: true,
                fail_writes: false,
                writes: 0,
                last_stamp: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an empty collection
    pub fn add_collection(&self, id: &str, label: Option<&str>) {
        self.state().collections.insert(
            id.to_string(),
            MemoryCollection {
                label: label.map(ToString::to_string),
                entities: BTreeMap::new(),
                log: Vec::new(),
            },
        );
    }

    /// Drop a collection and everything in it
    pub fn remove_collection(&self, id: &str) {
        self.state().collections.remove(id);
    }

    /// Toggle native delta support
    pub fn set_supports_delta(&self, supported: bool) {
        self.state().supports_delta = supported;
    }

    /// Make every engine write fail with a transient error
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Number of successful writes made through [`RemoteStore`]
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Create an entity as another client of the server would
    pub fn insert(&self, collection: &str, payload: &P) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.insert_with_id(collection, &id, payload)?;
        Ok(id)
    }

    /// Create an entity under a server id chosen by the caller
    pub fn insert_with_id(&self, collection: &str, id: &str, payload: &P) -> Result<()> {
        let mut state = self.state();
        let now = state.stamp();
        let mut stored = payload.clone();
        stored.set_remote_id(Some(id.to_string()));
        stored.touch(now);

        let target = state.collection(collection)?;
        target.entities.insert(id.to_string(), stored);
        target.record(id, Change::Created);
        Ok(())
    }

    /// Replace an entity as another client of the server would
    pub fn update(&self, collection: &str, id: &str, payload: &P) -> Result<P> {
        let mut state = self.state();
        let now = state.stamp();
        let target = state.collection(collection)?;
        if !target.entities.contains_key(id) {
            return Err(Error::NotFound(format!("remote entity {id}")));
        }

        let mut stored = payload.clone();
        stored.set_remote_id(Some(id.to_string()));
        stored.touch(now);
        target.entities.insert(id.to_string(), stored.clone());
        target.record(id, Change::Modified);
        Ok(stored)
    }

    /// Delete an entity as another client of the server would
    pub fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let mut state = self.state();
        let target = state.collection(collection)?;
        if target.entities.remove(id).is_none() {
            return Err(Error::NotFound(format!("remote entity {id}")));
        }
        target.record(id, Change::Deleted);
        Ok(())
    }

    /// Current content of an entity
    pub fn get(&self, collection: &str, id: &str) -> Option<P> {
        self.state()
            .collections
            .get(collection)
            .and_then(|target| target.entities.get(id).cloned())
    }

    /// Entity ids of a collection
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.state()
            .collections
            .get(collection)
            .map(|target| target.entities.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl<P: Payload> RemoteStore<P> for MemoryRemote<P> {
    fn collection_fetch(&mut self, collection: &str) -> Result<RemoteCollection> {
        let mut state = self.state();
        let target = state.collection(collection)?;
        Ok(RemoteCollection {
            id: collection.to_string(),
            label: target.label.clone(),
            state: Some(target.version().to_string()),
        })
    }

    fn entity_fetch(&mut self, collection: &str, id: &str) -> Result<Option<P>> {
        let mut state = self.state();
        Ok(state.collection(collection)?.entities.get(id).cloned())
    }

    fn entity_create(&mut self, collection: &str, payload: &P) -> Result<P> {
        self.state().check_write()?;
        let id = self.insert(collection, payload)?;
        self.get(collection, &id)
            .ok_or_else(|| Error::NotFound(format!("remote entity {id}")))
    }

    fn entity_modify(&mut self, collection: &str, id: &str, payload: &P) -> Result<P> {
        self.state().check_write()?;
        self.update(collection, id, payload)
    }

    fn entity_delete(&mut self, collection: &str, id: &str) -> Result<()> {
        self.state().check_write()?;
        self.remove(collection, id)
    }

    fn entity_delta(&mut self, collection: &str, since: Option<&str>) -> Result<RemoteDelta> {
        let mut state = self.state();
        if !state.supports_delta {
            return Err(Error::CapabilityUnsupported(
                "memory remote has delta queries disabled".into(),
            ));
        }
        let target = state.collection(collection)?;
        let version = target.version();

        let Some(since) = since else {
            return Ok(RemoteDelta {
                additions: target.entities.keys().cloned().collect(),
                state: Some(version.to_string()),
                ..RemoteDelta::default()
            });
        };

        let since: u64 = since
            .trim()
            .parse()
            .ok()
            .filter(|since| *since <= version)
            .ok_or_else(|| Error::DataIntegrity(format!("unknown remote state {since:?}")))?;

        // First and last change per entity decide its net effect
        let mut changes: BTreeMap<&str, (Change, Change)> = BTreeMap::new();
        for (_, id, change) in target.log.iter().filter(|(v, _, _)| *v > since) {
            changes
                .entry(id.as_str())
                .and_modify(|(_, last)| *last = *change)
                .or_insert((*change, *change));
        }

        let mut delta = RemoteDelta {
            state: Some(version.to_string()),
            ..RemoteDelta::default()
        };
        for (id, (first, last)) in changes {
            match (first, last) {
                (Change::Created, Change::Deleted) => {}
                (_, Change::Deleted) => delta.deletions.push(id.to_string()),
                (Change::Created, _) => delta.additions.push(id.to_string()),
                _ => delta.modifications.push(id.to_string()),
            }
        }
        Ok(delta)
    }

    fn entity_list(&mut self, collection: &str) -> Result<RemoteListing> {
        let mut state = self.state();
        let target = state.collection(collection)?;
        Ok(RemoteListing {
            items: target
                .entities
                .iter()
                .map(|(id, payload)| RemoteListItem {
                    id: id.clone(),
                    modified_on: payload.modified_on(),
                })
                .collect(),
            state: Some(target.version().to_string()),
        })
    }
}

/// In-memory remote for one service account
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    pub contacts: MemoryRemote<Contact>,
    pub events: MemoryRemote<Event>,
    pub tasks: MemoryRemote<Task>,
}

impl RemoteSession for MemorySession {
    fn contacts(&mut self) -> &mut dyn RemoteStore<Contact> {
        &mut self.contacts
    }

    fn events(&mut self) -> &mut dyn RemoteStore<Event> {
        &mut self.events
    }

    fn tasks(&mut self) -> &mut dyn RemoteStore<Task> {
        &mut self.tasks
    }
}

/// Connects service accounts to registered in-memory sessions
#[derive(Debug, Default)]
pub struct MemoryConnector {
    sessions: HashMap<ServiceId, MemorySession>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `session` for `service_id`; the session's state stays shared
    pub fn register(&mut self, service_id: ServiceId, session: &MemorySession) {
        self.sessions.insert(service_id, session.clone());
    }
}

impl RemoteConnector for MemoryConnector {
    fn connect(&self, account: &ServiceAccount) -> Result<Box<dyn RemoteSession>> {
        let session = self
            .sessions
            .get(&account.id)
            .ok_or_else(|| Error::Transient(format!("service {} is unreachable", account.id)))?;
        Ok(Box::new(session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn remote() -> MemoryRemote<Contact> {
        let remote = MemoryRemote::new();
        remote.add_collection("ab", Some("People"));
        remote
    }

    #[test]
    fn delta_reports_net_changes() {
        let mut remote = remote();
        let kept = remote.insert("ab", &Contact::named("Ada")).unwrap();
        let state = remote.entity_delta("ab", None).unwrap().state;

        let added = remote.insert("ab", &Contact::named("Grace")).unwrap();
        let transient = remote.insert("ab", &Contact::named("Temp")).unwrap();
        remote.remove("ab", &transient).unwrap();
        remote.update("ab", &kept, &Contact::named("Ada L.")).unwrap();

        let delta = remote.entity_delta("ab", state.as_deref()).unwrap();
        assert_eq!(delta.additions, vec![added]);
        assert_eq!(delta.modifications, vec![kept]);
        assert!(delta.deletions.is_empty());

        let settled = remote.entity_delta("ab", delta.state.as_deref()).unwrap();
        assert!(settled.is_empty());
    }

    #[test]
    fn delta_rejects_unknown_state() {
        let mut remote = remote();
        assert!(matches!(
            remote.entity_delta("ab", Some("nonsense")),
            Err(Error::DataIntegrity(_))
        ));
        assert!(matches!(
            remote.entity_delta("ab", Some("99")),
            Err(Error::DataIntegrity(_))
        ));
    }

    #[test]
    fn delta_can_be_disabled() {
        let mut remote = remote();
        remote.set_supports_delta(false);
        assert!(remote
            .entity_delta("ab", None)
            .unwrap_err()
            .is_capability_unsupported());
    }

    #[test]
    fn create_assigns_id_and_counts_writes() {
        let mut remote = remote();
        let created = remote.entity_create("ab", &Contact::named("Ada")).unwrap();

        let id = created.remote_id().unwrap().to_string();
        assert!(created.modified_on().is_some());
        assert_eq!(remote.get("ab", &id), Some(created));
        assert_eq!(remote.writes(), 1);

        remote.set_fail_writes(true);
        assert!(remote.entity_delete("ab", &id).unwrap_err().is_transient());
        assert_eq!(remote.ids("ab"), vec![id]);
    }

    #[test]
    fn missing_collection_is_not_found() {
        let mut remote = remote();
        assert!(remote.collection_fetch("nope").unwrap_err().is_not_found());
    }
}
