//! Directory-backed remote.
//!
//! A service location is a directory laid out as
//! `<location>/<kind>/<collection>/<entity>.json`. It has no change log, so
//! harmonization always reconciles it from full listings using file
//! modification times.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{
    RemoteCollection, RemoteConnector, RemoteDelta, RemoteListItem, RemoteListing, RemoteSession,
    RemoteStore,
};
use crate::error::{Error, Result};
use crate::models::{Contact, Event, Payload, ServiceAccount, Task};
use crate::util::now_millis;

const EXTENSION: &str = "json";

/// One domain of a directory remote
#[derive(Debug, Clone)]
pub struct DirectoryRemote<P> {
    root: PathBuf,
    payload: PhantomData<fn() -> P>,
}

fn validate_id(id: &str) -> Result<&str> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(id)
    } else {
        Err(Error::InvalidInput(format!("invalid remote id {id:?}")))
    }
}

fn modified_millis(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    Some(chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis())
}

impl<P: Payload> DirectoryRemote<P> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            payload: PhantomData,
        }
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        let dir = self.root.join(validate_id(collection)?);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(Error::NotFound(format!("remote collection {collection}")))
        }
    }

    fn entity_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        Ok(self
            .collection_dir(collection)?
            .join(format!("{}.{EXTENSION}", validate_id(id)?)))
    }

    fn write(path: &Path, payload: &P) -> Result<()> {
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(payload)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn store(&self, path: &Path, id: &str, payload: &P) -> Result<P> {
        let mut stored = payload.clone();
        stored.set_remote_id(Some(id.to_string()));
        stored.touch(now_millis());
        Self::write(path, &stored)?;
        Ok(stored)
    }
}

impl<P: Payload> RemoteStore<P> for DirectoryRemote<P> {
    fn collection_fetch(&mut self, collection: &str) -> Result<RemoteCollection> {
        self.collection_dir(collection)?;
        Ok(RemoteCollection {
            id: collection.to_string(),
            label: None,
            state: None,
        })
    }

    fn entity_fetch(&mut self, collection: &str, id: &str) -> Result<Option<P>> {
        let path = self.entity_path(collection, id)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let mut payload: P = serde_json::from_slice(&raw)?;
        payload.set_remote_id(Some(id.to_string()));
        Ok(Some(payload))
    }

    fn entity_create(&mut self, collection: &str, payload: &P) -> Result<P> {
        let id = Uuid::now_v7().to_string();
        let path = self.entity_path(collection, &id)?;
        self.store(&path, &id, payload)
    }

    fn entity_modify(&mut self, collection: &str, id: &str, payload: &P) -> Result<P> {
        let path = self.entity_path(collection, id)?;
        if !path.is_file() {
            return Err(Error::NotFound(format!("remote entity {id}")));
        }
        self.store(&path, id, payload)
    }

    fn entity_delete(&mut self, collection: &str, id: &str) -> Result<()> {
        let path = self.entity_path(collection, id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("remote entity {id}")))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn entity_delta(&mut self, _collection: &str, _since: Option<&str>) -> Result<RemoteDelta> {
        Err(Error::CapabilityUnsupported(
            "directory remotes have no change log".into(),
        ))
    }

    fn entity_list(&mut self, collection: &str) -> Result<RemoteListing> {
        let dir = self.collection_dir(collection)?;
        let mut items = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() {
                continue;
            }
            items.push(RemoteListItem {
                id: id.to_string(),
                modified_on: modified_millis(&path),
            });
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(RemoteListing { items, state: None })
    }
}

/// Directory remote for one service account
#[derive(Debug, Clone)]
pub struct DirectorySession {
    contacts: DirectoryRemote<Contact>,
    events: DirectoryRemote<Event>,
    tasks: DirectoryRemote<Task>,
}

impl DirectorySession {
    pub fn new(location: impl AsRef<Path>) -> Self {
        let location = location.as_ref();
        Self {
            contacts: DirectoryRemote::new(location.join("contacts")),
            events: DirectoryRemote::new(location.join("events")),
            tasks: DirectoryRemote::new(location.join("tasks")),
        }
    }
}

impl RemoteSession for DirectorySession {
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

/// Treats each service location as a directory remote
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryConnector;

impl RemoteConnector for DirectoryConnector {
    fn connect(&self, account: &ServiceAccount) -> Result<Box<dyn RemoteSession>> {
        let location = account.location.trim();
        let location = Path::new(location.strip_prefix("file://").unwrap_or(location));
        if !location.is_dir() {
            return Err(Error::Transient(format!(
                "service location {} is not reachable",
                location.display()
            )));
        }
        Ok(Box::new(DirectorySession::new(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> (tempfile::TempDir, DirectoryRemote<Contact>) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("contacts/ab")).unwrap();
        let remote = DirectoryRemote::new(dir.path().join("contacts"));
        (dir, remote)
    }

    #[test]
    fn create_fetch_modify_delete() {
        let (_dir, mut remote) = remote();

        let created = remote.entity_create("ab", &Contact::named("Ada")).unwrap();
        let id = created.remote_id().unwrap().to_string();
        assert_eq!(remote.entity_fetch("ab", &id).unwrap(), Some(created));

        let mut edited = Contact::named("Ada Lovelace");
        edited.set_remote_id(Some(id.clone()));
        remote.entity_modify("ab", &id, &edited).unwrap();
        let fetched = remote.entity_fetch("ab", &id).unwrap().unwrap();
        assert_eq!(fetched.display_name.as_deref(), Some("Ada Lovelace"));

        remote.entity_delete("ab", &id).unwrap();
        assert_eq!(remote.entity_fetch("ab", &id).unwrap(), None);
        assert!(remote.entity_delete("ab", &id).unwrap_err().is_not_found());
    }

    #[test]
    fn list_reports_json_files_only() {
        let (dir, mut remote) = remote();
        let created = remote.entity_create("ab", &Contact::named("Ada")).unwrap();
        fs::write(dir.path().join("contacts/ab/notes.txt"), "ignored").unwrap();

        let listing = remote.entity_list("ab").unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(Some(listing.items[0].id.as_str()), created.remote_id());
        assert!(listing.items[0].modified_on.is_some());
    }

    #[test]
    fn delta_is_unsupported() {
        let (_dir, mut remote) = remote();
        assert!(remote
            .entity_delta("ab", None)
            .unwrap_err()
            .is_capability_unsupported());
    }

    #[test]
    fn rejects_path_traversal() {
        let (_dir, mut remote) = remote();
        assert!(matches!(
            remote.entity_fetch("ab", "../escape"),
            Err(Error::InvalidInput(_))
        ));
        assert!(remote.collection_fetch("missing").unwrap_err().is_not_found());
    }
}
