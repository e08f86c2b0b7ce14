//! The harmonization algorithm.
//!
//! One [`Harmonizer::harmonize`] call runs a single pass over one collection:
//! pull remote changes into the local store, then push local chronicle
//! changes to the remote side. Correlations carry the last signatures seen on
//! both sides; a change whose signature already matches is an echo of this
//! engine's own write and is skipped. Cursors only advance after their batch
//! is fully applied, so a failed pass can be retried as a whole.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::config::ConflictPolicy;
use crate::db::{
    ChronicleRepository, CollectionRepository, CorrelationRepository, EntityRepository,
    SqliteChronicleRepository, SqliteCollectionRepository, SqliteCorrelationRepository,
    SqliteEntityRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    ChronicleReference, Collection, CollectionId, CorrelationDraft, Entity, HarmonizationStatistics,
    HarmonizationStatus, Payload,
};
use crate::remote::{RemoteDelta, RemoteStore};
use crate::util::now_millis;


/// Result of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonizationOutcome {
    /// The pass ran; statistics count the mutations it applied
    Harmonized(HarmonizationStatistics),
    /// The collection was orphaned or gone remotely and has been deleted
    Retired,
}

/// Harmonizes collections of one domain against a remote store
pub struct Harmonizer<'a, P: Payload> {
    collections: SqliteCollectionRepository<'a>,
    entities: SqliteEntityRepository<'a, P>,
    chronicle: SqliteChronicleRepository<'a>,
    correlations: SqliteCorrelationRepository<'a>,
    remote: &'a mut dyn RemoteStore<P>,
    policy: ConflictPolicy,
}

impl<'a, P: Payload> Harmonizer<'a, P> {
    pub fn new(
        conn: &'a Connection,
        remote: &'a mut dyn RemoteStore<P>,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            collections: SqliteCollectionRepository::new(conn),
            entities: SqliteEntityRepository::new(conn),
            chronicle: SqliteChronicleRepository::new(conn),
            correlations: SqliteCorrelationRepository::new(conn),
            remote,
            policy,
        }
    }

    /// Run one pass over a collection.
    pub fn harmonize(&mut self, collection_id: CollectionId) -> Result<HarmonizationOutcome> {
        let collection = self
            .collections
            .fetch(collection_id)?
            .ok_or_else(|| Error::NotFound(format!("collection {collection_id}")))?;
        if collection.kind != P::KIND {
            return Err(Error::InvalidInput(format!(
                "collection {collection_id} holds {}, not {}",
                collection.kind,
                P::KIND
            )));
        }

        let Some(remote_collection) = collection.remote_id().map(ToString::to_string) else {
            return self.retire(&collection, "it has no remote collection id");
        };
        match self.remote.collection_fetch(&remote_collection) {
            Ok(_) => {}
            Err(error) if error.is_not_found() => {
                return self.retire(&collection, "the remote collection is gone");
            }
            Err(error) => return Err(error),
        }

        let mut statistics = HarmonizationStatistics::default();
        let observed_on = now_millis();

        let remote_delta = self.remote_changes(&collection, &remote_collection)?;
        for remote_id in remote_delta.additions.iter().chain(&remote_delta.modifications) {
            if let Some(status) =
                self.apply_remote_upsert(&collection, &remote_collection, remote_id)?
            {
                statistics.record(status);
            }
        }
        for remote_id in &remote_delta.deletions {
            if let Some(status) =
                self.apply_remote_deletion(collection.id, &remote_collection, remote_id)?
            {
                statistics.record(status);
            }
        }
        self.collections
            .update_remote_cursor(collection.id, remote_delta.state.as_deref())?;
        self.collections.update_observed_on(collection.id, observed_on)?;

        let local_delta =
            self.chronicle
                .delta(collection.id, collection.local_cursor.as_deref(), None, 0)?;
        for reference in local_delta.additions.iter().chain(&local_delta.modifications) {
            if let Some(status) =
                self.apply_local_upsert(collection.id, &remote_collection, reference)?
            {
                statistics.record(status);
            }
        }
        for reference in &local_delta.deletions {
            if let Some(status) =
                self.apply_local_deletion(collection.id, &remote_collection, reference)?
            {
                statistics.record(status);
            }
        }
        self.collections
            .update_local_cursor(collection.id, local_delta.cursor)?;

        tracing::info!(
            "Harmonized collection {} ({}): {} local created, {} local updated, {} local deleted, {} remote created, {} remote updated, {} remote deleted",
            collection.id,
            P::KIND,
            statistics.local_created,
            statistics.local_updated,
            statistics.local_deleted,
            statistics.remote_created,
            statistics.remote_updated,
            statistics.remote_deleted
        );
        Ok(HarmonizationOutcome::Harmonized(statistics))
    }

    fn retire(&self, collection: &Collection, reason: &str) -> Result<HarmonizationOutcome> {
        tracing::warn!("Retiring collection {} because {reason}", collection.id);
        self.collections.delete(collection.id)?;
        Ok(HarmonizationOutcome::Retired)
    }

    /// Remote changes since the stored state, from the native delta when the
    /// server has one and from a full listing otherwise.
    fn remote_changes(
        &mut self,
        collection: &Collection,
        remote_collection: &str,
    ) -> Result<RemoteDelta> {
        let since = collection.remote_cursor.as_deref();
        match self.remote.entity_delta(remote_collection, since) {
            Ok(delta) => Ok(delta),
            Err(Error::DataIntegrity(reason)) if since.is_some() => {
                tracing::warn!(
                    "Remote rejected state of collection {} ({reason}); resyncing from scratch",
                    collection.id
                );
                match self.remote.entity_delta(remote_collection, None) {
                    Err(error) if error.is_capability_unsupported() => {
                        self.reconcile_listing(collection, remote_collection)
                    }
                    other => other,
                }
            }
            Err(error) if error.is_capability_unsupported() => {
                self.reconcile_listing(collection, remote_collection)
            }
            Err(error) => Err(error),
        }
    }

    /// Diff a full remote listing against the correlated remote ids.
    fn reconcile_listing(
        &mut self,
        collection: &Collection,
        remote_collection: &str,
    ) -> Result<RemoteDelta> {
        let listing = self.remote.entity_list(remote_collection)?;
        let mut seen: HashSet<String> = self
            .correlations
            .list_by_collection(collection.id)?
            .into_iter()
            .filter(|correlation| correlation.remote_collection_id == remote_collection)
            .map(|correlation| correlation.remote_entity_id)
            .collect();

        let mut delta = RemoteDelta {
            state: listing.state,
            ..RemoteDelta::default()
        };
        for item in listing.items {
            if !seen.remove(&item.id) {
                delta.additions.push(item.id);
                continue;
            }
            // Missing timestamps count as changed; the echo check keeps that cheap
            let changed = match (item.modified_on, collection.last_observed_on) {
                (Some(modified_on), Some(observed_on)) => modified_on >= observed_on,
                _ => true,
            };
            if changed {
                delta.modifications.push(item.id);
            }
        }
        delta.deletions = seen.into_iter().collect();
        delta.deletions.sort();

        tracing::debug!(
            "Reconciled collection {} from listing: {} added, {} changed, {} gone",
            collection.id,
            delta.additions.len(),
            delta.modifications.len(),
            delta.deletions.len()
        );
        Ok(delta)
    }

    fn apply_remote_upsert(
        &mut self,
        collection: &Collection,
        remote_collection: &str,
        remote_id: &str,
    ) -> Result<Option<HarmonizationStatus>> {
        let Some(payload) = self.remote.entity_fetch(remote_collection, remote_id)? else {
            tracing::debug!("Remote entity {remote_id} vanished before it could be applied");
            return Ok(None);
        };
        let remote_signature = payload.signature()?;

        let correlation =
            self.correlations
                .find_by_remote(collection.id, remote_collection, remote_id)?;
        let local = match &correlation {
            Some(correlation) => {
                if correlation.remote_signature == remote_signature {
                    tracing::debug!("Skipping echo of remote entity {remote_id}");
                    return Ok(None);
                }
                self.entities
                    .fetch_by_correlation(collection.id, remote_collection, remote_id)?
            }
            None => None,
        };
        let prefer_local = self.policy == ConflictPolicy::PreferLocal;

        match (correlation, local) {
            (Some(correlation), Some(mut entity)) => {
                if prefer_local && entity.signature != correlation.local_signature {
                    tracing::debug!(
                        "Entity {} changed on both sides; keeping local content",
                        entity.id
                    );
                    return Ok(None);
                }
                entity.payload = payload;
                let entity = self.entities.modify(&entity)?;
                self.correlate(&entity, remote_collection, remote_id, remote_signature)?;
                Ok(Some(HarmonizationStatus::LocalUpdated))
            }
            (Some(_), None) if prefer_local => {
                tracing::debug!(
                    "Remote entity {remote_id} changed after its local deletion; keeping the deletion"
                );
                Ok(None)
            }
            _ => {
                let entity = self.entities.create(collection.id, &payload)?;
                self.correlate(&entity, remote_collection, remote_id, remote_signature)?;
                Ok(Some(HarmonizationStatus::LocalCreated))
            }
        }
    }

    fn apply_remote_deletion(
        &mut self,
        collection_id: CollectionId,
        remote_collection: &str,
        remote_id: &str,
    ) -> Result<Option<HarmonizationStatus>> {
        let Some(correlation) =
            self.correlations
                .find_by_remote(collection_id, remote_collection, remote_id)?
        else {
            return Ok(None);
        };

        let local =
            self.entities
                .fetch_by_correlation(collection_id, remote_collection, remote_id)?;
        let status = match local {
            Some(entity) => {
                self.entities.delete(&entity)?;
                Some(HarmonizationStatus::LocalDeleted)
            }
            None => None,
        };
        self.correlations.delete(correlation.id)?;
        Ok(status)
    }

    fn apply_local_upsert(
        &mut self,
        collection_id: CollectionId,
        remote_collection: &str,
        reference: &ChronicleReference,
    ) -> Result<Option<HarmonizationStatus>> {
        let Some(entity) = self.entities.fetch(reference.entity_id)? else {
            return Ok(None);
        };

        let Some(correlation) =
            self.correlations
                .find_by_local(collection_id, entity.id, remote_collection)?
        else {
            return self.push_create(remote_collection, &entity).map(Some);
        };
        if correlation.local_signature == entity.signature {
            tracing::debug!("Skipping echo of local entity {}", entity.id);
            return Ok(None);
        }

        let remote_id = correlation.remote_entity_id.clone();
        let Some(current) = self.remote.entity_fetch(remote_collection, &remote_id)? else {
            tracing::debug!(
                "Remote counterpart of entity {} vanished; creating it again",
                entity.id
            );
            self.correlations.delete(correlation.id)?;
            return self.push_create(remote_collection, &entity).map(Some);
        };
        let current_signature = current.signature()?;

        if current_signature == entity.signature {
            self.correlate(&entity, remote_collection, &remote_id, current_signature)?;
            return Ok(None);
        }

        let remote_untouched = current_signature == correlation.remote_signature;
        if remote_untouched || self.policy == ConflictPolicy::PreferLocal {
            let pushed = self
                .remote
                .entity_modify(remote_collection, &remote_id, &entity.payload)?;
            self.correlate(&entity, remote_collection, &remote_id, pushed.signature()?)?;
            return Ok(Some(HarmonizationStatus::RemoteUpdated));
        }

        tracing::debug!(
            "Entity {} changed on both sides; taking remote content",
            entity.id
        );
        let mut entity = entity;
        entity.payload = current;
        let entity = self.entities.modify(&entity)?;
        self.correlate(&entity, remote_collection, &remote_id, current_signature)?;
        Ok(Some(HarmonizationStatus::LocalUpdated))
    }

    fn apply_local_deletion(
        &mut self,
        collection_id: CollectionId,
        remote_collection: &str,
        reference: &ChronicleReference,
    ) -> Result<Option<HarmonizationStatus>> {
        let Some(correlation) = self
            .correlations
            .find_by_local(collection_id, reference.entity_id, remote_collection)?
        else {
            return Ok(None);
        };

        let status = match self
            .remote
            .entity_delete(remote_collection, &correlation.remote_entity_id)
        {
            Ok(()) => Some(HarmonizationStatus::RemoteDeleted),
            Err(error) if error.is_not_found() => None,
            Err(error) => return Err(error),
        };
        self.correlations.delete(correlation.id)?;
        Ok(status)
    }

    fn push_create(
        &mut self,
        remote_collection: &str,
        entity: &Entity<P>,
    ) -> Result<HarmonizationStatus> {
        let mut outgoing = entity.payload.clone();
        outgoing.set_remote_id(None);

        let created = self.remote.entity_create(remote_collection, &outgoing)?;
        let remote_id = created
            .remote_id()
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::DataIntegrity(format!(
                    "remote returned no id for entity {}",
                    entity.id
                ))
            })?;
        self.correlate(entity, remote_collection, &remote_id, created.signature()?)?;
        Ok(HarmonizationStatus::RemoteCreated)
    }

    fn correlate(
        &self,
        entity: &Entity<P>,
        remote_collection: &str,
        remote_id: &str,
        remote_signature: String,
    ) -> Result<()> {
        self.correlations.put(&CorrelationDraft {
            collection_id: entity.collection_id,
            local_entity_id: entity.id,
            local_uuid: entity.uuid,
            local_signature: entity.signature.clone(),
            remote_collection_id: remote_collection.to_string(),
            remote_entity_id: remote_id.to_string(),
            remote_signature,
        })?;
        Ok(())
    }
}
