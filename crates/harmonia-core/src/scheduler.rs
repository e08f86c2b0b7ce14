//! Harmonization scheduler.
//!
//! Walks the collections of an account, takes each collection's lock and
//! repeats harmonization passes until one applies nothing. Failures are
//! contained per collection: they are logged and stored on the collection
//! while the walk moves on. [`ConcurrentScheduler`] runs the collections of an
//! account side by side instead.

use std::path::PathBuf;
use std::thread;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::HarmonizerConfig;
use crate::db::{
    CollectionRepository, Database, ServiceRepository, SqliteCollectionRepository,
    SqliteServiceRepository,
};
use crate::error::Result;
use crate::harmonize::{HarmonizationOutcome, Harmonizer};
use crate::lock::{CollectionLock, LockGuard};
use crate::models::{
    Collection, CollectionId, CollectionKind, Contact, Event, HarmonizationStatistics,
    ServiceAccount, ServiceId, Task,
};
use crate::remote::{RemoteConnector, RemoteSession};
use crate::util::{default_lock_owner, now_millis};

/// What happened to one collection during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionOutcome {
    /// Passes ran until quiet (or the pass limit)
    Harmonized {
        passes: u32,
        statistics: HarmonizationStatistics,
    },
    /// Another worker holds a fresh lock
    Locked,
    /// Orphaned or gone remotely; deleted locally
    Retired,
    /// The pass was abandoned; retried on the next run
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub collection_id: CollectionId,
    pub kind: CollectionKind,
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub outcome: CollectionOutcome,
}

impl CollectionReport {
    fn new(collection: &Collection, outcome: CollectionOutcome) -> Self {
        Self {
            collection_id: collection.id,
            kind: collection.kind,
            external_id: collection.external_id.clone(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReport {
    pub service_id: ServiceId,
    pub collections: Vec<CollectionReport>,
    /// Set when the account's collections could not be listed
    pub error: Option<String>,
}

impl AccountReport {
    /// Statistics summed over every harmonized collection
    pub fn totals(&self) -> HarmonizationStatistics {
        let mut totals = HarmonizationStatistics::default();
        for report in &self.collections {
            if let CollectionOutcome::Harmonized { statistics, .. } = &report.outcome {
                totals += *statistics;
            }
        }
        totals
    }

    pub fn failures(&self) -> usize {
        let failed = self
            .collections
            .iter()
            .filter(|report| matches!(report.outcome, CollectionOutcome::Failed { .. }))
            .count();
        failed + usize::from(self.error.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub user_id: String,
    pub started_on: i64,
    pub finished_on: i64,
    pub accounts: Vec<AccountReport>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.accounts.iter().map(AccountReport::failures).sum()
    }
}

/// Drives harmonization for service accounts
pub struct Scheduler<'a> {
    conn: &'a Connection,
    connector: &'a dyn RemoteConnector,
    config: HarmonizerConfig,
    owner: String,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        conn: &'a Connection,
        connector: &'a dyn RemoteConnector,
        config: HarmonizerConfig,
    ) -> Self {
        Self {
            conn,
            connector,
            config,
            owner: default_lock_owner(),
        }
    }

    /// Use `owner` as the lock holder instead of this process and thread
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Harmonize every enabled account of a user.
    pub fn run_all(&self, user_id: &str) -> Result<RunReport> {
        let started_on = now_millis();
        let accounts = SqliteServiceRepository::new(self.conn).list_by_user(user_id)?;
        let reports = enabled(&accounts).map(|account| self.run(account)).collect();
        Ok(finish_run(user_id, started_on, reports))
    }

    /// Harmonize every collection of one account, one after another.
    pub fn run(&self, account: &ServiceAccount) -> AccountReport {
        let started_on = now_millis();
        let collections = match list_collections(self.conn, account) {
            Ok(collections) => collections,
            Err(report) => return report,
        };

        let reports = collections
            .iter()
            .map(|collection| self.run_collection(account, collection))
            .collect();
        finish_account(self.conn, account, started_on, reports)
    }

    /// Lock one collection and harmonize it until quiet.
    ///
    /// Orphaned collections are retired while the lock is held.
    pub fn run_collection(
        &self,
        account: &ServiceAccount,
        collection: &Collection,
    ) -> CollectionReport {
        let lock = CollectionLock::from_config(self.conn, &self.config);
        let outcome = match lock.acquire_guard(collection.id, &self.owner) {
            Ok(Some(guard)) => self.run_guarded(account, collection, guard),
            Ok(None) => CollectionOutcome::Locked,
            Err(error) => {
                tracing::error!("Failed to lock collection {}: {error}", collection.id);
                CollectionOutcome::Failed {
                    error: error.to_string(),
                }
            }
        };

        CollectionReport::new(collection, outcome)
    }

    fn run_guarded(
        &self,
        account: &ServiceAccount,
        collection: &Collection,
        guard: LockGuard<'_>,
    ) -> CollectionOutcome {
        let collections = SqliteCollectionRepository::new(self.conn);

        let outcome = if collection.is_orphaned() {
            tracing::warn!("Retiring orphaned collection {}", collection.id);
            match collections.delete(collection.id) {
                Ok(()) => CollectionOutcome::Retired,
                Err(error) => CollectionOutcome::Failed {
                    error: error.to_string(),
                },
            }
        } else {
            match self.harmonize_locked(account, collection, &guard) {
                Ok(outcome) => {
                    if outcome != CollectionOutcome::Retired {
                        if let Err(error) =
                            collections.record_outcome(collection.id, now_millis(), None)
                        {
                            tracing::warn!(
                                "Failed to record outcome of collection {}: {error}",
                                collection.id
                            );
                        }
                    }
                    outcome
                }
                Err(error) => {
                    tracing::error!("Harmonization of collection {} failed: {error}", collection.id);
                    let message = error.to_string();
                    if let Err(error) =
                        collections.record_outcome(collection.id, now_millis(), Some(&message))
                    {
                        tracing::warn!(
                            "Failed to record outcome of collection {}: {error}",
                            collection.id
                        );
                    }
                    CollectionOutcome::Failed { error: message }
                }
            }
        };

        if let Err(error) = guard.release() {
            tracing::warn!("Failed to release lock on collection {}: {error}", collection.id);
        }
        outcome
    }

    fn harmonize_locked(
        &self,
        account: &ServiceAccount,
        collection: &Collection,
        guard: &LockGuard<'_>,
    ) -> Result<CollectionOutcome> {
        let collection_id = guard.collection_id();
        let mut session = self.connector.connect(account)?;
        let mut statistics = HarmonizationStatistics::default();
        let mut passes = 0;

        loop {
            if passes >= self.config.max_passes {
                tracing::warn!(
                    "Collection {collection_id} still changing after {passes} passes; continuing next run"
                );
                break;
            }
            guard.heartbeat()?;
            passes += 1;

            match self.pass(session.as_mut(), collection)? {
                HarmonizationOutcome::Retired => return Ok(CollectionOutcome::Retired),
                HarmonizationOutcome::Harmonized(pass) => {
                    statistics += pass;
                    if pass.is_quiet() {
                        break;
                    }
                }
            }
        }

        Ok(CollectionOutcome::Harmonized { passes, statistics })
    }

    fn pass(
        &self,
        session: &mut dyn RemoteSession,
        collection: &Collection,
    ) -> Result<HarmonizationOutcome> {
        let policy = self.config.conflict_policy;
        match collection.kind {
            CollectionKind::Contacts => {
                Harmonizer::<Contact>::new(self.conn, session.contacts(), policy)
                    .harmonize(collection.id)
            }
            CollectionKind::Events => {
                Harmonizer::<Event>::new(self.conn, session.events(), policy).harmonize(collection.id)
            }
            CollectionKind::Tasks => {
                Harmonizer::<Task>::new(self.conn, session.tasks(), policy).harmonize(collection.id)
            }
        }
    }
}

/// Harmonizes the collections of an account in parallel.
///
/// Each collection runs on a scoped thread with its own connection to the
/// database file, so a slow remote collection does not hold up its siblings.
pub struct ConcurrentScheduler<'a> {
    path: PathBuf,
    connector: &'a dyn RemoteConnector,
    config: HarmonizerConfig,
}

impl<'a> ConcurrentScheduler<'a> {
    pub fn new(
        path: impl Into<PathBuf>,
        connector: &'a dyn RemoteConnector,
        config: HarmonizerConfig,
    ) -> Self {
        Self {
            path: path.into(),
            connector,
            config,
        }
    }

    /// Harmonize every enabled account of a user.
    pub fn run_all(&self, user_id: &str) -> Result<RunReport> {
        let started_on = now_millis();
        let db = Database::open(&self.path)?;
        let accounts = SqliteServiceRepository::new(db.connection()).list_by_user(user_id)?;
        let reports = enabled(&accounts)
            .map(|account| self.run_on(db.connection(), account))
            .collect();
        Ok(finish_run(user_id, started_on, reports))
    }

    /// Harmonize every collection of one account at once.
    pub fn run(&self, account: &ServiceAccount) -> Result<AccountReport> {
        let db = Database::open(&self.path)?;
        Ok(self.run_on(db.connection(), account))
    }

    fn run_on(&self, conn: &Connection, account: &ServiceAccount) -> AccountReport {
        let started_on = now_millis();
        let collections = match list_collections(conn, account) {
            Ok(collections) => collections,
            Err(report) => return report,
        };

        let reports = thread::scope(|scope| {
            let workers: Vec<_> = collections
                .iter()
                .map(|collection| {
                    let worker = scope.spawn(move || self.run_worker(account, collection));
                    (collection, worker)
                })
                .collect();

            workers
                .into_iter()
                .map(|(collection, worker)| {
                    worker.join().unwrap_or_else(|_| {
                        tracing::error!("Worker for collection {} panicked", collection.id);
                        CollectionReport::new(
                            collection,
                            CollectionOutcome::Failed {
                                error: "worker panicked".to_string(),
                            },
                        )
                    })
                })
                .collect()
        });
        finish_account(conn, account, started_on, reports)
    }

    fn run_worker(&self, account: &ServiceAccount, collection: &Collection) -> CollectionReport {
        match Database::open(&self.path) {
            Ok(db) => Scheduler::new(db.connection(), self.connector, self.config.clone())
                .run_collection(account, collection),
            Err(error) => {
                tracing::error!("Failed to open database for collection {}: {error}", collection.id);
                CollectionReport::new(
                    collection,
                    CollectionOutcome::Failed {
                        error: error.to_string(),
                    },
                )
            }
        }
    }
}

fn enabled(accounts: &[ServiceAccount]) -> impl Iterator<Item = &ServiceAccount> {
    accounts.iter().filter(|account| {
        if !account.enabled {
            tracing::debug!("Skipping disabled service {}", account.id);
        }
        account.enabled
    })
}

/// The account's collections, or the failed report when they can't be listed
fn list_collections(
    conn: &Connection,
    account: &ServiceAccount,
) -> std::result::Result<Vec<Collection>, AccountReport> {
    SqliteCollectionRepository::new(conn)
        .list_by_service(account.id)
        .map_err(|error| {
            tracing::error!("Failed to list collections of service {}: {error}", account.id);
            AccountReport {
                service_id: account.id,
                collections: Vec::new(),
                error: Some(error.to_string()),
            }
        })
}

fn finish_account(
    conn: &Connection,
    account: &ServiceAccount,
    started_on: i64,
    collections: Vec<CollectionReport>,
) -> AccountReport {
    if let Err(error) =
        SqliteServiceRepository::new(conn).record_harmonization(account.id, started_on, now_millis())
    {
        tracing::warn!("Failed to record harmonization of service {}: {error}", account.id);
    }

    AccountReport {
        service_id: account.id,
        collections,
        error: None,
    }
}

fn finish_run(user_id: &str, started_on: i64, accounts: Vec<AccountReport>) -> RunReport {
    let report = RunReport {
        user_id: user_id.to_string(),
        started_on,
        finished_on: now_millis(),
        accounts,
    };
    tracing::info!(
        "Harmonized {} account(s) of user {user_id} in {} ms with {} failure(s)",
        report.accounts.len(),
        report.finished_on - report.started_on,
        report.failures()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, Database, EntityRepository, SqliteEntityRepository};
    use crate::remote::{MemoryConnector, MemorySession};

    struct Setup {
        db: Database,
        account: ServiceAccount,
        session: MemorySession,
        connector: MemoryConnector,
    }

    fn setup() -> Setup {
        let db = fixtures::database();
        let account = fixtures::service(&db);
        let session = MemorySession::default();
        let mut connector = MemoryConnector::new();
        connector.register(account.id, &session);
        Setup {
            db,
            account,
            session,
            connector,
        }
    }

    fn confirm(setup: &Setup, kind: CollectionKind, external_id: &str) -> Collection {
        SqliteCollectionRepository::new(setup.db.connection())
            .confirm(setup.account.id, kind, external_id, None)
            .unwrap()
    }

    fn fetch(setup: &Setup, id: CollectionId) -> Collection {
        SqliteCollectionRepository::new(setup.db.connection())
            .fetch(id)
            .unwrap()
            .unwrap()
    }

    fn scheduler(setup: &Setup) -> Scheduler<'_> {
        Scheduler::new(
            setup.db.connection(),
            &setup.connector,
            HarmonizerConfig::default(),
        )
        .with_owner("test-worker")
    }

    #[test]
    fn run_repeats_passes_until_quiet() {
        let setup = setup();
        let contacts = confirm(&setup, CollectionKind::Contacts, "ab");
        let tasks = confirm(&setup, CollectionKind::Tasks, "todo");
        setup.session.contacts.add_collection("ab", None);
        setup.session.tasks.add_collection("todo", None);

        setup
            .session
            .contacts
            .insert("ab", &Contact::named("Ada"))
            .unwrap();
        SqliteEntityRepository::<Task>::new(setup.db.connection())
            .create(
                tasks.id,
                &Task {
                    summary: Some("Write notes".into()),
                    ..Task::default()
                },
            )
            .unwrap();

        let report = scheduler(&setup).run(&setup.account);
        assert_eq!(report.failures(), 0);
        assert_eq!(report.collections.len(), 2);
        assert_eq!(
            report.collections[0].outcome,
            CollectionOutcome::Harmonized {
                passes: 2,
                statistics: HarmonizationStatistics {
                    local_created: 1,
                    ..HarmonizationStatistics::default()
                },
            }
        );
        assert_eq!(report.totals().remote_created, 1);
        assert_eq!(setup.session.tasks.ids("todo").len(), 1);

        let contacts = fetch(&setup, contacts.id);
        assert!(!contacts.lock_held);
        assert!(contacts.harmonized_on.is_some());

        let account = SqliteServiceRepository::new(setup.db.connection())
            .fetch(setup.account.id)
            .unwrap()
            .unwrap();
        assert!(account.harmonization_finished_on.is_some());
    }

    #[test]
    fn failure_is_isolated_and_releases_lock() {
        let setup = setup();
        let contacts = confirm(&setup, CollectionKind::Contacts, "ab");
        let events = confirm(&setup, CollectionKind::Events, "cal");
        setup.session.contacts.add_collection("ab", None);
        setup.session.events.add_collection("cal", None);

        SqliteEntityRepository::<Contact>::new(setup.db.connection())
            .create(contacts.id, &Contact::named("Grace"))
            .unwrap();
        setup.session.contacts.set_fail_writes(true);
        setup
            .session
            .events
            .insert(
                "cal",
                &Event {
                    summary: Some("Launch".into()),
                    ..Event::default()
                },
            )
            .unwrap();

        let report = scheduler(&setup).run(&setup.account);
        assert!(matches!(
            report.collections[0].outcome,
            CollectionOutcome::Failed { .. }
        ));
        assert!(matches!(
            report.collections[1].outcome,
            CollectionOutcome::Harmonized { .. }
        ));

        let failed = fetch(&setup, contacts.id);
        assert!(!failed.lock_held);
        assert!(failed.last_harmonization_failed());
        assert!(!fetch(&setup, events.id).last_harmonization_failed());

        setup.session.contacts.set_fail_writes(false);
        let report = scheduler(&setup).run(&setup.account);
        assert_eq!(report.failures(), 0);
        assert!(!fetch(&setup, contacts.id).last_harmonization_failed());
        assert_eq!(setup.session.contacts.ids("ab").len(), 1);
    }

    #[test]
    fn locked_collection_is_skipped() {
        let setup = setup();
        let contacts = confirm(&setup, CollectionKind::Contacts, "ab");
        setup.session.contacts.add_collection("ab", None);

        let config = HarmonizerConfig::default();
        let lock = CollectionLock::from_config(setup.db.connection(), &config);
        assert!(lock.acquire(contacts.id, "other-worker").unwrap());

        let report = scheduler(&setup).run(&setup.account);
        assert_eq!(report.collections[0].outcome, CollectionOutcome::Locked);
        assert_eq!(
            fetch(&setup, contacts.id).lock_owner.as_deref(),
            Some("other-worker")
        );
    }

    #[test]
    fn orphaned_and_vanished_collections_are_retired() {
        let setup = setup();
        let repo = SqliteCollectionRepository::new(setup.db.connection());
        let orphan = repo
            .create(setup.account.id, CollectionKind::Tasks, None, None)
            .unwrap();
        let vanished = confirm(&setup, CollectionKind::Contacts, "gone");

        let report = scheduler(&setup).run(&setup.account);
        assert!(report
            .collections
            .iter()
            .all(|collection| collection.outcome == CollectionOutcome::Retired));
        assert!(repo.fetch(orphan.id).unwrap().is_none());
        assert!(repo.fetch(vanished.id).unwrap().is_none());
    }

    #[test]
    fn locked_orphan_is_left_to_its_holder() {
        let setup = setup();
        let repo = SqliteCollectionRepository::new(setup.db.connection());
        let orphan = repo
            .create(setup.account.id, CollectionKind::Tasks, None, None)
            .unwrap();

        let config = HarmonizerConfig::default();
        let lock = CollectionLock::from_config(setup.db.connection(), &config);
        assert!(lock.acquire(orphan.id, "other-worker").unwrap());

        let report = scheduler(&setup).run(&setup.account);
        assert_eq!(report.collections[0].outcome, CollectionOutcome::Locked);
        assert!(repo.fetch(orphan.id).unwrap().is_some());

        assert!(lock.release(orphan.id, "other-worker").unwrap());
        let report = scheduler(&setup).run(&setup.account);
        assert_eq!(report.collections[0].outcome, CollectionOutcome::Retired);
        assert!(repo.fetch(orphan.id).unwrap().is_none());
    }

    #[test]
    fn concurrent_run_harmonizes_every_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harmonia.db");
        let db = Database::open(&path).unwrap();
        let account = fixtures::service(&db);
        let session = MemorySession::default();
        let mut connector = MemoryConnector::new();
        connector.register(account.id, &session);

        let repo = SqliteCollectionRepository::new(db.connection());
        for name in ["ab", "cd", "ef"] {
            repo.confirm(account.id, CollectionKind::Contacts, name, None)
                .unwrap();
            session.contacts.add_collection(name, None);
            session.contacts.insert(name, &Contact::named(name)).unwrap();
        }
        let busy = repo
            .confirm(account.id, CollectionKind::Tasks, "todo", None)
            .unwrap();
        session.tasks.add_collection("todo", None);

        let config = HarmonizerConfig::default();
        let lock = CollectionLock::from_config(db.connection(), &config);
        assert!(lock.acquire(busy.id, "other-worker").unwrap());

        let report = ConcurrentScheduler::new(&path, &connector, config)
            .run_all("user-1")
            .unwrap();
        assert_eq!(report.failures(), 0);
        let collections = &report.accounts[0].collections;
        assert_eq!(collections.len(), 4);
        assert_eq!(report.accounts[0].totals().local_created, 3);
        let locked: Vec<CollectionId> = collections
            .iter()
            .filter(|collection| collection.outcome == CollectionOutcome::Locked)
            .map(|collection| collection.collection_id)
            .collect();
        assert_eq!(locked, vec![busy.id]);

        let entities = SqliteEntityRepository::<Contact>::new(db.connection());
        for collection in repo.list_by_service(account.id).unwrap() {
            if collection.kind == CollectionKind::Contacts {
                assert!(!collection.lock_held);
                assert!(collection.harmonized_on.is_some());
                assert_eq!(entities.list_by_collection(collection.id).unwrap().len(), 1);
            }
        }
        assert_eq!(
            repo.fetch(busy.id).unwrap().unwrap().lock_owner.as_deref(),
            Some("other-worker")
        );
    }

    #[test]
    fn run_all_skips_disabled_accounts() {
        let mut setup = setup();
        let services = SqliteServiceRepository::new(setup.db.connection());
        let disabled = services
            .create("user-1", "Archive", "memory://archive")
            .unwrap();
        services.set_enabled(disabled.id, false).unwrap();
        let unreachable = services
            .create("user-1", "Offline", "memory://offline")
            .unwrap();
        SqliteCollectionRepository::new(setup.db.connection())
            .confirm(unreachable.id, CollectionKind::Events, "cal", None)
            .unwrap();
        setup.connector.register(disabled.id, &MemorySession::default());

        let report = scheduler(&setup).run_all("user-1").unwrap();
        let served: Vec<ServiceId> = report
            .accounts
            .iter()
            .map(|account| account.service_id)
            .collect();
        assert_eq!(served, vec![setup.account.id, unreachable.id]);
        assert_eq!(report.failures(), 1);
        assert!(report.finished_on >= report.started_on);
    }

    #[test]
    fn pass_limit_bounds_the_loop() {
        let setup = setup();
        confirm(&setup, CollectionKind::Contacts, "ab");
        setup.session.contacts.add_collection("ab", None);
        setup
            .session
            .contacts
            .insert("ab", &Contact::named("Ada"))
            .unwrap();

        let config = HarmonizerConfig {
            max_passes: 1,
            ..HarmonizerConfig::default()
        };
        let report = Scheduler::new(setup.db.connection(), &setup.connector, config)
            .run(&setup.account);
        assert!(matches!(
            report.collections[0].outcome,
            CollectionOutcome::Harmonized { passes: 1, .. }
        ));
    }

    #[test]
    fn reports_serialize_with_status_tag() {
        let report = CollectionReport {
            collection_id: CollectionId(3),
            kind: CollectionKind::Tasks,
            external_id: Some("todo".into()),
            outcome: CollectionOutcome::Locked,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "locked");
        assert_eq!(json["kind"], "tasks");
    }
}
