//! harmonia-core - Core library for Harmonia
//!
//! This crate contains the change chronicle, the correlation index, the
//! collection lock and the harmonization algorithm that keeps a local cache of
//! contacts, events and tasks consistent with a remote collaboration server.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod harmonize;
pub mod lock;
pub mod models;
pub mod remote;
pub mod scheduler;
pub mod signature;
pub mod util;

pub use config::{ConflictPolicy, HarmonizerConfig};
pub use error::{Error, Result};
pub use harmonize::{HarmonizationOutcome, Harmonizer};
pub use models::{
    Collection, CollectionId, CollectionKind, Contact, Entity, EntityId, Event,
    HarmonizationStatistics, Payload, ServiceAccount, ServiceId, Task,
};
pub use lock::CollectionLock;
pub use scheduler::{
    AccountReport, CollectionOutcome, CollectionReport, ConcurrentScheduler, RunReport, Scheduler,
};
