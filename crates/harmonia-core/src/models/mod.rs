//! Data models for Harmonia

mod chronicle;
mod collection;
mod contact;
mod correlation;
mod entity;
mod event;
mod ids;
mod payload;
mod service;
mod statistics;
mod task;

pub use chronicle::{ChronicleDelta, ChronicleEntry, ChronicleOperation, ChronicleReference};
pub use collection::{Collection, CollectionKind};
pub use contact::{Contact, ContactEmail, ContactPhone};
pub use correlation::{Correlation, CorrelationDraft};
pub use entity::Entity;
pub use event::{AttendeeStatus, Event, EventAttendee};
pub use ids::{CollectionId, EntityId, ServiceId};
pub use payload::Payload;
pub use service::ServiceAccount;
pub use statistics::{HarmonizationStatistics, HarmonizationStatus};
pub use task::{Task, TaskStatus};
