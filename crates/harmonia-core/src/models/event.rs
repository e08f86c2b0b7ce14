//! Event payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Payload};

/// Participation status of an attendee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
}

/// Attendee of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventAttendee {
    pub address: String,
    pub name: Option<String>,
    pub status: Option<AttendeeStatus>,
}

/// A calendar event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Server-assigned identifier
    pub id: Option<String>,
    /// Server creation timestamp (Unix ms)
    pub created_on: Option<i64>,
    /// Server modification timestamp (Unix ms)
    pub modified_on: Option<i64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_on: Option<DateTime<Utc>>,
    pub ends_on: Option<DateTime<Utc>>,
    pub all_day: bool,
    /// IANA time zone the event was authored in
    pub timezone: Option<String>,
    pub attendees: Vec<EventAttendee>,
    /// Recurrence rule in RRULE syntax
    pub recurrence: Option<String>,
}

impl Payload for Event {
    const KIND: CollectionKind = CollectionKind::Events;

    fn remote_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_remote_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn modified_on(&self) -> Option<i64> {
        self.modified_on
    }

    fn touch(&mut self, now: i64) {
        self.created_on.get_or_insert(now);
        self.modified_on = Some(now);
    }

    fn strip_bookkeeping(&mut self) {
        self.id = None;
        self.created_on = None;
        self.modified_on = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendee_status_changes_signature() {
        let mut event = Event {
            summary: Some("Planning".to_string()),
            attendees: vec![EventAttendee {
                address: "grace@example.com".to_string(),
                name: None,
                status: Some(AttendeeStatus::NeedsAction),
            }],
            ..Event::default()
        };
        let before = event.signature().unwrap();
        event.attendees[0].status = Some(AttendeeStatus::Accepted);
        assert_ne!(before, event.signature().unwrap());
    }
}
