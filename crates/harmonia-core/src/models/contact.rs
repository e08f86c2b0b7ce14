//! Contact payload

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Payload};

/// E-mail address of a contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactEmail {
    /// Label such as "work" or "home"
    pub kind: Option<String>,
    pub address: String,
    pub preferred: bool,
}

/// Phone number of a contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactPhone {
    pub kind: Option<String>,
    pub number: String,
    pub preferred: bool,
}

/// An address book entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    /// Server-assigned identifier
    pub id: Option<String>,
    /// Server creation timestamp (Unix ms)
    pub created_on: Option<i64>,
    /// Server modification timestamp (Unix ms)
    pub modified_on: Option<i64>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub emails: Vec<ContactEmail>,
    pub phones: Vec<ContactPhone>,
    pub birthday: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Contact {
    /// Contact with only a display name set
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }
}

impl Payload for Contact {
    const KIND: CollectionKind = CollectionKind::Contacts;

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
    fn signature_ignores_bookkeeping() {
        let local = Contact::named("Ada Lovelace");
        let mut remote = local.clone();
        remote.id = Some("c-17".to_string());
        remote.touch(1_700_000_000_000);

        assert_eq!(local.signature().unwrap(), remote.signature().unwrap());
    }

    #[test]
    fn signature_tracks_content() {
        let mut contact = Contact::named("Ada Lovelace");
        let before = contact.signature().unwrap();
        contact.emails.push(ContactEmail {
            kind: Some("work".to_string()),
            address: "ada@example.com".to_string(),
            preferred: true,
        });
        assert_ne!(before, contact.signature().unwrap());
    }

    #[test]
    fn deserializes_sparse_json() {
        let contact: Contact = serde_json::from_str(r#"{ "given_name": "Grace" }"#).unwrap();
        assert_eq!(contact.given_name.as_deref(), Some("Grace"));
        assert!(contact.emails.is_empty());
    }
}
