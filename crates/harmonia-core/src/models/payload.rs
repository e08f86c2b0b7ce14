//! Domain payload contract

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CollectionKind;
use crate::error::Result;
use crate::signature;

/// A typed domain record (contact, event or task) carried by an entity.
///
/// Implementations separate server-assigned bookkeeping (remote id,
/// timestamps) from content so that signatures only change when content
/// changes.
pub trait Payload: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + 'static {
    /// Collection kind holding this payload
    const KIND: CollectionKind;

    /// Server-assigned identifier, if any.
    fn remote_id(&self) -> Option<&str>;

    /// Replace the server-assigned identifier.
    fn set_remote_id(&mut self, id: Option<String>);

    /// Last-modified timestamp reported by the server (Unix ms).
    fn modified_on(&self) -> Option<i64>;

    /// Stamp bookkeeping timestamps the way a server would on write.
    fn touch(&mut self, now: i64);

    /// Clear every field excluded from the signature.
    fn strip_bookkeeping(&mut self);

    /// Copy with bookkeeping cleared.
    fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        normalized.strip_bookkeeping();
        normalized
    }

    /// Content signature of the normalized payload.
    fn signature(&self) -> Result<String> {
        signature::generate(self)
    }
}
