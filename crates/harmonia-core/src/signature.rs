//! Content signatures.
//!
//! A signature is the hex SHA-256 of the canonical JSON encoding of a payload
//! with its bookkeeping fields cleared. Payloads are plain structs with
//! `Vec`/`Option` fields, so serde emits fields in declaration order and the
//! encoding is deterministic.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::Payload;

/// Signature of a payload's normalized content.
pub fn generate<P: Payload>(payload: &P) -> Result<String> {
    let canonical = serde_json::to_vec(&payload.normalized())?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Task, TaskStatus};

    #[test]
    fn signature_is_hex_sha256() {
        let signature = generate(&Task::default()).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic_and_content_sensitive() {
        let mut task = Task {
            summary: Some("File taxes".to_string()),
            categories: vec!["admin".to_string()],
            ..Task::default()
        };
        assert_eq!(generate(&task).unwrap(), generate(&task.clone()).unwrap());

        let before = generate(&task).unwrap();
        task.status = TaskStatus::Completed;
        assert_ne!(before, generate(&task).unwrap());

        task.modified_on = Some(1);
        task.id = Some("remote-9".to_string());
        let after_bookkeeping = generate(&task).unwrap();
        task.modified_on = None;
        task.id = None;
        assert_eq!(after_bookkeeping, generate(&task).unwrap());
    }
}
