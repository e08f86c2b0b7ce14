//! Shared utility functions used across multiple modules.

use std::fmt::Write as _;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for stored error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identifier used as the lock owner for this process and thread.
pub fn default_lock_owner() -> String {
    let mut owner = format!("pid:{}", std::process::id());
    let _ = write!(owner, "/{:?}", std::thread::current().id());
    owner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" addressbook-1 ".to_string())),
            Some("addressbook-1".to_string())
        );
    }

    #[test]
    fn compact_text_truncates() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
    }

    #[test]
    fn lock_owner_names_process() {
        assert!(default_lock_owner().starts_with(&format!("pid:{}", std::process::id())));
    }
}
