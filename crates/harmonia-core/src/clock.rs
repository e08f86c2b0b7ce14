//! Logical clock and chronicle cursors.
//!
//! Chronicle entries are stamped with microseconds since the Unix epoch. The
//! clock never hands out the same value twice within a process, and callers
//! pass the collection's current apex as a floor so entries written by other
//! processes sharing the database are never overtaken.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_TICK: AtomicI64 = AtomicI64::new(0);

/// Next clock value, strictly greater than every previous tick and `floor`.
pub fn tick_after(floor: i64) -> i64 {
    let now = chrono::Utc::now().timestamp_micros();
    let mut last = LAST_TICK.load(Ordering::Acquire);
    loop {
        let next = now.max(last.saturating_add(1)).max(floor.saturating_add(1));
        match LAST_TICK.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Opaque position in a collection's chronicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(i64);

impl Cursor {
    /// Position before any entry; decoding it means "initial sync".
    pub const ORIGIN: Self = Self(0);

    pub const fn from_clock(clock: i64) -> Self {
        Self(clock)
    }

    pub const fn clock(self) -> i64 {
        self.0
    }

    pub const fn is_origin(self) -> bool {
        self.0 <= 0
    }

    /// Encode for storage on the collection row.
    pub fn encode(self) -> String {
        self.0.to_string()
    }

    /// Decode a stored cursor.
    ///
    /// Empty, malformed and non-positive values decode to `None`, which
    /// callers treat as a request for a full initial sync.
    pub fn decode(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(clock) if clock > 0 => Some(Self(clock)),
            Ok(_) => None,
            Err(_) => {
                tracing::warn!("Discarding undecodable chronicle cursor {raw:?}");
                None
            }
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
