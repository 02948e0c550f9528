//! Staleness of stored entries.
//!
//! Fails safe toward re-fetching: an entry without a readable capture time is
//! always expired.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::StoredEntry;

/// Policy signal for a stored entry. Stale entries may still be served when
/// the network is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

pub fn is_expired(entry: &StoredEntry, max_age: Duration) -> bool {
    is_expired_at(entry, max_age, Utc::now())
}

/// Age is `now - captured_at`; expired once the age exceeds `max_age`.
pub fn is_expired_at(entry: &StoredEntry, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some(captured_at) = entry.captured_at() else {
        return true;
    };

    // Capture times in the future (clock skew) count as age zero.
    let age = (now - captured_at).to_std().unwrap_or(Duration::ZERO);
    age > max_age
}

pub fn freshness(entry: &StoredEntry, max_age: Duration) -> Freshness {
    if is_expired(entry, max_age) { Freshness::Stale } else { Freshness::Fresh }
}
