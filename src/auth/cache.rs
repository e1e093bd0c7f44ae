//! Freshness rules for callers that keep a resolved session around.
//!
//! Nothing is cached here; callers own the entry and pass it back in.

use chrono::{DateTime, Utc};

/// A value and the time it was fetched
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self { value, fetched_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }

    /// Fresh while younger than `max_age`; entries from the future count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.age(now) < max_age
    }
}

/// How a caller wants a cached value treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Always refetch
    Force,
    /// Refetch only when the entry is at least this old
    IfOlderThan(chrono::Duration),
}

impl RefreshMode {
    pub fn needs_refresh<T>(&self, entry: Option<&CacheEntry<T>>, now: DateTime<Utc>) -> bool {
        match (self, entry) {
            (RefreshMode::Force, _) | (_, None) => true,
            (RefreshMode::IfOlderThan(max_age), Some(entry)) => !entry.is_fresh(now, *max_age),
        }
    }
}
