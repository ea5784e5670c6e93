//! Requesters waiting for an admin decision. Process-lifetime only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks pending requesters and when they became pending.
///
/// With a TTL, entries older than the TTL count as absent: the requester can
/// be prompted for again and a late decision for them is stale.
#[derive(Debug, Default)]
pub struct PendingTracker {
    entries: HashMap<i64, Instant>,
    ttl: Option<Duration>,
}

impl PendingTracker {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    fn is_live(&self, since: Instant, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(since) < ttl,
            None => true,
        }
    }

    pub fn contains(&self, id: i64, now: Instant) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|since| self.is_live(*since, now))
    }

    /// Registers `id` unless it is already live. Returns the registration
    /// instant when a new entry was created.
    pub fn register(&mut self, id: i64, now: Instant) -> Option<Instant> {
        if self.contains(id, now) {
            return None;
        }
        self.entries.insert(id, now);
        Some(now)
    }

    /// Removes `id` if it is live. Returns whether a live entry was removed.
    pub fn take(&mut self, id: i64, now: Instant) -> bool {
        let live = self.contains(id, now);
        self.entries.remove(&id);
        live
    }

    /// Removes `id` only if it is still the registration made at `since`.
    pub fn release(&mut self, id: i64, since: Instant) -> bool {
        if self.entries.get(&id) == Some(&since) {
            self.entries.remove(&id);
            return true;
        }
        false
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, since| match ttl {
            Some(ttl) => now.saturating_duration_since(*since) < ttl,
            None => true,
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
