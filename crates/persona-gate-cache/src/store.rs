// persona-gate-cache/src/store.rs
// ============================================================================
// Module: TTL Key-Value Store
// Description: Cache abstraction with an in-process implementation.
// Purpose: Share ephemeral state across workers behind a narrow interface.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The [`TtlCache`] trait is the only seam the rest of the platform caches
//! through. The in-process implementation evicts lazily on read and sweeps
//! expired entries on write; a Redis-backed implementation can replace it
//! without touching callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entry count above which a write triggers an expired-entry sweep.
const SWEEP_THRESHOLD: usize = 4_096;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Shared TTL key-value store.
pub trait TtlCache: Send + Sync {
    /// Returns the live value for a key, if present and unexpired.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value under a key with the given time to live.
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Removes a key; returns whether a live entry was removed.
    fn delete(&self, key: &str) -> bool;
}

// ============================================================================
// SECTION: In-Memory Implementation
// ============================================================================

/// One cached value with its expiry instant.
struct CacheEntry {
    /// Cached value.
    value: String,
    /// Instant the entry expires at.
    expires_at: Instant,
}

/// In-process TTL cache.
#[derive(Default)]
pub struct InMemoryTtlCache {
    /// Entries keyed by namespaced cache key.
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryTtlCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes expired entries when the map grows past the sweep threshold.
    fn sweep_if_needed(entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }
    }
}

impl TtlCache for InMemoryTtlCache {
    fn get(&self, key: &str) -> Option<String> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        Self::sweep_if_needed(&mut entries, now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    fn delete(&self, key: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let now = Instant::now();
        entries.remove(key).is_some_and(|entry| entry.expires_at > now)
    }
}
