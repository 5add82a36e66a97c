//! Degraded-mode cache: last good payload per tool/resource.
//!
//! Read dispatches record every success here and fall back to the cached
//! payload when the backend is unreachable, tagged with how stale it is.
//! Action dispatches never touch this cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// Default entry bound; the oldest entry is evicted past it.
pub const DEFAULT_CAPACITY: usize = 4096;

struct Entry {
    payload: Value,
    recorded_at: Instant,
}

/// Process-wide last-known-good store, keyed by `tool:resource`.
pub struct DegradedCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl DegradedCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Store a fresh payload, overwriting any previous entry for the key.
    pub fn record(&self, key: &str, payload: Value) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.recorded_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(key = %oldest, "evicting oldest degraded-cache entry");
                let _ = entries.remove(&oldest);
            }
        }
        let _ = entries.insert(
            key.to_owned(),
            Entry {
                payload,
                recorded_at: Instant::now(),
            },
        );
    }

    /// Last payload for the key, with its non-negative staleness.
    #[must_use]
    pub fn fetch(&self, key: &str) -> Option<(Value, Duration)> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .map(|entry| (entry.payload.clone(), entry.recorded_at.elapsed()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DegradedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
