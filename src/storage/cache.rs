//! Last-known-good snapshot cache, one entry per instrument.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::types::Snapshot;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Stored exactly as fetched (`is_stale = false`).
    pub snapshot: Snapshot,
    pub stored_at: DateTime<Utc>,
}

/// In-memory snapshot cache. Entries are overwritten on every live fetch
/// and never evicted.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<String, CacheEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `instrument`.
    pub fn store(&mut self, instrument: &str, snapshot: Snapshot, now: DateTime<Utc>) {
        debug!(instrument, source = %snapshot.source, price = %snapshot.price, "Caching snapshot");
        self.entries.insert(
            instrument.to_string(),
            CacheEntry {
                snapshot,
                stored_at: now,
            },
        );
    }

    pub fn get(&self, instrument: &str) -> Option<&CacheEntry> {
        self.entries.get(instrument)
    }

    /// The cached snapshot flagged stale, carrying its original timestamp.
    pub fn stale_copy(&self, instrument: &str) -> Option<Snapshot> {
        self.entries.get(instrument).map(|e| e.snapshot.to_stale())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
