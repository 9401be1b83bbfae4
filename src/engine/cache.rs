//! Latest known snapshot per station.
//!
//! Backed by `DashMap` so monitor loops, controllers and request handlers can
//! read concurrently. Every write replaces the whole entry, so a reader always
//! observes one complete snapshot.

use crate::station::StationSnapshot;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: StationSnapshot,
    /// Monotonic time of the last accepted put; `None` until the first one
    refreshed_at: Option<Instant>,
}

impl CacheEntry {
    fn unknown() -> Self {
        Self {
            snapshot: StationSnapshot::unknown(),
            refreshed_at: None,
        }
    }
}

/// Process-wide table of station id → latest accepted snapshot
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: DashMap<String, CacheEntry>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot for `station_id`. Unseen stations get an entry holding
    /// the unknown snapshot.
    pub fn get(&self, station_id: &str) -> StationSnapshot {
        self.entries
            .entry(station_id.to_string())
            .or_insert_with(CacheEntry::unknown)
            .snapshot
            .clone()
    }

    /// Replace the snapshot for `station_id` (last write wins)
    pub fn put(&self, station_id: &str, snapshot: StationSnapshot) {
        self.entries.insert(
            station_id.to_string(),
            CacheEntry {
                snapshot,
                refreshed_at: Some(Instant::now()),
            },
        );
    }

    /// Time since the last accepted put, or `None` if there never was one
    pub fn age(&self, station_id: &str) -> Option<Duration> {
        self.entries
            .get(station_id)
            .and_then(|e| e.refreshed_at)
            .map(|at| at.elapsed())
    }

    /// Snapshot if it was refreshed no longer than `max_age` ago
    pub fn fresh(&self, station_id: &str, max_age: Duration) -> Option<StationSnapshot> {
        let entry = self.entries.get(station_id)?;
        let refreshed_at = entry.refreshed_at?;
        (refreshed_at.elapsed() <= max_age).then(|| entry.snapshot.clone())
    }

    /// Identifiers of every station referenced so far
    pub fn station_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
