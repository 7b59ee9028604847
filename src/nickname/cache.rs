//! Short-lived nickname cache keyed by table surface.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::capture::TableSurface;

/// The nickname last resolved for a surface.
#[derive(Clone, Debug, PartialEq)]
pub struct NicknameCacheEntry {
    pub surface: TableSurface,
    pub nickname: String,
    pub resolved_at: Instant,
    /// Perceptual hash of the region the nickname was read from
    pub content_hash: String,
}

impl NicknameCacheEntry {
    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed()
    }
}

/// One entry per surface, shared between manual runs and the sweep.
///
/// All access goes through a single mutex.
pub struct NicknameCache {
    ttl: Duration,
    entries: Mutex<HashMap<TableSurface, NicknameCacheEntry>>,
}

impl NicknameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TableSurface, NicknameCacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the entry for `surface` if it is younger than the TTL.
    ///
    /// A stale entry is evicted on the way out.
    pub fn fresh(&self, surface: TableSurface) -> Option<NicknameCacheEntry> {
        let mut entries = self.lock();
        match entries.get(&surface) {
            Some(entry) if entry.age() < self.ttl => Some(entry.clone()),
            Some(_) => {
                entries.remove(&surface);
                None
            }
            None => None,
        }
    }

    /// Records a fresh resolution, replacing any previous entry.
    ///
    /// `resolved_at` never moves backwards for a surface: a slower concurrent
    /// resolution that started earlier does not overwrite a newer one.
    pub fn store(&self, entry: NicknameCacheEntry) {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&entry.surface) {
            if existing.resolved_at > entry.resolved_at {
                return;
            }
        }
        entries.insert(entry.surface, entry);
    }

    /// Drops the entry for one surface (e.g. after a failed stats lookup).
    pub fn invalidate(&self, surface: TableSurface) -> bool {
        self.lock().remove(&surface).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
        log::info!("Nickname cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(surface: isize, nickname: &str, resolved_at: Instant) -> NicknameCacheEntry {
        NicknameCacheEntry {
            surface: TableSurface(surface),
            nickname: nickname.to_string(),
            resolved_at,
            content_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_fresh_entry_is_returned() {
        let cache = NicknameCache::new(Duration::from_secs(60));
        cache.store(entry(1, "Hero77", Instant::now()));

        let found = cache.fresh(TableSurface(1)).unwrap();
        assert_eq!(found.nickname, "Hero77");
        assert!(cache.fresh(TableSurface(2)).is_none());
    }

    #[test]
    fn test_stale_entry_is_evicted() {
        let cache = NicknameCache::new(Duration::ZERO);
        cache.store(entry(1, "Hero77", Instant::now()));

        assert!(cache.fresh(TableSurface(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_keeps_newest_resolution() {
        let cache = NicknameCache::new(Duration::from_secs(60));
        let earlier = Instant::now();
        let later = earlier + Duration::from_millis(5);

        cache.store(entry(1, "Newer", later));
        cache.store(entry(1, "Older", earlier));

        assert_eq!(cache.fresh(TableSurface(1)).unwrap().nickname, "Newer");
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = NicknameCache::new(Duration::from_secs(60));
        cache.store(entry(1, "A", Instant::now()));
        cache.store(entry(2, "B", Instant::now()));

        assert!(cache.invalidate(TableSurface(1)));
        assert!(!cache.invalidate(TableSurface(1)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
