//! Stored cache entry.
//!
//! Each entry holds its value behind an `Arc` plus the timestamps expiry needs:
//!
//! - `create_time`: set once when the entry is stored
//! - `last_modified`: reset by every update
//! - `last_accessed`: reset by every read and write
//!
//! `last_accessed` and the LRU `access_tick` are atomics so a read can touch an
//! entry while holding only the store's shared lock. `version` is a
//! store-wide counter value assigned on every write. Transactions use it to
//! detect concurrent modification.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{Expiry, ExpiryType};

pub(crate) struct CacheEntry<V> {
    value: Arc<V>,
    create_time: u64,
    last_modified: u64,
    last_accessed: AtomicU64,
    access_tick: AtomicU64,
    version: u64,
}

impl<V> CacheEntry<V> {
    #[inline]
    pub(crate) fn new(value: Arc<V>, now: u64, tick: u64, version: u64) -> Self {
        Self {
            value,
            create_time: now,
            last_modified: now,
            last_accessed: AtomicU64::new(now),
            access_tick: AtomicU64::new(tick),
            version,
        }
    }

    #[inline]
    pub(crate) fn value(&self) -> &Arc<V> {
        &self.value
    }

    #[inline]
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub(crate) fn access_tick(&self) -> u64 {
        self.access_tick.load(Ordering::Relaxed)
    }

    /// Records a read at `now`. Timestamps never move backwards.
    #[inline]
    pub(crate) fn touch(&self, now: u64, tick: u64) {
        self.last_accessed.fetch_max(now, Ordering::Relaxed);
        self.access_tick.fetch_max(tick, Ordering::Relaxed);
    }

    /// Replaces the value, returning the previous one. `create_time` is kept.
    pub(crate) fn update(&mut self, value: Arc<V>, now: u64, tick: u64, version: u64) -> Arc<V> {
        self.last_modified = now;
        self.touch(now, tick);
        self.version = version;
        core::mem::replace(&mut self.value, value)
    }

    /// The timestamp `expiry_type` measures from.
    #[inline]
    pub(crate) fn tracked_time(&self, expiry_type: ExpiryType) -> u64 {
        match expiry_type {
            ExpiryType::Created => self.create_time,
            ExpiryType::Modified => self.last_modified,
            ExpiryType::Accessed => self.last_accessed.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn is_expired(&self, expiry: &Expiry, now: u64) -> bool {
        expiry.is_expired(self.tracked_time(expiry.expiry_type), now)
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("create_time", &self.create_time)
            .field("last_modified", &self.last_modified)
            .field("last_accessed", &self.last_accessed.load(Ordering::Relaxed))
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Duration;

    #[test]
    fn test_new_entry_timestamps() {
        let entry = CacheEntry::new(Arc::new(42), 100, 1, 7);
        assert_eq!(**entry.value(), 42);
        assert_eq!(entry.version(), 7);
        assert_eq!(entry.tracked_time(ExpiryType::Created), 100);
        assert_eq!(entry.tracked_time(ExpiryType::Modified), 100);
        assert_eq!(entry.tracked_time(ExpiryType::Accessed), 100);
    }

    #[test]
    fn test_touch_only_moves_access_time() {
        let entry = CacheEntry::new(Arc::new("v"), 100, 1, 1);
        entry.touch(250, 2);
        assert_eq!(entry.tracked_time(ExpiryType::Created), 100);
        assert_eq!(entry.tracked_time(ExpiryType::Modified), 100);
        assert_eq!(entry.tracked_time(ExpiryType::Accessed), 250);
        assert_eq!(entry.access_tick(), 2);

        // Stale readers never rewind the clock
        entry.touch(200, 1);
        assert_eq!(entry.tracked_time(ExpiryType::Accessed), 250);
        assert_eq!(entry.access_tick(), 2);
    }

    #[test]
    fn test_update_keeps_create_time() {
        let mut entry = CacheEntry::new(Arc::new(1), 100, 1, 1);
        let old = entry.update(Arc::new(2), 300, 5, 9);
        assert_eq!(*old, 1);
        assert_eq!(**entry.value(), 2);
        assert_eq!(entry.version(), 9);
        assert_eq!(entry.tracked_time(ExpiryType::Created), 100);
        assert_eq!(entry.tracked_time(ExpiryType::Modified), 300);
        assert_eq!(entry.tracked_time(ExpiryType::Accessed), 300);
    }

    #[test]
    fn test_expiry_by_type() {
        let mut entry = CacheEntry::new(Arc::new(1), 0, 1, 1);
        entry.update(Arc::new(2), 8, 2, 2);

        let created = Expiry::new(ExpiryType::Created, Duration::Finite(std::time::Duration::from_nanos(10)));
        let modified = Expiry::new(ExpiryType::Modified, Duration::Finite(std::time::Duration::from_nanos(10)));
        assert!(entry.is_expired(&created, 11));
        assert!(!entry.is_expired(&modified, 11));
        assert!(entry.is_expired(&modified, 18));
    }
}
