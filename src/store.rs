//! In-memory entry storage for a single cache instance.
//!
//! `Store` is a hash map of [`CacheEntry`] values plus the bookkeeping for
//! expiry, capacity eviction and versioning. It does no locking of its own.
//! The owning [`CacheInstance`](crate::CacheInstance) wraps it in an `RwLock`:
//!
//! - shared access: [`lookup`](Store::lookup), [`peek`](Store::peek). A lookup
//!   touches the entry through atomics only.
//! - exclusive access: insert, remove and expiry purges.
//!
//! # Eviction
//!
//! When a capacity is configured and a new key arrives at a full store, one
//! entry is removed first. An already expired entry is preferred. Otherwise
//! the entry with the smallest access tick (least recently used) is chosen. The
//! scan is linear in the number of entries.

use core::borrow::Borrow;
use core::hash::Hash;
use core::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

use crate::config::Expiry;
use crate::entry::CacheEntry;

/// Result of a read.
#[derive(Debug)]
pub(crate) enum Lookup<V> {
    /// Live entry with its value and version.
    Hit(Arc<V>, u64),
    /// The key is present but expired. It must be treated as absent.
    Expired,
    /// The key is absent.
    Miss,
}

/// What an insert or removal found under the key beforehand.
#[derive(Debug)]
pub(crate) enum Previous<V> {
    /// Nothing.
    Absent,
    /// A live value.
    Live(Arc<V>),
    /// A value that had already expired.
    Expired(Arc<V>),
}

impl<V> Previous<V> {
    /// The previous value if it was live.
    pub(crate) fn live(&self) -> Option<&Arc<V>> {
        match self {
            Previous::Live(v) => Some(v),
            _ => None,
        }
    }
}

/// Why an entry was removed to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalCause {
    Expired,
    Evicted,
}

/// Outcome of [`Store::insert`].
#[derive(Debug)]
pub(crate) struct Inserted<K, V> {
    pub(crate) version: u64,
    pub(crate) previous: Previous<V>,
    pub(crate) displaced: Option<(K, Arc<V>, RemovalCause)>,
}

pub(crate) struct Store<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    expiry: Expiry,
    capacity: Option<NonZeroUsize>,
    ticks: AtomicU64,
    version: u64,
}

impl<K: Hash + Eq + Clone, V> Store<K, V> {
    pub(crate) fn new(expiry: Expiry, capacity: Option<NonZeroUsize>) -> Self {
        let map = match capacity {
            Some(cap) => HashMap::with_capacity(cap.get()),
            None => HashMap::new(),
        };
        Self {
            map,
            expiry,
            capacity,
            ticks: AtomicU64::new(0),
            version: 0,
        }
    }

    #[inline]
    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Reads `key`, touching the entry if it is live.
    pub(crate) fn lookup<Q>(&self, key: &Q, now: u64) -> Lookup<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.map.get(key) {
            None => Lookup::Miss,
            Some(entry) if entry.is_expired(&self.expiry, now) => Lookup::Expired,
            Some(entry) => {
                entry.touch(now, self.next_tick());
                Lookup::Hit(Arc::clone(entry.value()), entry.version())
            }
        }
    }

    /// Reads `key` without touching it. Expired entries read as absent.
    pub(crate) fn peek<Q>(&self, key: &Q, now: u64) -> Option<(&Arc<V>, u64)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map
            .get(key)
            .filter(|e| !e.is_expired(&self.expiry, now))
            .map(|e| (e.value(), e.version()))
    }

    /// Stores `value` under `key`.
    ///
    /// Updating a live entry keeps its creation time. Replacing an expired
    /// entry creates a fresh one.
    pub(crate) fn insert(&mut self, key: K, value: Arc<V>, now: u64) -> Inserted<K, V> {
        let tick = self.next_tick();
        let version = self.next_version();

        if let Some(entry) = self.map.get_mut(&key) {
            if entry.is_expired(&self.expiry, now) {
                let fresh = CacheEntry::new(value, now, tick, version);
                let old = core::mem::replace(entry, fresh);
                return Inserted {
                    version,
                    previous: Previous::Expired(Arc::clone(old.value())),
                    displaced: None,
                };
            }
            let old = entry.update(value, now, tick, version);
            return Inserted {
                version,
                previous: Previous::Live(old),
                displaced: None,
            };
        }

        let displaced = match self.capacity {
            Some(cap) if self.map.len() >= cap.get() => self.make_room(now),
            _ => None,
        };
        self.map
            .insert(key, CacheEntry::new(value, now, tick, version));
        Inserted {
            version,
            previous: Previous::Absent,
            displaced,
        }
    }

    fn make_room(&mut self, now: u64) -> Option<(K, Arc<V>, RemovalCause)> {
        let mut victim: Option<(&K, u64)> = None;
        let mut expired: Option<&K> = None;
        for (k, e) in self.map.iter() {
            if e.is_expired(&self.expiry, now) {
                expired = Some(k);
                break;
            }
            let tick = e.access_tick();
            if victim.map_or(true, |(_, t)| tick < t) {
                victim = Some((k, tick));
            }
        }
        let (key, cause) = match expired {
            Some(k) => (k.clone(), RemovalCause::Expired),
            None => (victim?.0.clone(), RemovalCause::Evicted),
        };
        let entry = self.map.remove(&key)?;
        Some((key, Arc::clone(entry.value()), cause))
    }

    /// Removes `key`, reporting whether it was live or expired.
    pub(crate) fn remove<Q>(&mut self, key: &Q, now: u64) -> Previous<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.map.remove(key) {
            None => Previous::Absent,
            Some(e) if e.is_expired(&self.expiry, now) => Previous::Expired(Arc::clone(e.value())),
            Some(e) => Previous::Live(Arc::clone(e.value())),
        }
    }

    /// Removes `key` only if it is still expired at `now`.
    pub(crate) fn remove_if_expired<Q>(&mut self, key: &Q, now: u64) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let expired = self
            .map
            .get(key)
            .is_some_and(|e| e.is_expired(&self.expiry, now));
        if expired {
            self.map.remove(key).map(|e| Arc::clone(e.value()))
        } else {
            None
        }
    }

    /// Removes every expired entry.
    pub(crate) fn drain_expired(&mut self, now: u64) -> Vec<(K, Arc<V>)> {
        let expiry = self.expiry;
        let keys: Vec<K> = self
            .map
            .iter()
            .filter(|(_, e)| e.is_expired(&expiry, now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| {
                let entry = self.map.remove(&k)?;
                Some((k, Arc::clone(entry.value())))
            })
            .collect()
    }

    /// Keys of live entries.
    pub(crate) fn live_keys(&self, now: u64) -> Vec<K> {
        self.map
            .iter()
            .filter(|(_, e)| !e.is_expired(&self.expiry, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of live entries.
    pub(crate) fn live_len(&self, now: u64) -> usize {
        self.map
            .values()
            .filter(|e| !e.is_expired(&self.expiry, now))
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Duration, ExpiryType};

    fn expiry(nanos: u64) -> Expiry {
        Expiry::new(
            ExpiryType::Modified,
            Duration::Finite(std::time::Duration::from_nanos(nanos)),
        )
    }

    fn hit<V: Copy>(lookup: Lookup<V>) -> Option<V> {
        match lookup {
            Lookup::Hit(v, _) => Some(*v),
            _ => None,
        }
    }

    #[test]
    fn test_insert_lookup_remove() {
        let mut store: Store<&str, i32> = Store::new(Expiry::default(), None);
        assert!(matches!(store.insert("a", Arc::new(1), 0).previous, Previous::Absent));
        assert_eq!(hit(store.lookup("a", 1)), Some(1));

        let inserted = store.insert("a", Arc::new(2), 2);
        assert_eq!(inserted.previous.live().map(|v| **v), Some(1));
        assert_eq!(hit(store.lookup("a", 3)), Some(2));

        assert!(matches!(store.remove("a", 4), Previous::Live(_)));
        assert!(matches!(store.lookup("a", 5), Lookup::Miss));
        assert!(matches!(store.remove("a", 6), Previous::Absent));
    }

    #[test]
    fn test_versions_increase_on_write() {
        let mut store: Store<&str, i32> = Store::new(Expiry::default(), None);
        store.insert("a", Arc::new(1), 0);
        let v1 = store.peek("a", 0).map(|(_, v)| v).unwrap();
        store.insert("a", Arc::new(2), 0);
        let v2 = store.peek("a", 0).map(|(_, v)| v).unwrap();
        assert!(v2 > v1);
    }

    #[test]
    fn test_expired_entries_read_as_absent() {
        let mut store: Store<&str, i32> = Store::new(expiry(10), None);
        store.insert("a", Arc::new(1), 0);
        assert_eq!(hit(store.lookup("a", 9)), Some(1));
        assert!(matches!(store.lookup("a", 10), Lookup::Expired));
        assert!(store.peek("a", 10).is_none());
        assert_eq!(store.live_len(10), 0);

        assert_eq!(store.remove_if_expired("a", 5), None);
        assert_eq!(store.remove_if_expired("a", 10).map(|v| *v), Some(1));
    }

    #[test]
    fn test_insert_over_expired_is_fresh() {
        let mut store: Store<&str, i32> = Store::new(expiry(10), None);
        store.insert("a", Arc::new(1), 0);
        let inserted = store.insert("a", Arc::new(2), 20);
        assert!(matches!(inserted.previous, Previous::Expired(_)));
        assert_eq!(hit(store.lookup("a", 29)), Some(2));
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut store: Store<i32, i32> = Store::new(Expiry::default(), NonZeroUsize::new(3));
        store.insert(1, Arc::new(10), 0);
        store.insert(2, Arc::new(20), 0);
        store.insert(3, Arc::new(30), 0);

        // Touch 1 so that 2 becomes the oldest
        assert_eq!(hit(store.lookup(&1, 0)), Some(10));

        let inserted = store.insert(4, Arc::new(40), 0);
        let (key, value, cause) = inserted.displaced.unwrap();
        assert_eq!((key, *value, cause), (2, 20, RemovalCause::Evicted));
        assert_eq!(store.live_len(0), 3);
        assert!(matches!(store.lookup(&2, 0), Lookup::Miss));
    }

    #[test]
    fn test_capacity_prefers_expired_victim() {
        let mut store: Store<i32, i32> = Store::new(expiry(10), NonZeroUsize::new(2));
        store.insert(1, Arc::new(10), 0);
        store.insert(2, Arc::new(20), 8);
        let inserted = store.insert(3, Arc::new(30), 12);
        let (key, _, cause) = inserted.displaced.unwrap();
        assert_eq!((key, cause), (1, RemovalCause::Expired));
    }

    #[test]
    fn test_drain_expired() {
        let mut store: Store<i32, i32> = Store::new(expiry(10), None);
        store.insert(1, Arc::new(10), 0);
        store.insert(2, Arc::new(20), 5);
        store.insert(3, Arc::new(30), 20);
        let mut drained: Vec<i32> = store.drain_expired(15).into_iter().map(|(k, _)| k).collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(store.live_keys(15), vec![3]);
    }
}
