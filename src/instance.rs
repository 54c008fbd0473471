//! Runtime cache instance.
//!
//! A [`CacheInstance`] is created from a validated
//! [`CacheConfiguration`](crate::config::CacheConfiguration), normally by
//! [`CacheManager::build`](crate::CacheManager::build). It owns the entry
//! store, the listener dispatcher, the statistics block and the optional
//! expiry sweeper.
//!
//! # Lifecycle
//!
//! ```text
//!   Created ──start()──▶ Started ──stop()──▶ Stopped
//! ```
//!
//! Any other transition fails with [`CacheError::IllegalState`], and so does
//! any operation on a cache that is not `Started`. Every operation holds a
//! shared lifecycle guard for its whole duration, and `stop()` takes the guard
//! exclusively. Operations already in flight therefore finish against the
//! running cache, and operations that arrive later fail cleanly. A `stop()`
//! issued by a synchronous listener of the same cache is deferred until the
//! operation that notified it returns.
//!
//! # Locking
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ lifecycle: RwLock<Status>        shared by every operation        │
//! │ mutation:  ReentrantMutex<()>    one mutator at a time, held      │
//! │                                  across write-through, apply and  │
//! │                                  synchronous listener dispatch    │
//! │ store:     RwLock<Store>         reads shared, applies exclusive  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads only take the store's shared lock, so they never block each other.
//! The mutation lock is reentrant, so a synchronous listener may call back
//! into the cache on the same thread.
//!
//! # Write-through ordering
//!
//! The writer runs **before** the local mutation, with the mutation lock held.
//! If the writer fails, the local store is left unchanged and the caller gets
//! [`CacheError::Write`].

use core::fmt;
use core::hash::Hash;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::{Mutex, ReentrantMutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

#[cfg(feature = "hashbrown")]
use hashbrown::{HashMap, HashSet};

#[cfg(not(feature = "hashbrown"))]
use std::collections::{HashMap, HashSet};

use crate::clock::Clock;
use crate::config::CacheConfiguration;
use crate::dispatch::Dispatcher;
use crate::error::{BoxError, CacheError, Result};
use crate::event::{CacheEntryEvent, EventType};
use crate::metrics::{CacheMetrics, CacheStatistics, StatisticsSnapshot};
use crate::store::{Inserted, Lookup, Previous, RemovalCause, Store};
use crate::transaction::{PendingOp, Transaction};

/// Lifecycle state of a [`CacheInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Constructed but not yet started.
    Created,
    /// Serving operations.
    Started,
    /// Stopped. Terminal.
    Stopped,
}

struct Sweeper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

thread_local! {
    /// Caches whose lifecycle gate this thread holds, once per nesting level.
    static HELD_GATES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Shared lifecycle guard held for the duration of one operation.
///
/// A `stop()` requested while the same thread holds a gate on the cache runs
/// when the outermost gate is released.
struct Gate<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: &'a CacheInstance<K, V>,
    status: Option<RwLockReadGuard<'a, Status>>,
}

impl<K, V> Drop for Gate<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        drop(self.status.take());
        let id = self.cache.gate_id();
        let outermost = HELD_GATES.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&h| h == id) {
                held.swap_remove(pos);
            }
            !held.contains(&id)
        });
        if outermost && self.cache.stop_requested.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.cache.stop() {
                warn!("Deferred stop of cache {} failed: {}", self.cache.name, e);
            }
        }
    }
}

/// A named, running cache.
pub struct CacheInstance<K, V> {
    name: Arc<str>,
    config: CacheConfiguration<K, V>,
    clock: Arc<dyn Clock>,
    lifecycle: RwLock<Status>,
    mutation: ReentrantMutex<()>,
    store: RwLock<Store<K, V>>,
    dispatcher: Dispatcher<K, V>,
    statistics: CacheStatistics,
    sweeper: Mutex<Option<Sweeper>>,
    stop_requested: AtomicBool,
}

impl<K, V> CacheInstance<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache in the [`Status::Created`] state.
    pub fn new(name: &str, config: CacheConfiguration<K, V>, clock: Arc<dyn Clock>) -> Self {
        let name: Arc<str> = Arc::from(name);
        let store = Store::new(config.expiry(), config.capacity());
        let dispatcher = Dispatcher::new(Arc::clone(&name), config.listeners());
        Self {
            name,
            config,
            clock,
            lifecycle: RwLock::new(Status::Created),
            mutation: ReentrantMutex::new(()),
            store: RwLock::new(store),
            dispatcher,
            statistics: CacheStatistics::new(),
            sweeper: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated configuration this cache was built from.
    pub fn configuration(&self) -> &CacheConfiguration<K, V> {
        &self.config
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        *self.lifecycle.read_recursive()
    }

    /// Starts the cache: spawns the asynchronous event worker and, if
    /// configured, the expiry sweeper.
    ///
    /// # Errors
    ///
    /// [`CacheError::IllegalState`] unless the cache is `Created`, or
    /// [`CacheError::StartFailed`] if a worker thread could not be spawned. A
    /// cache that failed to start is left `Stopped`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut status = self.lifecycle.write();
        if *status != Status::Created {
            return Err(self.illegal_state(*status));
        }

        let started = self.dispatcher.start().and_then(|()| self.spawn_sweeper());
        if let Err(source) = started {
            self.dispatcher.stop();
            *status = Status::Stopped;
            return Err(CacheError::StartFailed {
                name: self.name.to_string(),
                source,
            });
        }

        *status = Status::Started;
        info!("Cache {} started", self.name);
        Ok(())
    }

    fn spawn_sweeper(self: &Arc<Self>) -> std::io::Result<()> {
        let Some(interval) = self.config.expiry_sweep_interval() else {
            return Ok(());
        };
        if self.config.expiry().duration.is_eternal() {
            return Ok(());
        }
        let (shutdown, signal) = bounded::<()>(0);
        let cache: Weak<Self> = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name(format!("cache-sweeper-{}", self.name))
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(cache) = cache.upgrade() else { break };
                        if let Ok(n) = cache.evict_expired() {
                            if n > 0 {
                                debug!("Sweeper removed {} expired entries from {}", n, cache.name);
                            }
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        *self.sweeper.lock() = Some(Sweeper { shutdown, handle });
        Ok(())
    }

    /// Stops the cache.
    ///
    /// Waits for in-flight operations, then stops the sweeper, drains pending
    /// asynchronous events, and drops all entries. Listeners are detached.
    ///
    /// Called from inside an operation on this cache (a synchronous listener
    /// stopping its own cache), the stop is recorded and carried out as soon as
    /// that operation returns. The cache stays `Started` until then.
    ///
    /// # Errors
    ///
    /// [`CacheError::IllegalState`] unless the cache is `Started`.
    pub fn stop(&self) -> Result<()> {
        if self.holds_gate() {
            self.stop_requested.store(true, Ordering::Release);
            debug!("Cache {} stops when the current operation returns", self.name);
            return Ok(());
        }
        {
            let mut status = self.lifecycle.write();
            if *status != Status::Started {
                return Err(self.illegal_state(*status));
            }
            *status = Status::Stopped;
        }

        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { shutdown, handle }) = sweeper {
            drop(shutdown);
            if handle.thread().id() == thread::current().id() {
                debug!("Expiry sweeper for cache {} stopped from its own thread", self.name);
            } else if handle.join().is_err() {
                warn!("Expiry sweeper for cache {} terminated abnormally", self.name);
            }
        }
        self.dispatcher.stop();
        self.store.write().clear();
        info!("Cache {} stopped", self.name);
        Ok(())
    }

    fn illegal_state(&self, status: Status) -> CacheError {
        CacheError::IllegalState {
            name: self.name.to_string(),
            status,
        }
    }

    /// Holds the lifecycle open for the duration of one operation.
    fn gate(&self) -> Result<Gate<'_, K, V>> {
        let status = self.lifecycle.read_recursive();
        if *status != Status::Started {
            return Err(self.illegal_state(*status));
        }
        HELD_GATES.with(|held| held.borrow_mut().push(self.gate_id()));
        Ok(Gate {
            cache: self,
            status: Some(status),
        })
    }

    #[inline]
    fn gate_id(&self) -> usize {
        self as *const Self as usize
    }

    fn holds_gate(&self) -> bool {
        let id = self.gate_id();
        HELD_GATES.with(|held| held.borrow().contains(&id))
    }

    #[inline]
    fn now(&self) -> u64 {
        self.clock.now_nanos()
    }

    #[inline]
    fn stats(&self) -> Option<&CacheStatistics> {
        self.config
            .is_statistics_enabled()
            .then_some(&self.statistics)
    }

    /// Applies store-by-value semantics to a value leaving the cache.
    #[inline]
    pub(crate) fn output(&self, value: Arc<V>) -> Arc<V> {
        if self.config.is_store_by_value() {
            Arc::new(V::clone(&value))
        } else {
            value
        }
    }

    fn emit(&self, event_type: EventType, key: K, old: Option<Arc<V>>, new: Option<Arc<V>>) {
        if !self.dispatcher.has_listeners() {
            return;
        }
        self.dispatcher.dispatch(CacheEntryEvent {
            cache_name: Arc::clone(&self.name),
            event_type,
            key,
            old_value: old,
            new_value: new,
        });
    }

    fn record_inserted(&self, inserted: &Inserted<K, V>) {
        let Some(stats) = self.stats() else { return };
        stats.record_put();
        if matches!(inserted.previous, Previous::Expired(_)) {
            stats.record_expiration();
        }
        match inserted.displaced {
            Some((_, _, RemovalCause::Evicted)) => stats.record_eviction(),
            Some((_, _, RemovalCause::Expired)) => stats.record_expiration(),
            None => {}
        }
    }

    fn emit_inserted(&self, key: K, value: Arc<V>, inserted: Inserted<K, V>) {
        if let Some((evicted_key, evicted, cause)) = inserted.displaced {
            let event_type = match cause {
                RemovalCause::Evicted => {
                    debug!("Evicted entry from cache {} to respect capacity", self.name);
                    EventType::Removed
                }
                RemovalCause::Expired => EventType::Expired,
            };
            self.emit(event_type, evicted_key, Some(evicted), None);
        }
        match inserted.previous {
            Previous::Absent => self.emit(EventType::Created, key, None, Some(value)),
            Previous::Live(old) => self.emit(EventType::Updated, key, Some(old), Some(value)),
            Previous::Expired(old) => {
                self.emit(EventType::Expired, key.clone(), Some(old), None);
                self.emit(EventType::Created, key, None, Some(value));
            }
        }
    }

    fn record_removed(&self, previous: &Previous<V>) {
        let Some(stats) = self.stats() else { return };
        match previous {
            Previous::Live(_) => stats.record_removal(),
            Previous::Expired(_) => stats.record_expiration(),
            Previous::Absent => {}
        }
    }

    fn emit_removed(&self, key: K, previous: Previous<V>) {
        match previous {
            Previous::Live(old) => self.emit(EventType::Removed, key, Some(old), None),
            Previous::Expired(old) => self.emit(EventType::Expired, key, Some(old), None),
            Previous::Absent => {}
        }
    }

    /// Stores locally and dispatches events. Caller holds the mutation lock.
    fn store_local(&self, key: K, value: Arc<V>) -> (Option<Arc<V>>, u64) {
        let inserted = {
            let mut store = self.store.write();
            let inserted = store.insert(key.clone(), Arc::clone(&value), self.now());
            self.record_inserted(&inserted);
            inserted
        };
        let version = inserted.version;
        let previous = inserted.previous.live().cloned();
        self.emit_inserted(key, value, inserted);
        (previous, version)
    }

    /// Removes locally and dispatches events. Caller holds the mutation lock.
    fn remove_local(&self, key: &K) -> Option<Arc<V>> {
        let previous = {
            let mut store = self.store.write();
            let previous = store.remove(key, self.now());
            self.record_removed(&previous);
            previous
        };
        let removed = previous.live().cloned();
        self.emit_removed(key.clone(), previous);
        removed
    }

    fn write_through(&self, key: &K, value: &V) -> Result<()> {
        if !self.config.is_write_through() {
            return Ok(());
        }
        let Some(writer) = self.config.writer() else {
            return Ok(());
        };
        writer.write(key, value).map_err(|source| {
            if let Some(stats) = self.stats() {
                stats.record_write_failure();
            }
            warn!("Cache writer failed for cache {}: {}", self.name, source);
            CacheError::Write { source }
        })
    }

    fn delete_through(&self, key: &K) -> Result<()> {
        if !self.config.is_write_through() {
            return Ok(());
        }
        let Some(writer) = self.config.writer() else {
            return Ok(());
        };
        writer.delete(key).map_err(|source| {
            if let Some(stats) = self.stats() {
                stats.record_write_failure();
            }
            warn!("Cache writer delete failed for cache {}: {}", self.name, source);
            CacheError::Write { source }
        })
    }

    fn remove_if_expired(&self, key: &K) {
        let _mutation = self.mutation.lock();
        let removed = {
            let mut store = self.store.write();
            let removed = store.remove_if_expired(key, self.now());
            if removed.is_some() {
                if let Some(stats) = self.stats() {
                    stats.record_expiration();
                }
            }
            removed
        };
        if let Some(old) = removed {
            debug!("Removed expired entry from cache {}", self.name);
            self.emit(EventType::Expired, key.clone(), Some(old), None);
        }
    }

    fn load(&self, key: &K) -> Result<Option<(Arc<V>, u64)>> {
        let _mutation = self.mutation.lock();

        // Another caller may have loaded it while we waited for the lock
        let existing = self
            .store
            .read()
            .peek(key, self.now())
            .map(|(v, version)| (Arc::clone(v), version));
        if existing.is_some() {
            return Ok(existing);
        }

        let Some(loader) = self.config.loader() else {
            return Ok(None);
        };
        match loader.load(key) {
            Ok(Some(value)) => {
                if let Some(stats) = self.stats() {
                    stats.record_load();
                }
                debug!("Loaded entry into cache {}", self.name);
                let value = Arc::new(value);
                let (_, version) = self.store_local(key.clone(), Arc::clone(&value));
                Ok(Some((value, version)))
            }
            Ok(None) => Ok(None),
            Err(source) => Err(self.load_failed(source)),
        }
    }

    /// Loads the keys of `keys` whose slot in `values` is empty with a single
    /// `load_all` call. Keys loaded meanwhile by another caller are taken from
    /// the store instead.
    fn load_missing(&self, keys: &[K], values: &[Option<Arc<V>>]) -> Result<HashMap<K, Arc<V>>> {
        let _mutation = self.mutation.lock();
        let mut found = HashMap::new();
        let mut pending = Vec::new();
        {
            let store = self.store.read();
            let now = self.now();
            let mut seen = HashSet::new();
            for (key, value) in keys.iter().zip(values) {
                if value.is_some() || !seen.insert(key) {
                    continue;
                }
                match store.peek(key, now) {
                    Some((v, _)) => {
                        found.insert(key.clone(), Arc::clone(v));
                    }
                    None => pending.push(key.clone()),
                }
            }
        }

        let Some(loader) = self.config.loader() else {
            return Ok(found);
        };
        if pending.is_empty() {
            return Ok(found);
        }
        let loaded = loader
            .load_all(&pending)
            .map_err(|source| self.load_failed(source))?;

        let mut count = 0usize;
        for (key, value) in loaded {
            let Some(value) = value else { continue };
            if let Some(stats) = self.stats() {
                stats.record_load();
            }
            let value = Arc::new(value);
            self.store_local(key.clone(), Arc::clone(&value));
            found.insert(key, value);
            count += 1;
        }
        debug!("Loaded {} of {} entries into cache {}", count, pending.len(), self.name);
        Ok(found)
    }

    fn load_failed(&self, source: BoxError) -> CacheError {
        if let Some(stats) = self.stats() {
            stats.record_load_failure();
        }
        warn!("Cache loader failed for cache {}: {}", self.name, source);
        CacheError::Load { source }
    }

    /// Reads the stored value for `key`, counting a hit or miss. An expired
    /// entry is removed and reads as a miss. Caller holds the gate.
    fn read_stored(&self, key: &K) -> Option<(Arc<V>, u64)> {
        let lookup = {
            let store = self.store.read();
            let lookup = store.lookup(key, self.now());
            if let Some(stats) = self.stats() {
                match lookup {
                    Lookup::Hit(..) => stats.record_hit(),
                    Lookup::Expired | Lookup::Miss => stats.record_miss(),
                }
            }
            lookup
        };

        match lookup {
            Lookup::Hit(value, version) => Some((value, version)),
            Lookup::Expired => {
                self.remove_if_expired(key);
                None
            }
            Lookup::Miss => None,
        }
    }

    /// Reads `key` with expiry, statistics and read-through applied. Returns
    /// the stored value (not copied) and its version.
    pub(crate) fn read_versioned(&self, key: &K) -> Result<Option<(Arc<V>, u64)>> {
        let _gate = self.gate()?;
        if let Some(found) = self.read_stored(key) {
            return Ok(Some(found));
        }
        if self.config.is_read_through() {
            self.load(key)
        } else {
            Ok(None)
        }
    }

    /// Version of the live entry under `key`, without touching it.
    pub(crate) fn current_version(&self, key: &K) -> Result<Option<u64>> {
        let _gate = self.gate()?;
        Ok(self.store.read().peek(key, self.now()).map(|(_, v)| v))
    }

    /// Returns the value for `key`.
    ///
    /// An expired entry is never returned. On a miss with read-through
    /// enabled, the loader is invoked and its value cached.
    ///
    /// # Errors
    ///
    /// [`CacheError::Load`] if the loader fails. Nothing is cached then.
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>> {
        Ok(self.read_versioned(key)?.map(|(v, _)| self.output(v)))
    }

    /// Returns the entries found for `keys`, in the order given. Missing keys
    /// are skipped.
    ///
    /// With read-through, all misses are loaded with one
    /// [`CacheLoader::load_all`](crate::loader::CacheLoader::load_all) call.
    ///
    /// # Errors
    ///
    /// [`CacheError::Load`] if the loader fails. Nothing is cached then.
    pub fn get_all(&self, keys: &[K]) -> Result<Vec<(K, Arc<V>)>> {
        let _gate = self.gate()?;
        let mut values: Vec<Option<Arc<V>>> = keys
            .iter()
            .map(|key| self.read_stored(key).map(|(value, _)| value))
            .collect();

        if self.config.is_read_through() && values.iter().any(Option::is_none) {
            let loaded = self.load_missing(keys, &values)?;
            for (key, value) in keys.iter().zip(values.iter_mut()) {
                if value.is_none() {
                    *value = loaded.get(key).cloned();
                }
            }
        }

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), self.output(v))))
            .collect())
    }

    /// Returns `true` if a live entry exists. Does not load, touch, or count.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let _gate = self.gate()?;
        Ok(self.store.read().peek(key, self.now()).is_some())
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Write`] if write-through fails. The local cache is left unchanged then.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.get_and_put(key, value).map(|_| ())
    }

    /// Stores `value` and returns the previous live value.
    pub fn get_and_put(&self, key: K, value: V) -> Result<Option<Arc<V>>> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        self.write_through(&key, &value)?;
        let (previous, _) = self.store_local(key, Arc::new(value));
        Ok(previous.map(|v| self.output(v)))
    }

    /// Stores `value` only if no live entry exists. Returns whether it was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<bool> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        if self.store.read().peek(&key, self.now()).is_some() {
            return Ok(false);
        }
        self.write_through(&key, &value)?;
        self.store_local(key, Arc::new(value));
        Ok(true)
    }

    /// Replaces the value only if a live entry exists. Returns whether it was replaced.
    pub fn replace(&self, key: K, value: V) -> Result<bool> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        if self.store.read().peek(&key, self.now()).is_none() {
            return Ok(false);
        }
        self.write_through(&key, &value)?;
        self.store_local(key, Arc::new(value));
        Ok(true)
    }

    /// Removes `key`. Returns whether a live entry was removed.
    ///
    /// With write-through the writer's `delete` is called even if the key is
    /// not cached locally.
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.get_and_remove(key).map(|v| v.is_some())
    }

    /// Removes `key` and returns the live value it held.
    pub fn get_and_remove(&self, key: &K) -> Result<Option<Arc<V>>> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        self.delete_through(key)?;
        Ok(self.remove_local(key).map(|v| self.output(v)))
    }

    /// Removes every live entry, calling the writer for each.
    ///
    /// Stops at the first writer failure. Entries removed before it stay removed.
    pub fn remove_all(&self) -> Result<()> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        let keys = self.store.read().live_keys(self.now());
        for key in keys {
            self.delete_through(&key)?;
            self.remove_local(&key);
        }
        Ok(())
    }

    /// Drops every entry locally. No writer calls, no events, no statistics.
    pub fn clear(&self) -> Result<()> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        self.store.write().clear();
        Ok(())
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let _gate = self.gate()?;
        Ok(self.store.read().live_len(self.now()))
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Removes all expired entries now. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();
        let expired = {
            let mut store = self.store.write();
            let expired = store.drain_expired(self.now());
            if let Some(stats) = self.stats() {
                for _ in &expired {
                    stats.record_expiration();
                }
            }
            expired
        };
        let count = expired.len();
        for (key, old) in expired {
            self.emit(EventType::Expired, key, Some(old), None);
        }
        Ok(count)
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// [`CacheError::TransactionsDisabled`] if the cache was configured without
    /// transactions, or [`CacheError::IllegalState`] if it is not started.
    pub fn begin(&self) -> Result<Transaction<'_, K, V>> {
        let _gate = self.gate()?;
        let settings = self
            .config
            .transaction_settings()
            .ok_or_else(|| CacheError::TransactionsDisabled {
                name: self.name.to_string(),
            })?;
        Ok(Transaction::new(self, settings))
    }

    /// Applies a transaction's buffered operations atomically.
    ///
    /// With `observed` versions present, the commit fails with
    /// [`CacheError::TransactionConflict`] if any of them changed. Write-through
    /// runs for every operation, in order, before anything is applied locally.
    /// If the writer rejects an operation, the operations it already accepted
    /// are still applied locally and the rest are discarded.
    pub(crate) fn commit(
        &self,
        mut ops: Vec<(K, PendingOp<V>)>,
        observed: &[(K, Option<u64>)],
    ) -> Result<()> {
        let _gate = self.gate()?;
        let _mutation = self.mutation.lock();

        {
            let store = self.store.read();
            let now = self.now();
            let conflict = observed
                .iter()
                .any(|(key, version)| store.peek(key, now).map(|(_, v)| v) != *version);
            if conflict {
                debug!("Transaction conflict on cache {}", self.name);
                return Err(CacheError::TransactionConflict {
                    name: self.name.to_string(),
                });
            }
        }

        let failed = ops.iter().enumerate().find_map(|(i, (key, op))| {
            let written = match op {
                PendingOp::Put(value) => self.write_through(key, value),
                PendingOp::Remove => self.delete_through(key),
            };
            written.err().map(|e| (i, e))
        });
        if let Some((written, error)) = failed {
            // Keep the local view in line with what the backing store accepted
            ops.truncate(written);
            if !ops.is_empty() {
                debug!(
                    "Applying {} written-through operations of a failed commit on cache {}",
                    ops.len(),
                    self.name
                );
                self.apply(ops);
            }
            return Err(error);
        }

        let applied = ops.len();
        self.apply(ops);
        debug!("Committed {} operations on cache {}", applied, self.name);
        Ok(())
    }

    /// Applies `ops` under one store write lock, then dispatches their events.
    /// Caller holds the mutation lock.
    fn apply(&self, ops: Vec<(K, PendingOp<V>)>) {
        enum Applied<K, V> {
            Put(K, Arc<V>, Inserted<K, V>),
            Removed(K, Previous<V>),
        }

        let applied: Vec<Applied<K, V>> = {
            let mut store = self.store.write();
            let now = self.now();
            ops.into_iter()
                .map(|(key, op)| match op {
                    PendingOp::Put(value) => {
                        let inserted = store.insert(key.clone(), Arc::clone(&value), now);
                        self.record_inserted(&inserted);
                        Applied::Put(key, value, inserted)
                    }
                    PendingOp::Remove => {
                        let previous = store.remove(&key, now);
                        self.record_removed(&previous);
                        Applied::Removed(key, previous)
                    }
                })
                .collect()
        };

        for outcome in applied {
            match outcome {
                Applied::Put(key, value, inserted) => self.emit_inserted(key, value, inserted),
                Applied::Removed(key, previous) => self.emit_removed(key, previous),
            }
        }
    }

    /// Current statistics, or `None` if statistics are disabled.
    pub fn statistics(&self) -> Option<StatisticsSnapshot> {
        self.stats().map(CacheStatistics::snapshot)
    }

    /// Resets statistics to zero.
    pub fn clear_statistics(&self) {
        self.statistics.clear();
    }
}

impl<K, V> CacheMetrics for CacheInstance<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn metrics(&self) -> std::collections::BTreeMap<String, f64> {
        self.statistics()
            .map(|s| s.to_btreemap())
            .unwrap_or_default()
    }

    fn cache_name(&self) -> &str {
        &self.name
    }
}

impl<K, V> fmt::Debug for CacheInstance<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInstance")
            .field("name", &self.name)
            .field("status", &*self.lifecycle.read_recursive())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
