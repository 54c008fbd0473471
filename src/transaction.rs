//! Local transactions on a single cache.
//!
//! A [`Transaction`] buffers writes and applies them together on
//! [`commit`](Transaction::commit). Until then, no other reader sees them and
//! no listener is notified. Dropping a transaction without committing rolls it
//! back.
//!
//! | Isolation | Reads inside the transaction |
//! |-----------|------------------------------|
//! | `ReadUncommitted`, `ReadCommitted` | own buffered writes, else the latest committed value |
//! | `RepeatableRead` | own buffered writes, else the first value read for the key |
//! | `Serializable` | as `RepeatableRead`, and commit fails if any key read or written was changed by someone else |
//!
//! # Examples
//!
//! ```
//! use cache_manager::config::{IsolationLevel, Mode};
//! use cache_manager::CacheManager;
//!
//! let manager = CacheManager::new("app");
//! let cache = manager
//!     .create_configuration_builder::<u32, i64>("accounts")
//!     .set_transaction_enabled(IsolationLevel::ReadCommitted, Mode::Local)
//!     .build()
//!     .unwrap();
//! cache.put(1, 100).unwrap();
//! cache.put(2, 0).unwrap();
//!
//! let mut tx = cache.begin().unwrap();
//! let from = *tx.get(&1).unwrap().unwrap();
//! tx.put(1, from - 40);
//! tx.put(2, 40);
//! assert_eq!(*cache.get(&2).unwrap().unwrap(), 0);
//! tx.commit().unwrap();
//! assert_eq!(*cache.get(&2).unwrap().unwrap(), 40);
//! ```

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use tracing::debug;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

use crate::config::TransactionSettings;
use crate::error::Result;
use crate::instance::CacheInstance;

/// A buffered write.
#[derive(Debug)]
pub(crate) enum PendingOp<V> {
    Put(Arc<V>),
    Remove,
}

/// An open transaction on a [`CacheInstance`].
#[must_use = "a transaction is rolled back unless committed"]
pub struct Transaction<'c, K, V> {
    cache: &'c CacheInstance<K, V>,
    settings: TransactionSettings,
    writes: Vec<(K, PendingOp<V>)>,
    slots: HashMap<K, usize>,
    pinned: HashMap<K, Option<Arc<V>>>,
    observed: HashMap<K, Option<u64>>,
    finished: bool,
}

impl<'c, K, V> Transaction<'c, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cache: &'c CacheInstance<K, V>, settings: TransactionSettings) -> Self {
        Self {
            cache,
            settings,
            writes: Vec::new(),
            slots: HashMap::new(),
            pinned: HashMap::new(),
            observed: HashMap::new(),
            finished: false,
        }
    }

    /// Isolation level and mode of this transaction.
    pub fn settings(&self) -> TransactionSettings {
        self.settings
    }

    /// Reads `key` as seen by this transaction.
    ///
    /// Read-through applies on a miss, exactly as for
    /// [`CacheInstance::get`].
    pub fn get(&mut self, key: &K) -> Result<Option<Arc<V>>> {
        if let Some(&slot) = self.slots.get(key) {
            return Ok(match &self.writes[slot].1 {
                PendingOp::Put(value) => Some(self.cache.output(Arc::clone(value))),
                PendingOp::Remove => None,
            });
        }
        if let Some(value) = self.pinned.get(key) {
            return Ok(value.clone().map(|v| self.cache.output(v)));
        }

        let read = self.cache.read_versioned(key)?;
        self.observed
            .entry(key.clone())
            .or_insert(read.as_ref().map(|(_, version)| *version));
        let value = read.map(|(value, _)| value);
        if self.settings.pins_reads() {
            self.pinned.insert(key.clone(), value.clone());
        }
        Ok(value.map(|v| self.cache.output(v)))
    }

    /// Buffers a put.
    pub fn put(&mut self, key: K, value: V) {
        self.buffer(key, PendingOp::Put(Arc::new(value)));
    }

    /// Buffers a removal.
    pub fn remove(&mut self, key: K) {
        self.buffer(key, PendingOp::Remove);
    }

    fn buffer(&mut self, key: K, op: PendingOp<V>) {
        if self.settings.validates_on_commit() && !self.observed.contains_key(&key) {
            // A stopped cache fails the commit anyway
            if let Ok(version) = self.cache.current_version(&key) {
                self.observed.insert(key.clone(), version);
            }
        }
        match self.slots.get(&key) {
            Some(&slot) => self.writes[slot].1 = op,
            None => {
                self.slots.insert(key.clone(), self.writes.len());
                self.writes.push((key, op));
            }
        }
    }

    /// Number of distinct keys written so far.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Applies all buffered writes atomically.
    ///
    /// # Errors
    ///
    /// - [`CacheError::TransactionConflict`](crate::CacheError::TransactionConflict)
    ///   under `Serializable` if a touched key changed since it was first observed
    /// - [`CacheError::Write`](crate::CacheError::Write) if write-through fails
    ///
    /// A conflict applies nothing. On a writer failure, the writes the backing
    /// store already accepted are applied locally and the rest are discarded.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let writes = core::mem::take(&mut self.writes);
        let observed: Vec<(K, Option<u64>)> = if self.settings.validates_on_commit() {
            core::mem::take(&mut self.observed).into_iter().collect()
        } else {
            Vec::new()
        };
        self.cache.commit(writes, &observed)
    }

    /// Discards all buffered writes.
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(
            "Rolled back transaction with {} pending writes on cache {}",
            self.writes.len(),
            self.cache.name()
        );
    }
}

impl<K, V> Drop for Transaction<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            debug!(
                "Transaction dropped with {} uncommitted writes; rolled back",
                self.writes.len()
            );
        }
    }
}

impl<K, V> fmt::Debug for Transaction<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("settings", &self.settings)
            .field("pending", &self.writes.len())
            .finish_non_exhaustive()
    }
}
