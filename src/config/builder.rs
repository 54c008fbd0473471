//! Fluent configuration builder bound to a [`CacheManager`].
//!
//! Obtained from [`CacheManager::create_configuration_builder`]. Each setter
//! consumes and returns the builder. [`build`](ConfigurationBuilder::build)
//! validates the result and creates, registers and starts the named cache.
//! If a cache of the same name already exists it is stopped first.
//!
//! Loaders, writers and listeners are taken as `Arc<dyn ..>`, so a missing
//! collaborator can't be passed where one is required.
//!
//! # Examples
//!
//! ```
//! use cache_manager::config::{Duration, ExpiryType, TimeUnit};
//! use cache_manager::error::BoxError;
//! use cache_manager::CacheManager;
//! use std::sync::Arc;
//!
//! let manager = CacheManager::new("app");
//! let cache = manager
//!     .create_configuration_builder::<u32, String>("users")
//!     .set_cache_loader(Arc::new(|id: &u32| -> Result<Option<String>, BoxError> {
//!         Ok(Some(format!("user-{id}")))
//!     }))
//!     .set_read_through(true)
//!     .set_statistics_enabled(true)
//!     .set_expiry(ExpiryType::Created, Duration::of(10, TimeUnit::Minutes))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(cache.get(&7).unwrap().as_deref(), Some(&"user-7".to_string()));
//! ```

use core::fmt;
use core::hash::Hash;
use core::num::NonZeroUsize;
use std::sync::Arc;

use super::{CacheConfig, Duration, Expiry, ExpiryType, IsolationLevel, Mode, TransactionSettings};
use crate::error::Result;
use crate::event::{CacheEntryListener, ListenerRegistration, NotificationScope};
use crate::instance::CacheInstance;
use crate::loader::{CacheLoader, CacheWriter};
use crate::manager::CacheManager;

/// Builds a named cache on a [`CacheManager`].
pub struct ConfigurationBuilder<'m, K, V> {
    manager: &'m CacheManager,
    name: String,
    config: CacheConfig<K, V>,
}

impl<'m, K, V> ConfigurationBuilder<'m, K, V> {
    pub(crate) fn new(manager: &'m CacheManager, name: String) -> Self {
        Self {
            manager,
            name,
            config: CacheConfig::default(),
        }
    }

    /// Name of the cache being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the cache loader.
    #[must_use]
    pub fn set_cache_loader(mut self, loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        self.config.loader = Some(loader);
        self
    }

    /// Sets the cache writer.
    #[must_use]
    pub fn set_cache_writer(mut self, writer: Arc<dyn CacheWriter<K, V>>) -> Self {
        self.config.writer = Some(writer);
        self
    }

    /// Registers a listener. Can be called multiple times. Listeners are
    /// dispatched in registration order.
    #[must_use]
    pub fn register_cache_entry_listener(
        mut self,
        listener: Arc<dyn CacheEntryListener<K, V>>,
        scope: NotificationScope,
        synchronous: bool,
    ) -> Self {
        self.config
            .listeners
            .push(ListenerRegistration::new(listener, scope, synchronous.into()));
        self
    }

    /// Sets whether values are copied on retrieval.
    #[must_use]
    pub fn set_store_by_value(mut self, store_by_value: bool) -> Self {
        self.config.store_by_value = store_by_value;
        self
    }

    /// Enables transactions with the given isolation level and mode.
    #[must_use]
    pub fn set_transaction_enabled(mut self, isolation_level: IsolationLevel, mode: Mode) -> Self {
        self.config.transactions = Some(TransactionSettings::new(isolation_level, mode));
        self
    }

    /// Sets whether statistics are collected.
    #[must_use]
    pub fn set_statistics_enabled(mut self, enabled: bool) -> Self {
        self.config.statistics_enabled = enabled;
        self
    }

    /// Sets whether misses are loaded through the loader.
    #[must_use]
    pub fn set_read_through(mut self, read_through: bool) -> Self {
        self.config.read_through = read_through;
        self
    }

    /// Sets whether mutations are written through the writer.
    #[must_use]
    pub fn set_write_through(mut self, write_through: bool) -> Self {
        self.config.write_through = write_through;
        self
    }

    /// Sets the expiry policy.
    #[must_use]
    pub fn set_expiry(mut self, expiry_type: ExpiryType, duration: Duration) -> Self {
        self.config.expiry = Expiry::new(expiry_type, duration);
        self
    }

    /// Bounds the number of entries. The least recently used entry is evicted
    /// when a new key is stored into a full cache.
    #[must_use]
    pub fn set_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    /// Starts a background thread that removes expired entries every `interval`.
    #[must_use]
    pub fn set_expiry_sweep_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.expiry_sweep_interval = Some(interval);
        self
    }

    /// Returns the draft without building a cache.
    pub fn into_config(self) -> CacheConfig<K, V> {
        self.config
    }
}

impl<K, V> ConfigurationBuilder<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Validates the configuration and creates, registers and starts the cache.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidConfiguration`](crate::CacheError::InvalidConfiguration)
    ///   if validation fails. Nothing is stopped or created in that case.
    /// - [`CacheError::StartFailed`](crate::CacheError::StartFailed) if the
    ///   new cache could not be started.
    /// - [`CacheError::ManagerClosed`](crate::CacheError::ManagerClosed) after shutdown.
    pub fn build(self) -> Result<Arc<CacheInstance<K, V>>> {
        self.manager.build(&self.name, self.config)
    }
}

impl<K, V> fmt::Debug for ConfigurationBuilder<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("manager", &self.manager.name())
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
