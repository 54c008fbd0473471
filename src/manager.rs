//! Named cache registry.
//!
//! [`CacheManager`] owns every cache built through it, keyed by name. Caches
//! with different key and value types can live side by side. They are stored
//! type-erased and recovered with [`get_cache`](CacheManager::get_cache).
//!
//! # Building under an existing name
//!
//! ```text
//! build("users")
//!   │
//!   ├─ validate ──────────────── fails: error, nothing touched
//!   ├─ lock "users"              concurrent builds of one name serialize here
//!   ├─ create new instance
//!   ├─ stop + unregister old     exactly once, by whichever build got the lock
//!   └─ start + register new ──── fails: StartFailed, name left unregistered
//! ```
//!
//! Builds of different names only share the registry map lock for the
//! moment of insertion.

use core::any::Any;
use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

use crate::clock::{Clock, SystemClock};
use crate::config::{
    CacheConfig, CacheConfiguration, Capabilities, ConfigurationBuilder, ConfigurationValidator,
};
use crate::error::{CacheError, Result};
use crate::instance::{CacheInstance, Status};

/// Lifecycle handle on a registered cache, independent of its types.
trait Managed: Send + Sync {
    fn status(&self) -> Status;
    fn stop(&self) -> Result<()>;
}

impl<K, V> Managed for CacheInstance<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn status(&self) -> Status {
        CacheInstance::status(self)
    }

    fn stop(&self) -> Result<()> {
        CacheInstance::stop(self)
    }
}

struct Registered {
    cache: Arc<dyn Any + Send + Sync>,
    handle: Arc<dyn Managed>,
}

impl Registered {
    fn stop(&self, name: &str) {
        if self.handle.status() != Status::Started {
            return;
        }
        if let Err(e) = self.handle.stop() {
            warn!("Failed to stop cache {}: {}", name, e);
        }
    }
}

struct Registry {
    caches: HashMap<String, Registered>,
    closed: bool,
}

/// Creates, tracks and replaces named caches.
///
/// # Examples
///
/// ```
/// use cache_manager::CacheManager;
///
/// let manager = CacheManager::new("app");
/// manager
///     .create_configuration_builder::<String, u64>("sessions")
///     .build()
///     .unwrap();
///
/// let sessions = manager.get_cache::<String, u64>("sessions").unwrap().unwrap();
/// sessions.put("abc".to_string(), 42).unwrap();
/// assert!(manager.get_cache::<u32, u64>("sessions").is_err());
///
/// manager.shutdown();
/// assert!(sessions.put("abc".to_string(), 1).is_err());
/// ```
pub struct CacheManager {
    name: String,
    validator: ConfigurationValidator,
    clock: Arc<dyn Clock>,
    registry: RwLock<Registry>,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheManager {
    /// Creates a manager with default [`Capabilities`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capabilities(name, Capabilities::default())
    }

    /// Creates a manager that validates against `capabilities`.
    pub fn with_capabilities(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            validator: ConfigurationValidator::new(capabilities),
            clock: Arc::new(SystemClock::new()),
            registry: RwLock::new(Registry {
                caches: HashMap::new(),
                closed: false,
            }),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the clock used by caches built from now on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Manager name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capabilities configurations are validated against.
    pub fn capabilities(&self) -> Capabilities {
        self.validator.capabilities()
    }

    /// Returns a fresh builder for the cache `name`.
    pub fn create_configuration_builder<K, V>(&self, name: &str) -> ConfigurationBuilder<'_, K, V> {
        ConfigurationBuilder::new(self, name.to_string())
    }

    /// Runs `f` while holding the build lock of `name`. The lock is dropped
    /// from the table once no other caller is waiting on it.
    fn with_build_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.build_locks.lock();
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.build_locks.lock();
        // One reference in the table and ours: nobody else is queued
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
        result
    }

    /// Validates `draft` and replaces any cache registered as `name` with a
    /// new, started one.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidConfiguration`] if validation fails. The existing
    ///   cache, if any, keeps running.
    /// - [`CacheError::StartFailed`] if the new cache could not start. The old
    ///   cache has been stopped by then and the name is left unregistered.
    /// - [`CacheError::ManagerClosed`] after [`shutdown`](Self::shutdown).
    pub fn build<K, V>(&self, name: &str, draft: CacheConfig<K, V>) -> Result<Arc<CacheInstance<K, V>>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if self.registry.read().closed {
            return Err(CacheError::ManagerClosed);
        }
        let config = self.validator.validate::<K, V>(draft).map_err(|e| {
            debug!("Rejected configuration for cache {}: {}", name, e);
            e
        })?;

        self.with_build_lock(name, || self.replace_cache(name, config))
    }

    fn replace_cache<K, V>(
        &self,
        name: &str,
        config: CacheConfiguration<K, V>,
    ) -> Result<Arc<CacheInstance<K, V>>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let cache = Arc::new(CacheInstance::new(name, config, Arc::clone(&self.clock)));

        let previous = {
            let mut registry = self.registry.write();
            if registry.closed {
                return Err(CacheError::ManagerClosed);
            }
            registry.caches.remove(name)
        };
        if let Some(previous) = previous {
            previous.stop(name);
            info!("Stopped previous cache {} on manager {}", name, self.name);
        }

        cache.start()?;

        let mut registry = self.registry.write();
        if registry.closed {
            drop(registry);
            if let Err(e) = cache.stop() {
                warn!("Failed to stop cache {}: {}", name, e);
            }
            return Err(CacheError::ManagerClosed);
        }
        registry.caches.insert(name.to_string(), Self::entry(&cache));
        info!("Registered cache {} on manager {}", name, self.name);
        Ok(cache)
    }

    fn entry<K, V>(cache: &Arc<CacheInstance<K, V>>) -> Registered
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Registered {
            cache: Arc::clone(cache) as Arc<dyn Any + Send + Sync>,
            handle: Arc::clone(cache) as Arc<dyn Managed>,
        }
    }

    /// Returns the cache registered as `name`, if any.
    ///
    /// # Errors
    ///
    /// [`CacheError::TypeMismatch`] if the cache exists with other key or
    /// value types, or [`CacheError::ManagerClosed`] after shutdown.
    pub fn get_cache<K, V>(&self, name: &str) -> Result<Option<Arc<CacheInstance<K, V>>>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let registry = self.registry.read();
        if registry.closed {
            return Err(CacheError::ManagerClosed);
        }
        let Some(entry) = registry.caches.get(name) else {
            return Ok(None);
        };
        Arc::clone(&entry.cache)
            .downcast::<CacheInstance<K, V>>()
            .map(Some)
            .map_err(|_| CacheError::TypeMismatch {
                name: name.to_string(),
            })
    }

    /// Stops and unregisters the cache `name`. Returns whether one existed.
    pub fn remove_cache(&self, name: &str) -> Result<bool> {
        self.with_build_lock(name, || self.unregister(name))
    }

    fn unregister(&self, name: &str) -> Result<bool> {
        let removed = {
            let mut registry = self.registry.write();
            if registry.closed {
                return Err(CacheError::ManagerClosed);
            }
            registry.caches.remove(name)
        };
        match removed {
            Some(entry) => {
                entry.stop(name);
                info!("Removed cache {} from manager {}", name, self.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Names of all registered caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.registry.read().closed
    }

    /// Stops every cache and refuses further builds. Idempotent.
    pub fn shutdown(&self) {
        let drained: Vec<(String, Registered)> = {
            let mut registry = self.registry.write();
            if registry.closed {
                return;
            }
            registry.closed = true;
            registry.caches.drain().collect()
        };
        for (name, entry) in &drained {
            entry.stop(name);
        }
        info!("Cache manager {} shut down, stopped {} caches", self.name, drained.len());
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .field("caches", &self.cache_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, Violation};
    use crate::loader::CacheWriter;

    #[test]
    fn test_build_registers_started_cache() {
        let manager = CacheManager::new("test");
        let cache = manager
            .create_configuration_builder::<u32, String>("a")
            .build()
            .unwrap();
        assert_eq!(cache.status(), Status::Started);
        assert_eq!(manager.cache_names(), vec!["a".to_string()]);
        let found = manager.get_cache::<u32, String>("a").unwrap().unwrap();
        assert!(Arc::ptr_eq(&cache, &found));
        assert!(manager.get_cache::<u32, String>("missing").unwrap().is_none());
    }

    #[test]
    fn test_rebuild_stops_previous() {
        let manager = CacheManager::new("test");
        let first = manager
            .create_configuration_builder::<u32, u32>("a")
            .build()
            .unwrap();
        first.put(1, 1).unwrap();
        let second = manager
            .create_configuration_builder::<u32, u32>("a")
            .set_statistics_enabled(true)
            .build()
            .unwrap();
        assert_eq!(first.status(), Status::Stopped);
        assert_eq!(second.status(), Status::Started);
        assert_eq!(second.get(&1).unwrap(), None);
        assert_eq!(manager.cache_names().len(), 1);
    }

    #[test]
    fn test_invalid_rebuild_keeps_existing() {
        let manager = CacheManager::new("test");
        let first = manager
            .create_configuration_builder::<u32, u32>("a")
            .build()
            .unwrap();
        let err = manager
            .create_configuration_builder::<u32, u32>("a")
            .set_write_through(true)
            .build()
            .unwrap_err();
        assert!(err.as_config_error().unwrap().contains(Violation::MissingWriter));
        assert_eq!(first.status(), Status::Started);
    }

    #[test]
    fn test_rebuild_may_change_types() {
        let manager = CacheManager::new("test");
        manager
            .create_configuration_builder::<u32, u32>("a")
            .build()
            .unwrap();
        manager
            .create_configuration_builder::<String, Vec<u8>>("a")
            .build()
            .unwrap();
        assert!(matches!(
            manager.get_cache::<u32, u32>("a"),
            Err(CacheError::TypeMismatch { .. })
        ));
        assert!(manager.get_cache::<String, Vec<u8>>("a").unwrap().is_some());
    }

    #[test]
    fn test_remove_cache() {
        let manager = CacheManager::new("test");
        let cache = manager
            .create_configuration_builder::<u32, u32>("a")
            .build()
            .unwrap();
        assert!(manager.remove_cache("a").unwrap());
        assert!(!manager.remove_cache("a").unwrap());
        assert_eq!(cache.status(), Status::Stopped);
        assert!(manager.cache_names().is_empty());
    }

    #[test]
    fn test_build_locks_released_after_use() {
        let manager = CacheManager::new("test");
        for i in 0..10 {
            manager
                .create_configuration_builder::<u32, u32>(&format!("cache-{i}"))
                .build()
                .unwrap();
        }
        assert!(manager.remove_cache("cache-0").unwrap());
        assert!(!manager.remove_cache("never-built").unwrap());
        assert!(manager.build_locks.lock().is_empty());
        assert_eq!(manager.cache_names().len(), 9);
    }

    #[test]
    fn test_shutdown_closes_manager() {
        let manager = CacheManager::new("test");
        let cache = manager
            .create_configuration_builder::<u32, u32>("a")
            .build()
            .unwrap();
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_closed());
        assert_eq!(cache.status(), Status::Stopped);
        assert!(matches!(
            manager.create_configuration_builder::<u32, u32>("b").build(),
            Err(CacheError::ManagerClosed)
        ));
        assert!(matches!(manager.get_cache::<u32, u32>("a"), Err(CacheError::ManagerClosed)));
    }

    #[test]
    fn test_capabilities_drive_validation() {
        let manager = CacheManager::with_capabilities(
            "test",
            Capabilities {
                store_by_reference: false,
                ..Capabilities::default()
            },
        );
        let err = manager
            .create_configuration_builder::<u32, u32>("a")
            .set_store_by_value(false)
            .build()
            .unwrap_err();
        assert!(err
            .as_config_error()
            .unwrap()
            .contains(Violation::StoreByReferenceUnsupported));
    }

    #[test]
    fn test_build_with_writer() {
        struct Sink;
        impl CacheWriter<u32, u32> for Sink {
            fn write(&self, _: &u32, _: &u32) -> core::result::Result<(), BoxError> {
                Ok(())
            }
            fn delete(&self, _: &u32) -> core::result::Result<(), BoxError> {
                Ok(())
            }
        }
        let manager = CacheManager::new("test");
        let cache = manager
            .create_configuration_builder::<u32, u32>("a")
            .set_cache_writer(Arc::new(Sink))
            .set_write_through(true)
            .build()
            .unwrap();
        cache.put(1, 2).unwrap();
        assert!(cache.configuration().is_write_through());
    }
}
