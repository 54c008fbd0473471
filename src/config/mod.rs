//! Cache Configuration Module
//!
//! A cache is described in two stages:
//!
//! - [`CacheConfig`] is the mutable draft. It is a plain struct with public
//!   fields and a `Default` impl, so it can be filled in directly or through the
//!   fluent [`ConfigurationBuilder`].
//! - [`CacheConfiguration`] is the validated, immutable form. It can only be
//!   produced by [`ConfigurationValidator::validate`], so holding one proves the
//!   constraints below hold.
//!
//! # Constraints
//!
//! | Setting | Requires |
//! |---------|----------|
//! | `read_through = true` | a loader |
//! | `write_through = true` | a writer |
//! | `transactions = Some(..)` | isolation level other than `None`, implementation support |
//! | `Mode::Xa` | implementation support for XA |
//! | `store_by_value = false` | implementation support for store-by-reference |
//!
//! What the implementation supports is described by [`Capabilities`].
//!
//! # Examples
//!
//! ```
//! use cache_manager::config::{CacheConfig, Capabilities, ConfigurationValidator};
//!
//! let draft: CacheConfig<String, i32> = CacheConfig {
//!     statistics_enabled: true,
//!     ..CacheConfig::default()
//! };
//! let config = ConfigurationValidator::new(Capabilities::default())
//!     .validate(draft)
//!     .unwrap();
//! assert!(config.is_statistics_enabled());
//! assert!(config.is_store_by_value());
//! ```

pub mod builder;
pub mod expiry;
pub mod transaction;
pub mod validate;

pub use builder::ConfigurationBuilder;
pub use expiry::{Duration, Expiry, ExpiryType, TimeUnit};
pub use transaction::{IsolationLevel, Mode, TransactionSettings};
pub use validate::ConfigurationValidator;

use core::any::type_name;
use core::fmt;
use core::num::NonZeroUsize;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::event::ListenerRegistration;
use crate::loader::{CacheLoader, CacheWriter};

/// Optional features an implementation supports.
///
/// Configured once on the [`CacheManager`](crate::CacheManager) and consulted
/// by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Capabilities {
    /// Local transactions are supported.
    pub transactions: bool,
    /// XA transactions are supported.
    pub xa_transactions: bool,
    /// Caches may hold shared references instead of copies.
    pub store_by_reference: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            transactions: true,
            xa_transactions: false,
            store_by_reference: true,
        }
    }
}

/// Draft configuration for a cache with keys `K` and values `V`.
///
/// All fields are public. Unset fields come from `Default`:
/// store-by-value, no statistics, no read/write-through, eternal expiry,
/// unbounded capacity.
pub struct CacheConfig<K, V> {
    /// Loader for read-through.
    pub loader: Option<Arc<dyn CacheLoader<K, V>>>,
    /// Writer for write-through.
    pub writer: Option<Arc<dyn CacheWriter<K, V>>>,
    /// Listener registrations, in dispatch order.
    pub listeners: Vec<ListenerRegistration<K, V>>,
    /// Copy values on retrieval instead of sharing them.
    pub store_by_value: bool,
    /// Transaction settings. `None` disables transactions.
    pub transactions: Option<TransactionSettings>,
    /// Maintain hit/miss/put/removal/eviction counters.
    pub statistics_enabled: bool,
    /// Load missing entries through the loader.
    pub read_through: bool,
    /// Propagate mutations through the writer.
    pub write_through: bool,
    /// Expiry policy.
    pub expiry: Expiry,
    /// Maximum number of entries. `None` is unbounded.
    pub capacity: Option<NonZeroUsize>,
    /// Period of the background expiry sweep. `None` relies on lazy expiry only.
    pub expiry_sweep_interval: Option<std::time::Duration>,
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        Self {
            loader: None,
            writer: None,
            listeners: Vec::new(),
            store_by_value: true,
            transactions: None,
            statistics_enabled: false,
            read_through: false,
            write_through: false,
            expiry: Expiry::default(),
            capacity: None,
            expiry_sweep_interval: None,
        }
    }
}

impl<K, V> Clone for CacheConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            writer: self.writer.clone(),
            listeners: self.listeners.clone(),
            store_by_value: self.store_by_value,
            transactions: self.transactions,
            statistics_enabled: self.statistics_enabled,
            read_through: self.read_through,
            write_through: self.write_through,
            expiry: self.expiry,
            capacity: self.capacity,
            expiry_sweep_interval: self.expiry_sweep_interval,
        }
    }
}

impl<K, V> fmt::Debug for CacheConfig<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("loader", &self.loader.is_some())
            .field("writer", &self.writer.is_some())
            .field("listeners", &self.listeners)
            .field("store_by_value", &self.store_by_value)
            .field("transactions", &self.transactions)
            .field("statistics_enabled", &self.statistics_enabled)
            .field("read_through", &self.read_through)
            .field("write_through", &self.write_through)
            .field("expiry", &self.expiry)
            .field("capacity", &self.capacity)
            .field("expiry_sweep_interval", &self.expiry_sweep_interval)
            .finish()
    }
}

/// Validated, immutable cache configuration.
pub struct CacheConfiguration<K, V> {
    key_type: &'static str,
    value_type: &'static str,
    inner: CacheConfig<K, V>,
}

impl<K: 'static, V: 'static> CacheConfiguration<K, V> {
    /// Wraps a draft that has already passed validation.
    pub(crate) fn from_validated(inner: CacheConfig<K, V>) -> Self {
        Self {
            key_type: type_name::<K>(),
            value_type: type_name::<V>(),
            inner,
        }
    }
}

impl<K, V> CacheConfiguration<K, V> {
    /// Name of the key type.
    pub fn key_type(&self) -> &'static str {
        self.key_type
    }

    /// Name of the value type.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    /// The cache loader, if one was set.
    pub fn loader(&self) -> Option<&Arc<dyn CacheLoader<K, V>>> {
        self.inner.loader.as_ref()
    }

    /// The cache writer, if one was set.
    pub fn writer(&self) -> Option<&Arc<dyn CacheWriter<K, V>>> {
        self.inner.writer.as_ref()
    }

    /// Listener registrations, in dispatch order.
    pub fn listeners(&self) -> &[ListenerRegistration<K, V>] {
        &self.inner.listeners
    }

    /// Whether values are copied on retrieval.
    pub fn is_store_by_value(&self) -> bool {
        self.inner.store_by_value
    }

    /// Whether transactions are enabled.
    pub fn is_transaction_enabled(&self) -> bool {
        self.inner.transactions.is_some()
    }

    /// Transaction settings, if enabled.
    pub fn transaction_settings(&self) -> Option<TransactionSettings> {
        self.inner.transactions
    }

    /// Whether statistics are collected.
    pub fn is_statistics_enabled(&self) -> bool {
        self.inner.statistics_enabled
    }

    /// Whether misses are loaded through the loader.
    pub fn is_read_through(&self) -> bool {
        self.inner.read_through
    }

    /// Whether mutations are written through the writer.
    pub fn is_write_through(&self) -> bool {
        self.inner.write_through
    }

    /// Expiry policy.
    pub fn expiry(&self) -> Expiry {
        self.inner.expiry
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.inner.capacity
    }

    /// Background sweep period.
    pub fn expiry_sweep_interval(&self) -> Option<std::time::Duration> {
        self.inner.expiry_sweep_interval
    }

    /// Returns a draft copy of this configuration, for deriving a new cache.
    pub fn to_draft(&self) -> CacheConfig<K, V> {
        self.inner.clone()
    }
}

impl<K, V> fmt::Debug for CacheConfiguration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfiguration")
            .field("key_type", &self.key_type)
            .field("value_type", &self.value_type)
            .field("config", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_draft() {
        let draft: CacheConfig<u32, String> = CacheConfig::default();
        assert!(draft.store_by_value);
        assert!(!draft.read_through);
        assert!(!draft.write_through);
        assert!(!draft.statistics_enabled);
        assert!(draft.transactions.is_none());
        assert!(draft.expiry.duration.is_eternal());
        assert!(draft.capacity.is_none());
    }

    #[test]
    fn test_configuration_type_tags() {
        let config = CacheConfiguration::from_validated(CacheConfig::<u32, String>::default());
        assert_eq!(config.key_type(), "u32");
        assert!(config.value_type().ends_with("String"));
    }

    #[test]
    fn test_default_capabilities() {
        let caps = Capabilities::default();
        assert!(caps.transactions);
        assert!(caps.store_by_reference);
        assert!(!caps.xa_transactions);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_capabilities_deserialize_with_defaults() {
        let caps: Capabilities = serde_json::from_str(r#"{"xa_transactions": true}"#).unwrap();
        assert!(caps.transactions);
        assert!(caps.xa_transactions);
    }
}
