#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ CacheManager                                                         │
//! │   create_configuration_builder::<K, V>(name)                         │
//! │        │                                                             │
//! │        ▼                                                             │
//! │   ConfigurationBuilder ──build()──▶ ConfigurationValidator           │
//! │                                          │ CacheConfiguration        │
//! │                                          ▼                           │
//! │   registry: name ──▶ CacheInstance<K, V>                             │
//! │                        ├─ Store         entries, expiry, capacity    │
//! │                        ├─ CacheLoader   read-through                 │
//! │                        ├─ CacheWriter   write-through                │
//! │                        ├─ Dispatcher    sync + async listeners       │
//! │                        ├─ CacheStatistics                            │
//! │                        └─ Transaction   buffered, isolated writes    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Role |
//! |------|------|
//! | [`CacheManager`] | Registry of named caches, entry point for building |
//! | [`ConfigurationBuilder`] | Fluent setters, then `build()` |
//! | [`ConfigurationValidator`] | Checks a draft [`CacheConfig`] |
//! | [`CacheInstance`] | A running cache |
//! | [`Transaction`] | Buffered writes committed atomically |
//!
//! ## Validation Failures
//!
//! ```rust
//! use cache_manager::config::{IsolationLevel, Mode};
//! use cache_manager::error::Violation;
//! use cache_manager::CacheManager;
//!
//! let manager = CacheManager::new("app");
//! let err = manager
//!     .create_configuration_builder::<u32, String>("orders")
//!     .set_read_through(true)
//!     .set_write_through(true)
//!     .set_transaction_enabled(IsolationLevel::None, Mode::Local)
//!     .build()
//!     .unwrap_err();
//!
//! let violations = err.as_config_error().unwrap().violations();
//! assert_eq!(
//!     violations,
//!     &[
//!         Violation::MissingLoader,
//!         Violation::MissingWriter,
//!         Violation::IsolationLevelNone,
//!     ]
//! );
//! assert!(manager.cache_names().is_empty());
//! ```
//!
//! ## Listening to Entry Events
//!
//! ```rust
//! use cache_manager::error::BoxError;
//! use cache_manager::event::{CacheEntryEvent, EventType, NotificationScope};
//! use cache_manager::CacheManager;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let created = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&created);
//!
//! let manager = CacheManager::new("app");
//! let cache = manager
//!     .create_configuration_builder::<u32, u32>("counters")
//!     .register_cache_entry_listener(
//!         Arc::new(move |event: &CacheEntryEvent<u32, u32>| -> Result<(), BoxError> {
//!             if event.event_type == EventType::Created {
//!                 counter.fetch_add(1, Ordering::SeqCst);
//!             }
//!             Ok(())
//!         }),
//!         NotificationScope::Local,
//!         true,
//!     )
//!     .build()
//!     .unwrap();
//!
//! cache.put(1, 1).unwrap();
//! cache.put(1, 2).unwrap();
//! cache.put(2, 1).unwrap();
//! assert_eq!(created.load(Ordering::SeqCst), 2);
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Draft and validated configuration, builder, validator
//! - [`instance`]: The running cache and its lifecycle
//! - [`manager`]: Named cache registry
//! - [`transaction`]: Local transactions
//! - [`event`]: Entry events and listener registration
//! - [`loader`]: Read-through and write-through collaborators
//! - [`metrics`]: Statistics counters and reporting
//! - [`clock`]: Time source used for expiry
//! - [`error`]: Error types

/// Configuration drafts, validation and the fluent builder.
pub mod config;

/// Time sources.
///
/// Expiry is computed against a [`Clock`](clock::Clock). Production caches use
/// the monotonic [`SystemClock`](clock::SystemClock). Tests drive time by hand
/// with [`ManualClock`](clock::ManualClock).
pub mod clock;

/// Error types.
pub mod error;

/// Cache entry events and listener registration.
pub mod event;

/// Cache loader and cache writer traits.
pub mod loader;

/// Running cache instances.
pub mod instance;

/// Named cache registry.
pub mod manager;

/// Local transactions.
pub mod transaction;

/// Cache statistics.
///
/// Counters are kept per cache and reported through the [`CacheMetrics`](metrics::CacheMetrics) trait.
pub mod metrics;

/// Stored entry with expiry timestamps.
pub(crate) mod entry;

/// Entry map with expiry and capacity bookkeeping.
pub(crate) mod store;

/// Listener dispatch, synchronous and asynchronous.
pub(crate) mod dispatch;

// Re-export the main types
pub use instance::{CacheInstance, Status};
pub use manager::CacheManager;
pub use transaction::Transaction;

// Re-export configuration types
pub use config::{
    CacheConfig, CacheConfiguration, Capabilities, ConfigurationBuilder, ConfigurationValidator,
};

// Re-export error types
pub use error::{CacheError, ConfigError};
