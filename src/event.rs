//! Cache entry events and listener registrations.
//!
//! Every mutation of a started cache produces a [`CacheEntryEvent`]. Listeners
//! are registered with a [`NotificationScope`] and a [`DispatchMode`]:
//!
//! | Mode | Runs on | Caller waits? | Ordering |
//! |------|---------|---------------|----------|
//! | `Synchronous` | mutating thread | yes | registration order |
//! | `Asynchronous` | cache's dispatcher thread | no | none guaranteed |
//!
//! Events produced by this crate always originate locally. They reach
//! listeners registered with `Local` or `All` scope. `Remote`-only listeners
//! are accepted but never notified by a single-process cache.

use core::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A new entry was stored.
    Created,
    /// An existing entry's value was replaced.
    Updated,
    /// An entry was removed explicitly or evicted for capacity.
    Removed,
    /// An entry was removed because it expired.
    Expired,
}

/// Which event origins a listener wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NotificationScope {
    /// Mutations made by this process.
    Local,
    /// Mutations made elsewhere and replicated here.
    Remote,
    /// Both.
    All,
}

impl NotificationScope {
    /// Returns `true` if listeners with this scope see locally originated events.
    #[inline]
    pub fn receives_local(self) -> bool {
        matches!(self, NotificationScope::Local | NotificationScope::All)
    }
}

/// Whether a listener runs inline with the mutation or on the dispatcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DispatchMode {
    /// Invoked and awaited before the mutating call returns.
    Synchronous,
    /// Queued and invoked without blocking the caller.
    Asynchronous,
}

impl From<bool> for DispatchMode {
    fn from(synchronous: bool) -> Self {
        if synchronous {
            DispatchMode::Synchronous
        } else {
            DispatchMode::Asynchronous
        }
    }
}

/// A mutation observed on a cache.
pub struct CacheEntryEvent<K, V> {
    /// Name of the cache that produced the event.
    pub cache_name: Arc<str>,
    /// What happened.
    pub event_type: EventType,
    /// Affected key.
    pub key: K,
    /// Value before the mutation, if any.
    pub old_value: Option<Arc<V>>,
    /// Value after the mutation, if any.
    pub new_value: Option<Arc<V>>,
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheEntryEvent<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntryEvent")
            .field("cache_name", &self.cache_name)
            .field("event_type", &self.event_type)
            .field("key", &self.key)
            .field("old_value", &self.old_value)
            .field("new_value", &self.new_value)
            .finish()
    }
}

/// Receives [`CacheEntryEvent`]s.
///
/// Errors are logged by the cache and never reach the mutating caller.
pub trait CacheEntryListener<K, V>: Send + Sync {
    /// Called once per matching event.
    fn on_event(&self, event: &CacheEntryEvent<K, V>) -> Result<(), BoxError>;
}

impl<K, V, F> CacheEntryListener<K, V> for F
where
    F: Fn(&CacheEntryEvent<K, V>) -> Result<(), BoxError> + Send + Sync,
{
    fn on_event(&self, event: &CacheEntryEvent<K, V>) -> Result<(), BoxError> {
        self(event)
    }
}

/// A listener together with its scope and dispatch mode.
pub struct ListenerRegistration<K, V> {
    /// The listener.
    pub listener: Arc<dyn CacheEntryListener<K, V>>,
    /// Which origins it receives.
    pub scope: NotificationScope,
    /// How it is invoked.
    pub mode: DispatchMode,
}

impl<K, V> ListenerRegistration<K, V> {
    /// Creates a registration.
    pub fn new(
        listener: Arc<dyn CacheEntryListener<K, V>>,
        scope: NotificationScope,
        mode: DispatchMode,
    ) -> Self {
        Self {
            listener,
            scope,
            mode,
        }
    }
}

impl<K, V> Clone for ListenerRegistration<K, V> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            scope: self.scope,
            mode: self.mode,
        }
    }
}

impl<K, V> fmt::Debug for ListenerRegistration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("scope", &self.scope)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
