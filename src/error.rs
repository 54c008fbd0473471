//! Error types for configuration, registry and cache operations.
//!
//! Two layers are used:
//!
//! - [`ConfigError`] is raised by the validator before any cache exists. It
//!   lists every violated constraint so the caller can fix them all at once.
//! - [`CacheError`] is what every public operation returns. Validation errors
//!   convert into it via `From`.
//!
//! Collaborator failures (loader, writer) keep their original error as the
//! `source`, so callers can downcast to their own error types.

use core::fmt;
use std::io;

use thiserror::Error;

use crate::instance::Status;

/// Boxed error type returned by user-supplied loaders, writers and listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = CacheError> = core::result::Result<T, E>;

/// A single configuration constraint that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Read-through was enabled but no cache loader was set.
    MissingLoader,
    /// Write-through was enabled but no cache writer was set.
    MissingWriter,
    /// Transactions were enabled with `IsolationLevel::None`.
    IsolationLevelNone,
    /// Transactions were enabled but the implementation does not support them.
    TransactionsUnsupported,
    /// XA mode was requested but the implementation only supports local transactions.
    XaUnsupported,
    /// Store-by-reference was requested but the implementation forces copy semantics.
    StoreByReferenceUnsupported,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Violation::MissingLoader => "read-through is enabled but no cache loader is set",
            Violation::MissingWriter => "write-through is enabled but no cache writer is set",
            Violation::IsolationLevelNone => {
                "transactions require an isolation level other than NONE"
            }
            Violation::TransactionsUnsupported => "this implementation does not support transactions",
            Violation::XaUnsupported => "this implementation does not support XA transactions",
            Violation::StoreByReferenceUnsupported => {
                "this implementation does not support store-by-reference"
            }
        };
        f.write_str(msg)
    }
}

/// Raised when an assembled configuration is internally inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more constraints failed, in validation order.
    #[error("invalid cache configuration: {}", join(.0))]
    Invalid(Vec<Violation>),
}

impl ConfigError {
    /// Returns the violated constraints.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Invalid(v) => v,
        }
    }

    /// Returns `true` if `violation` is among the reported failures.
    pub fn contains(&self, violation: Violation) -> bool {
        self.violations().contains(&violation)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by the cache manager and cache instances.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The configuration failed validation. No cache was created or stopped.
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    /// The new cache could not be started after the previous one was stopped.
    #[error("failed to start cache '{name}': {source}")]
    StartFailed {
        /// Cache name.
        name: String,
        /// Underlying I/O error from spawning a worker thread.
        #[source]
        source: io::Error,
    },

    /// The manager has been shut down.
    #[error("cache manager is closed")]
    ManagerClosed,

    /// A cache exists under this name but with different key or value types.
    #[error("cache '{name}' exists with different key/value types")]
    TypeMismatch {
        /// Cache name.
        name: String,
    },

    /// The operation is not legal in the cache's current lifecycle state.
    #[error("cache '{name}' is {status:?}")]
    IllegalState {
        /// Cache name.
        name: String,
        /// Current lifecycle status.
        status: Status,
    },

    /// The cache loader failed. Nothing was cached.
    #[error("cache loader failed: {source}")]
    Load {
        /// Error returned by the loader.
        #[source]
        source: BoxError,
    },

    /// The cache writer failed. The local cache was left unchanged.
    #[error("cache writer failed: {source}")]
    Write {
        /// Error returned by the writer.
        #[source]
        source: BoxError,
    },

    /// `begin()` was called on a cache configured without transactions.
    #[error("transactions are not enabled for cache '{name}'")]
    TransactionsDisabled {
        /// Cache name.
        name: String,
    },

    /// A serializable transaction observed a concurrent modification.
    #[error("transaction conflict on cache '{name}'")]
    TransactionConflict {
        /// Cache name.
        name: String,
    },
}

impl CacheError {
    /// Returns the validation failure, if this is one.
    pub fn as_config_error(&self) -> Option<&ConfigError> {
        match self {
            CacheError::InvalidConfiguration(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_all_violations() {
        let err = ConfigError::Invalid(vec![Violation::MissingLoader, Violation::MissingWriter]);
        let msg = err.to_string();
        assert!(msg.contains("no cache loader"));
        assert!(msg.contains("no cache writer"));
        assert!(err.contains(Violation::MissingLoader));
        assert!(!err.contains(Violation::XaUnsupported));
    }

    #[test]
    fn test_config_error_converts_into_cache_error() {
        let err: CacheError = ConfigError::Invalid(vec![Violation::IsolationLevelNone]).into();
        assert!(err
            .as_config_error()
            .is_some_and(|e| e.contains(Violation::IsolationLevelNone)));
    }

    #[test]
    fn test_load_error_keeps_source() {
        let source: BoxError = "backend down".into();
        let err = CacheError::Load { source };
        assert_eq!(err.to_string(), "cache loader failed: backend down");
        assert!(std::error::Error::source(&err).is_some());
    }
}
