//! Transaction settings.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transaction isolation level.
///
/// Ordered from weakest to strongest. Buffered writes are never visible to other
/// transactions before commit, so `ReadUncommitted` behaves like `ReadCommitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IsolationLevel {
    /// No isolation. Rejected by validation when transactions are enabled.
    None,
    /// Reads may observe uncommitted data.
    ReadUncommitted,
    /// Reads observe committed data only.
    ReadCommitted,
    /// The first value read for a key is kept for the rest of the transaction.
    RepeatableRead,
    /// Repeatable read, plus commit fails if any touched key changed concurrently.
    Serializable,
}

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mode {
    /// Transactions local to this cache.
    #[default]
    Local,
    /// Distributed (XA) transactions.
    Xa,
}

/// Isolation level and mode for a transactional cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransactionSettings {
    /// Isolation level.
    pub isolation_level: IsolationLevel,
    /// Local or XA.
    pub mode: Mode,
}

impl TransactionSettings {
    /// Creates transaction settings.
    pub fn new(isolation_level: IsolationLevel, mode: Mode) -> Self {
        Self {
            isolation_level,
            mode,
        }
    }

    /// Returns `true` if reads must keep the first value they observed.
    #[inline]
    pub(crate) fn pins_reads(&self) -> bool {
        self.isolation_level >= IsolationLevel::RepeatableRead
    }

    /// Returns `true` if commit must check for concurrent modifications.
    #[inline]
    pub(crate) fn validates_on_commit(&self) -> bool {
        self.isolation_level == IsolationLevel::Serializable
    }
}
