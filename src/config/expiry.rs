//! Expiry configuration.
//!
//! An [`Expiry`] pairs an [`ExpiryType`] (which timestamp is tracked) with a
//! [`Duration`] (how long an entry may live past that timestamp).
//!
//! # Examples
//!
//! ```
//! use cache_manager::config::{Duration, Expiry, ExpiryType, TimeUnit};
//!
//! let expiry = Expiry::new(ExpiryType::Created, Duration::of(10, TimeUnit::Seconds));
//! assert_eq!(expiry.duration.as_nanos(), Some(10_000_000_000));
//!
//! // Entries live forever unless removed
//! assert!(Expiry::default().duration.is_eternal());
//! ```

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which timestamp of an entry the expiry duration is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExpiryType {
    /// Time since the entry was created. Updates do not extend its life.
    Created,
    /// Time since the entry was created or last updated.
    #[default]
    Modified,
    /// Time since the entry was last read or written.
    Accessed,
}

/// Units accepted by [`Duration::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeUnit {
    /// Nanoseconds.
    Nanoseconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl TimeUnit {
    fn to_std(self, amount: u64) -> std::time::Duration {
        use std::time::Duration as Std;
        match self {
            TimeUnit::Nanoseconds => Std::from_nanos(amount),
            TimeUnit::Microseconds => Std::from_micros(amount),
            TimeUnit::Milliseconds => Std::from_millis(amount),
            TimeUnit::Seconds => Std::from_secs(amount),
            TimeUnit::Minutes => Std::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Std::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Std::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

/// How long an entry lives past its tracked timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Duration {
    /// Entries never expire.
    #[default]
    Eternal,
    /// Entries expire once this much time has passed.
    Finite(std::time::Duration),
}

impl Duration {
    /// A finite duration of zero. Entries expire as soon as they are stored.
    pub const ZERO: Duration = Duration::Finite(std::time::Duration::ZERO);

    /// Creates a finite duration of `amount` in `unit`.
    pub fn of(amount: u64, unit: TimeUnit) -> Self {
        Duration::Finite(unit.to_std(amount))
    }

    /// Returns `true` for [`Duration::Eternal`].
    pub fn is_eternal(&self) -> bool {
        matches!(self, Duration::Eternal)
    }

    /// Returns the duration in nanoseconds, or `None` if eternal.
    pub fn as_nanos(&self) -> Option<u64> {
        match self {
            Duration::Eternal => None,
            Duration::Finite(d) => Some(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
        }
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration::Finite(d)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duration::Eternal => f.write_str("Eternal"),
            Duration::Finite(d) => write!(f, "{d:?}"),
        }
    }
}

/// Expiry policy of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Expiry {
    /// Which timestamp to measure from.
    pub expiry_type: ExpiryType,
    /// How long entries live.
    pub duration: Duration,
}

impl Expiry {
    /// Creates an expiry policy.
    pub fn new(expiry_type: ExpiryType, duration: Duration) -> Self {
        Self {
            expiry_type,
            duration,
        }
    }

    /// Returns `true` if an entry whose tracked time is `tracked` has expired at `now`.
    ///
    /// Both arguments are clock readings in nanoseconds. An entry is expired once
    /// `now - tracked >= duration`.
    #[inline]
    pub fn is_expired(&self, tracked: u64, now: u64) -> bool {
        match self.duration.as_nanos() {
            None => false,
            Some(ttl) => now.saturating_sub(tracked) >= ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(Duration::of(3, TimeUnit::Milliseconds).as_nanos(), Some(3_000_000));
        assert_eq!(
            Duration::of(2, TimeUnit::Minutes),
            Duration::Finite(std::time::Duration::from_secs(120))
        );
        assert_eq!(
            Duration::of(1, TimeUnit::Days),
            Duration::of(24, TimeUnit::Hours)
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let expiry = Expiry::new(ExpiryType::Created, Duration::of(10, TimeUnit::Nanoseconds));
        assert!(!expiry.is_expired(100, 109));
        assert!(expiry.is_expired(100, 110));
        assert!(expiry.is_expired(100, 500));
    }

    #[test]
    fn test_eternal_never_expires() {
        let expiry = Expiry::default();
        assert_eq!(expiry.expiry_type, ExpiryType::Modified);
        assert!(!expiry.is_expired(0, u64::MAX));
    }

    #[test]
    fn test_zero_expires_immediately() {
        let expiry = Expiry::new(ExpiryType::Accessed, Duration::ZERO);
        assert!(expiry.is_expired(42, 42));
    }

    #[test]
    fn test_tracked_time_after_now_is_not_expired() {
        let expiry = Expiry::new(ExpiryType::Modified, Duration::of(1, TimeUnit::Seconds));
        assert!(!expiry.is_expired(2_000, 1_000));
    }
}
