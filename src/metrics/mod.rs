//! Cache Statistics
//!
//! Each cache instance owns a [`CacheStatistics`] block of atomic counters.
//! When statistics are enabled on the configuration, the cache updates them
//! while holding the lock that guards the operation being counted, so a
//! counter never disagrees with the store it describes.
//!
//! Reading is done through [`StatisticsSnapshot`], a plain copy with derived
//! rates, or through the [`CacheMetrics`] trait, which reports everything as a
//! `BTreeMap` for deterministic output.
//!
//! # Why BTreeMap over HashMap?
//!
//! Metric reports are compared in tests and written to logs. A BTreeMap keeps
//! the keys in the same order every time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one cache.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    write_failures: AtomicU64,
}

macro_rules! recorder {
    ($(#[$doc:meta] $name:ident => $field:ident),* $(,)?) => {
        $(
            #[$doc]
            #[inline]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl CacheStatistics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    recorder! {
        /// Records a read that found a live entry.
        record_hit => hits,
        /// Records a read that found nothing (before any read-through load).
        record_miss => misses,
        /// Records a stored value.
        record_put => puts,
        /// Records an explicit removal.
        record_removal => removals,
        /// Records an entry removed to respect capacity.
        record_eviction => evictions,
        /// Records an entry removed because it expired.
        record_expiration => expirations,
        /// Records a successful read-through load.
        record_load => loads,
        /// Records a failed read-through load.
        record_load_failure => load_failures,
        /// Records a failed write-through.
        record_write_failure => write_failures,
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn clear(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.puts,
            &self.removals,
            &self.evictions,
            &self.expirations,
            &self.loads,
            &self.load_failures,
            &self.write_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`CacheStatistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Values stored.
    pub puts: u64,
    /// Explicit removals.
    pub removals: u64,
    /// Capacity evictions.
    pub evictions: u64,
    /// Expiry removals.
    pub expirations: u64,
    /// Successful read-through loads.
    pub loads: u64,
    /// Failed read-through loads.
    pub load_failures: u64,
    /// Failed write-throughs.
    pub write_failures: u64,
}

impl StatisticsSnapshot {
    /// Total number of reads.
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate between 0.0 and 1.0, or 0.0 if there were no reads.
    pub fn hit_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    /// Miss rate between 0.0 and 1.0, or 0.0 if there were no reads.
    pub fn miss_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            n => self.misses as f64 / n as f64,
        }
    }

    /// All counters and rates, keyed by name.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        // Counters
        metrics.insert("cache_hits".to_string(), self.hits as f64);
        metrics.insert("cache_misses".to_string(), self.misses as f64);
        metrics.insert("requests".to_string(), self.requests() as f64);
        metrics.insert("puts".to_string(), self.puts as f64);
        metrics.insert("removals".to_string(), self.removals as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("expirations".to_string(), self.expirations as f64);
        metrics.insert("loads".to_string(), self.loads as f64);
        metrics.insert("load_failures".to_string(), self.load_failures as f64);
        metrics.insert("write_failures".to_string(), self.write_failures as f64);

        // Rates (0.0 to 1.0)
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("miss_rate".to_string(), self.miss_rate());

        metrics
    }
}

/// Uniform metrics reporting for caches.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Name of the cache the metrics belong to.
    fn cache_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let stats = CacheStatistics::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let snap = stats.snapshot();
        assert_eq!(snap.requests(), 4);
        assert!((snap.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!((snap.miss_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear() {
        let stats = CacheStatistics::new();
        stats.record_put();
        stats.record_eviction();
        stats.record_write_failure();
        stats.clear();
        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());
    }

    #[test]
    fn test_btreemap_report() {
        let stats = CacheStatistics::new();
        stats.record_put();
        stats.record_removal();
        stats.record_expiration();
        let report = stats.snapshot().to_btreemap();

        assert_eq!(report.get("puts"), Some(&1.0));
        assert_eq!(report.get("removals"), Some(&1.0));
        assert_eq!(report.get("expirations"), Some(&1.0));
        assert_eq!(report.get("hit_rate"), Some(&0.0));

        let keys: Vec<_> = report.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
