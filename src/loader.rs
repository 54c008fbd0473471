//! Backing-store collaborators: [`CacheLoader`] and [`CacheWriter`].
//!
//! These are supplied by the caller. The cache invokes the loader on a
//! read-through miss and the writer before every local mutation of a
//! write-through cache.
//!
//! # Examples
//!
//! A closure is a loader:
//!
//! ```
//! use cache_manager::error::BoxError;
//! use cache_manager::loader::CacheLoader;
//!
//! let loader = |key: &u32| -> Result<Option<String>, BoxError> { Ok(Some(key.to_string())) };
//! assert_eq!(loader.load(&7).unwrap(), Some("7".to_string()));
//! ```

use crate::error::BoxError;

/// Loads values from a backing source on a cache miss.
pub trait CacheLoader<K, V>: Send + Sync {
    /// Loads the value for `key`.
    ///
    /// Returns `Ok(None)` if the backing source has no value. Nothing is cached
    /// in that case, and nothing is cached when an error is returned.
    fn load(&self, key: &K) -> Result<Option<V>, BoxError>;

    /// Loads several keys. The default loads them one at a time and stops at the
    /// first error.
    fn load_all(&self, keys: &[K]) -> Result<Vec<(K, Option<V>)>, BoxError>
    where
        K: Clone,
    {
        keys.iter()
            .map(|k| self.load(k).map(|v| (k.clone(), v)))
            .collect()
    }
}

impl<K, V, F> CacheLoader<K, V> for F
where
    F: Fn(&K) -> Result<Option<V>, BoxError> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<Option<V>, BoxError> {
        self(key)
    }
}

/// Propagates cache mutations to a backing store.
pub trait CacheWriter<K, V>: Send + Sync {
    /// Writes `value` under `key` to the backing store.
    fn write(&self, key: &K, value: &V) -> Result<(), BoxError>;

    /// Deletes `key` from the backing store. Deleting a missing key is not an error.
    fn delete(&self, key: &K) -> Result<(), BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapWriter {
        store: Mutex<HashMap<u32, u32>>,
    }

    impl CacheWriter<u32, u32> for MapWriter {
        fn write(&self, key: &u32, value: &u32) -> Result<(), BoxError> {
            self.store.lock().insert(*key, *value);
            Ok(())
        }

        fn delete(&self, key: &u32) -> Result<(), BoxError> {
            self.store.lock().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_closure_loader_load_all() {
        let loader = |k: &u32| -> Result<Option<u32>, BoxError> {
            Ok(if *k % 2 == 0 { Some(k * 10) } else { None })
        };
        let loaded = loader.load_all(&[1, 2, 4]).unwrap();
        assert_eq!(loaded, vec![(1, None), (2, Some(20)), (4, Some(40))]);
    }

    #[test]
    fn test_load_all_stops_at_first_error() {
        let loader = |k: &u32| -> Result<Option<u32>, BoxError> {
            if *k == 3 {
                Err("boom".into())
            } else {
                Ok(Some(*k))
            }
        };
        assert!(loader.load_all(&[1, 3, 5]).is_err());
    }

    #[test]
    fn test_writer_roundtrip() {
        let writer = MapWriter::default();
        writer.write(&1, &100).unwrap();
        writer.delete(&2).unwrap();
        assert_eq!(writer.store.lock().get(&1), Some(&100));
        writer.delete(&1).unwrap();
        assert!(writer.store.lock().is_empty());
    }
}
