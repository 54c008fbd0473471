use cache_manager::config::{Duration, ExpiryType, IsolationLevel, Mode, TimeUnit};
use cache_manager::error::BoxError;
use cache_manager::event::{CacheEntryEvent, NotificationScope};
use cache_manager::{CacheInstance, CacheManager};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::num::NonZeroUsize;
use std::sync::Arc;

const CACHE_SIZE: usize = 1000;

fn filled(cache: &CacheInstance<usize, usize>) {
    for i in 0..CACHE_SIZE {
        cache.put(i, i).unwrap();
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let manager = CacheManager::new("bench");
    let mut group = c.benchmark_group("Cache Operations");

    // Plain cache, store-by-value
    {
        let cache = manager
            .create_configuration_builder::<usize, usize>("plain")
            .build()
            .unwrap();
        filled(&cache);

        group.bench_function("get hit", |b| {
            b.iter(|| {
                for i in 0..100 {
                    black_box(cache.get(&(i % CACHE_SIZE)).unwrap());
                }
            });
        });

        group.bench_function("get miss", |b| {
            b.iter(|| {
                for i in 0..100 {
                    black_box(cache.get(&(i + CACHE_SIZE)).unwrap());
                }
            });
        });

        group.bench_function("put existing", |b| {
            b.iter(|| {
                for i in 0..100 {
                    cache.put(i % CACHE_SIZE, i).unwrap();
                }
            });
        });
    }

    // Store-by-reference with statistics and expiry
    {
        let cache = manager
            .create_configuration_builder::<usize, usize>("by-reference")
            .set_store_by_value(false)
            .set_statistics_enabled(true)
            .set_expiry(ExpiryType::Accessed, Duration::of(1, TimeUnit::Hours))
            .build()
            .unwrap();
        filled(&cache);

        group.bench_function("get hit by reference", |b| {
            b.iter(|| {
                for i in 0..100 {
                    black_box(cache.get(&(i % CACHE_SIZE)).unwrap());
                }
            });
        });
    }

    // Bounded cache, every put evicts
    {
        let cache = manager
            .create_configuration_builder::<usize, usize>("bounded")
            .set_capacity(NonZeroUsize::new(CACHE_SIZE).unwrap())
            .build()
            .unwrap();
        filled(&cache);

        let mut next = CACHE_SIZE;
        group.bench_function("put evicting", |b| {
            b.iter(|| {
                cache.put(next, next).unwrap();
                next += 1;
            });
        });
    }

    // Synchronous listener on every mutation
    {
        let cache = manager
            .create_configuration_builder::<usize, usize>("listened")
            .register_cache_entry_listener(
                Arc::new(|e: &CacheEntryEvent<usize, usize>| -> Result<(), BoxError> {
                    black_box(e.key);
                    Ok(())
                }),
                NotificationScope::Local,
                true,
            )
            .build()
            .unwrap();
        filled(&cache);

        group.bench_function("put with sync listener", |b| {
            b.iter(|| {
                for i in 0..100 {
                    cache.put(i % CACHE_SIZE, i).unwrap();
                }
            });
        });
    }

    // Transactional commit of ten writes
    {
        let cache = manager
            .create_configuration_builder::<usize, usize>("transactional")
            .set_transaction_enabled(IsolationLevel::Serializable, Mode::Local)
            .build()
            .unwrap();
        filled(&cache);

        group.bench_function("serializable commit", |b| {
            b.iter(|| {
                let mut tx = cache.begin().unwrap();
                for i in 0..10 {
                    let v = *tx.get(&i).unwrap().unwrap();
                    tx.put(i, v + 1);
                }
                tx.commit().unwrap();
            });
        });
    }

    group.finish();
    manager.shutdown();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
